//! Donchian breakout strategy
//!
//! Buys a close above the trailing channel high, sells a close below the
//! trailing channel low, each padded by a small buffer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

use super::{Strategy, StrategyRuntime};
use crate::feed::TokenEvent;
use crate::indicators::{donchian_high, donchian_low};

/// Breakout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakoutConfig {
    /// Channel lookback in samples
    #[serde(default = "default_lookback")]
    pub lookback: usize,
    /// Fractional pad above/below the channel (0.005 = 0.5%)
    #[serde(default = "default_buffer_pct")]
    pub buffer_pct: f64,
}

fn default_lookback() -> usize {
    20
}

fn default_buffer_pct() -> f64 {
    0.005
}

impl Default for BreakoutConfig {
    fn default() -> Self {
        Self {
            lookback: default_lookback(),
            buffer_pct: default_buffer_pct(),
        }
    }
}

/// Breakout strategy
pub struct BreakoutStrategy {
    config: BreakoutConfig,
    histories: HashMap<String, VecDeque<f64>>,
}

impl BreakoutStrategy {
    pub fn new(config: BreakoutConfig) -> Self {
        Self {
            config,
            histories: HashMap::new(),
        }
    }

    /// Push a price; returns the prior channel (high, low) once warm
    fn observe(&mut self, mint: &str, price: f64) -> Option<(f64, f64)> {
        let lookback = self.config.lookback;
        let history = self.histories.entry(mint.to_string()).or_default();

        // Channel is computed over the window BEFORE this sample
        let prior: Vec<f64> = history.iter().copied().collect();
        history.push_back(price);
        while history.len() > lookback + 1 {
            history.pop_front();
        }

        let high = donchian_high(&prior, lookback.min(prior.len()).max(1))?;
        let low = donchian_low(&prior, lookback.min(prior.len()).max(1))?;
        (prior.len() >= lookback).then_some((high, low))
    }
}

#[async_trait]
impl Strategy for BreakoutStrategy {
    fn name(&self) -> &'static str {
        "breakout"
    }

    async fn on_discovered(&mut self, event: &TokenEvent, _rt: &dyn StrategyRuntime) {
        self.histories.entry(event.mint.clone()).or_default();
    }

    async fn on_tick(&mut self, rt: &dyn StrategyRuntime) {
        let mut mints: Vec<String> = rt.all_tokens().await.iter().map(|t| t.mint.clone()).collect();
        for mint in self.histories.keys() {
            if !mints.contains(mint) {
                mints.push(mint.clone());
            }
        }

        for mint in mints {
            let Some(price) = rt.get_token_usd_price(&mint).await else {
                continue;
            };
            let Some((channel_high, channel_low)) = self.observe(&mint, price) else {
                continue;
            };

            let held = rt
                .status(&mint)
                .await
                .map_or(false, |t| t.state.is_held());

            if !held && price > channel_high * (1.0 + self.config.buffer_pct) {
                debug!(
                    "Breakout above {:.6} for {} at {:.6}",
                    channel_high, mint, price
                );
                rt.buy(&mint).await;
            } else if held && price < channel_low * (1.0 - self.config.buffer_pct) {
                debug!(
                    "Breakdown below {:.6} for {} at {:.6}",
                    channel_low, mint, price
                );
                rt.sell(&mint).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::testutil::MockRuntime;
    use crate::token::TokenSource;

    fn event(mint: &str) -> TokenEvent {
        TokenEvent {
            mint: mint.to_string(),
            source: TokenSource::Pool,
            initial_buy: None,
            market_cap_sol: None,
        }
    }

    fn strategy() -> BreakoutStrategy {
        BreakoutStrategy::new(BreakoutConfig {
            lookback: 5,
            buffer_pct: 0.01,
        })
    }

    async fn warm_up(strategy: &mut BreakoutStrategy, rt: &MockRuntime, mint: &str) {
        // Five samples ranging 1.0..1.04
        for p in [1.0, 1.02, 1.04, 1.01, 1.03] {
            rt.set_history(mint, vec![p]);
            strategy.on_tick(rt).await;
        }
    }

    #[tokio::test]
    async fn test_breakout_buy() {
        let mut strategy = strategy();
        let rt = MockRuntime::new();
        strategy.on_discovered(&event("m"), &rt).await;
        warm_up(&mut strategy, &rt, "m").await;

        // Above channel high 1.04 * 1.01
        rt.set_history("m", vec![1.06]);
        strategy.on_tick(&rt).await;
        assert_eq!(rt.buy_count(), 1);
    }

    #[tokio::test]
    async fn test_no_buy_inside_channel() {
        let mut strategy = strategy();
        let rt = MockRuntime::new();
        strategy.on_discovered(&event("m"), &rt).await;
        warm_up(&mut strategy, &rt, "m").await;

        rt.set_history("m", vec![1.035]);
        strategy.on_tick(&rt).await;
        assert_eq!(rt.buy_count(), 0);
    }

    #[tokio::test]
    async fn test_no_buy_within_buffer() {
        let mut strategy = strategy();
        let rt = MockRuntime::new();
        strategy.on_discovered(&event("m"), &rt).await;
        warm_up(&mut strategy, &rt, "m").await;

        // Above the high but inside the 1% pad
        rt.set_history("m", vec![1.045]);
        strategy.on_tick(&rt).await;
        assert_eq!(rt.buy_count(), 0);
    }

    #[tokio::test]
    async fn test_breakdown_sell() {
        let mut strategy = strategy();
        let rt = MockRuntime::new();
        rt.add_held("m", 1.0, rt.now_ms());
        warm_up(&mut strategy, &rt, "m").await;

        // Below channel low 1.0 * 0.99
        rt.set_history("m", vec![0.97]);
        strategy.on_tick(&rt).await;
        assert_eq!(rt.sell_count(), 1);
    }

    #[tokio::test]
    async fn test_needs_full_lookback() {
        let mut strategy = strategy();
        let rt = MockRuntime::new();
        strategy.on_discovered(&event("m"), &rt).await;

        rt.set_history("m", vec![1.0]);
        strategy.on_tick(&rt).await;
        rt.set_history("m", vec![99.0]);
        strategy.on_tick(&rt).await;
        assert_eq!(rt.buy_count(), 0);
    }
}
