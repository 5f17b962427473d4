//! Bollinger mean-reversion strategy
//!
//! Buys a touch of the lower band and exits when price reverts to the
//! middle band.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

use super::{Strategy, StrategyRuntime};
use crate::feed::TokenEvent;
use crate::indicators::bollinger;

/// Bollinger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BollingerConfig {
    #[serde(default = "default_period")]
    pub period: usize,
    /// Band width in standard deviations
    #[serde(default = "default_k")]
    pub k: f64,
}

fn default_period() -> usize {
    20
}

fn default_k() -> f64 {
    2.0
}

impl Default for BollingerConfig {
    fn default() -> Self {
        Self {
            period: default_period(),
            k: default_k(),
        }
    }
}

/// Mean-reversion strategy over Bollinger bands
pub struct BollingerReversion {
    config: BollingerConfig,
    histories: HashMap<String, VecDeque<f64>>,
}

impl BollingerReversion {
    pub fn new(config: BollingerConfig) -> Self {
        Self {
            config,
            histories: HashMap::new(),
        }
    }

    /// Push a price; returns bands over the window BEFORE this sample so
    /// the sample being judged cannot widen its own band.
    fn observe(&mut self, mint: &str, price: f64) -> Option<crate::indicators::BollingerBands> {
        let period = self.config.period;
        let history = self.histories.entry(mint.to_string()).or_default();
        let prior: Vec<f64> = history.iter().copied().collect();
        history.push_back(price);
        while history.len() > period * 2 {
            history.pop_front();
        }
        bollinger(&prior, period, self.config.k)
    }
}

#[async_trait]
impl Strategy for BollingerReversion {
    fn name(&self) -> &'static str {
        "bollinger_mean_reversion"
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
            let Some(bands) = self.observe(&mint, price) else {
                continue;
            };
            // Degenerate flat band carries no signal
            if bands.upper <= bands.lower {
                continue;
            }

            let held = rt
                .status(&mint)
                .await
                .map_or(false, |t| t.state.is_held());

            if !held && price <= bands.lower {
                debug!("Lower band touch for {} at {:.6}", mint, price);
                rt.buy(&mint).await;
            } else if held && price >= bands.mid {
                debug!("Mid-band reversion exit for {} at {:.6}", mint, price);
                rt.sell(&mint).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::testutil::MockRuntime;

    fn strategy() -> BollingerReversion {
        BollingerReversion::new(BollingerConfig { period: 5, k: 2.0 })
    }

    /// Alternating series with enough variance to open the bands
    async fn warm_up(strategy: &mut BollingerReversion, rt: &MockRuntime, mint: &str) {
        for p in [1.0, 1.1, 0.95, 1.05, 1.0] {
            rt.set_history(mint, vec![p]);
            strategy.on_tick(rt).await;
        }
    }

    #[tokio::test]
    async fn test_lower_band_buy() {
        let mut strategy = strategy();
        let rt = MockRuntime::new();
        strategy.histories.entry("m".into()).or_default();
        warm_up(&mut strategy, &rt, "m").await;

        // Deep drop pierces the lower band
        rt.set_history("m", vec![0.70]);
        strategy.on_tick(&rt).await;
        assert_eq!(rt.buy_count(), 1);
    }

    #[tokio::test]
    async fn test_no_buy_near_mid() {
        let mut strategy = strategy();
        let rt = MockRuntime::new();
        strategy.histories.entry("m".into()).or_default();
        warm_up(&mut strategy, &rt, "m").await;

        rt.set_history("m", vec![1.02]);
        strategy.on_tick(&rt).await;
        assert_eq!(rt.buy_count(), 0);
    }

    #[tokio::test]
    async fn test_mid_band_exit() {
        let mut strategy = strategy();
        let rt = MockRuntime::new();
        rt.add_held("m", 0.9, rt.now_ms());
        warm_up(&mut strategy, &rt, "m").await;

        // At or above the mid of the trailing window
        rt.set_history("m", vec![1.10]);
        strategy.on_tick(&rt).await;
        assert_eq!(rt.sell_count(), 1);
    }

    #[tokio::test]
    async fn test_flat_band_no_signal() {
        let mut strategy = strategy();
        let rt = MockRuntime::new();
        for _ in 0..8 {
            rt.set_history("m", vec![1.0]);
            strategy.histories.entry("m".into()).or_default();
            strategy.on_tick(&rt).await;
        }
        assert_eq!(rt.buy_count(), 0);
        assert_eq!(rt.sell_count(), 0);
    }
}
