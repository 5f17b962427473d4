//! Shitcoin scalper
//!
//! Buys fresh tokens on discovery up to a position cap, then exits on the
//! first of profit target, stop loss, hold timeout, or trailing stop.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::{Strategy, StrategyRuntime};
use crate::feed::TokenEvent;

/// Scalper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalperConfig {
    /// Profit fraction to take (0.02 = +2%)
    #[serde(default = "default_profit_take")]
    pub profit_take: f64,
    /// Loss fraction to cut (0.08 = -8%)
    #[serde(default = "default_stop_loss")]
    pub stop_loss: f64,
    /// Hold timeout
    #[serde(default = "default_max_hold_ms")]
    pub max_hold_ms: u64,
    /// Maximum simultaneously held tokens
    #[serde(default = "default_max_held")]
    pub max_held: usize,
    /// Profit fraction before the trailing stop arms
    #[serde(default = "default_min_profit_before_trailing")]
    pub min_profit_before_trailing: f64,
    /// Trailing distance below the peak
    #[serde(default = "default_trailing_pct")]
    pub trailing_pct: f64,
}

fn default_profit_take() -> f64 {
    0.02
}

fn default_stop_loss() -> f64 {
    0.08
}

fn default_max_hold_ms() -> u64 {
    60_000
}

fn default_max_held() -> usize {
    3
}

fn default_min_profit_before_trailing() -> f64 {
    0.01
}

fn default_trailing_pct() -> f64 {
    0.05
}

impl Default for ScalperConfig {
    fn default() -> Self {
        Self {
            profit_take: default_profit_take(),
            stop_loss: default_stop_loss(),
            max_hold_ms: default_max_hold_ms(),
            max_held: default_max_held(),
            min_profit_before_trailing: default_min_profit_before_trailing(),
            trailing_pct: default_trailing_pct(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct TrailState {
    peak: f64,
    armed: bool,
}

/// Scalping strategy
pub struct ShitcoinScalper {
    config: ScalperConfig,
    trails: HashMap<String, TrailState>,
}

impl ShitcoinScalper {
    pub fn new(config: ScalperConfig) -> Self {
        Self {
            config,
            trails: HashMap::new(),
        }
    }

    /// Exit reason for one held token, if any
    fn exit_reason(
        &mut self,
        mint: &str,
        entry_price: f64,
        price: f64,
        hold_ms: u64,
    ) -> Option<&'static str> {
        let pnl_pct = (price - entry_price) / entry_price;

        if pnl_pct >= self.config.profit_take {
            return Some("profit_take");
        }
        if pnl_pct <= -self.config.stop_loss {
            return Some("stop_loss");
        }
        if hold_ms >= self.config.max_hold_ms {
            return Some("max_hold");
        }

        let trail = self.trails.entry(mint.to_string()).or_default();
        if price > trail.peak {
            trail.peak = price;
        }
        if pnl_pct >= self.config.min_profit_before_trailing {
            trail.armed = true;
        }
        if trail.armed && price < trail.peak * (1.0 - self.config.trailing_pct) {
            return Some("trailing_stop");
        }

        None
    }
}

#[async_trait]
impl Strategy for ShitcoinScalper {
    fn name(&self) -> &'static str {
        "shitcoin_scalper"
    }

    async fn on_discovered(&mut self, event: &TokenEvent, rt: &dyn StrategyRuntime) {
        if !rt.is_new(&event.mint).await {
            return;
        }

        let held = rt
            .all_tokens()
            .await
            .iter()
            .filter(|t| t.is_held())
            .count();
        if held >= self.config.max_held {
            debug!("Scalper at capacity ({} held), skipping {}", held, event.mint);
            return;
        }

        rt.buy(&event.mint).await;
    }

    async fn on_tick(&mut self, rt: &dyn StrategyRuntime) {
        let now_ms = rt.now_ms();
        for token in rt.all_tokens().await {
            if !token.is_held() {
                continue;
            }
            let Some(price) = rt.get_token_usd_price(&token.mint).await else {
                continue;
            };
            if token.entry_price <= 0.0 {
                continue;
            }

            let hold_ms = now_ms.saturating_sub(token.entry_time_ms);
            if let Some(reason) = self.exit_reason(&token.mint, token.entry_price, price, hold_ms)
            {
                debug!("Scalper selling {} ({})", token.mint, reason);
                if rt.sell(&token.mint).await {
                    self.trails.remove(&token.mint);
                }
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
            source: TokenSource::PumpFun,
            initial_buy: None,
            market_cap_sol: None,
        }
    }

    fn scalper() -> ShitcoinScalper {
        ShitcoinScalper::new(ScalperConfig {
            profit_take: 0.02,
            stop_loss: 0.08,
            max_hold_ms: 60_000,
            max_held: 2,
            min_profit_before_trailing: 0.01,
            trailing_pct: 0.05,
        })
    }

    #[tokio::test]
    async fn test_buys_new_token() {
        let mut strategy = scalper();
        let rt = MockRuntime::new();
        strategy.on_discovered(&event("m1"), &rt).await;
        assert_eq!(rt.buy_count(), 1);
    }

    #[tokio::test]
    async fn test_respects_max_held() {
        let mut strategy = scalper();
        let rt = MockRuntime::new();
        rt.add_held("h1", 1.0, 0);
        rt.add_held("h2", 1.0, 0);

        strategy.on_discovered(&event("m1"), &rt).await;
        assert_eq!(rt.buy_count(), 0);
    }

    #[tokio::test]
    async fn test_skips_seen_token() {
        let mut strategy = scalper();
        let rt = MockRuntime::new();
        rt.add_held("m1", 1.0, 0);

        strategy.on_discovered(&event("m1"), &rt).await;
        assert_eq!(rt.buy_count(), 0);
    }

    #[tokio::test]
    async fn test_profit_take_sell() {
        let mut strategy = scalper();
        let rt = MockRuntime::new();
        rt.add_held("m1", 1.0, rt.now_ms());
        rt.push_price("m1", 1.021);

        strategy.on_tick(&rt).await;
        assert_eq!(rt.sell_count(), 1);
    }

    #[tokio::test]
    async fn test_stop_loss_sell() {
        let mut strategy = scalper();
        let rt = MockRuntime::new();
        rt.add_held("m1", 1.0, rt.now_ms());
        rt.push_price("m1", 0.90);

        strategy.on_tick(&rt).await;
        assert_eq!(rt.sell_count(), 1);
    }

    #[tokio::test]
    async fn test_max_hold_sell() {
        let mut strategy = scalper();
        let rt = MockRuntime::new();
        rt.add_held("m1", 1.0, rt.now_ms());
        rt.push_price("m1", 1.005); // inside the band
        rt.advance(61_000);

        strategy.on_tick(&rt).await;
        assert_eq!(rt.sell_count(), 1);
    }

    #[tokio::test]
    async fn test_holds_inside_band() {
        let mut strategy = scalper();
        let rt = MockRuntime::new();
        rt.add_held("m1", 1.0, rt.now_ms());
        rt.push_price("m1", 1.005);

        strategy.on_tick(&rt).await;
        assert_eq!(rt.sell_count(), 0);
    }

    #[tokio::test]
    async fn test_trailing_stop_after_arming() {
        let mut strategy = scalper();
        let rt = MockRuntime::new();
        rt.add_held("m1", 1.0, rt.now_ms());

        // +1.5% arms the trail below the profit target; then fade 6% off peak
        rt.push_price("m1", 1.015);
        strategy.on_tick(&rt).await;
        assert_eq!(rt.sell_count(), 0);

        rt.push_price("m1", 0.952);
        strategy.on_tick(&rt).await;
        assert_eq!(rt.sell_count(), 1);
    }
}
