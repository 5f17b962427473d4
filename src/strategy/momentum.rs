//! Rate-of-change momentum strategy
//!
//! Buys when momentum over the lookback clears the entry threshold, sells
//! when it reverses past the exit threshold or the hold timer runs out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

use super::{Strategy, StrategyRuntime};
use crate::feed::TokenEvent;
use crate::indicators::roc;

/// Momentum configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumConfig {
    /// ROC lookback in samples
    #[serde(default = "default_period")]
    pub period: usize,
    /// Entry threshold as a fraction (0.03 = +3%)
    #[serde(default = "default_buy_threshold")]
    pub buy_threshold: f64,
    /// Exit threshold as a fraction
    #[serde(default = "default_sell_threshold")]
    pub sell_threshold: f64,
    /// Time-based fallback exit
    #[serde(default = "default_max_hold_ms")]
    pub max_hold_ms: u64,
}

fn default_period() -> usize {
    10
}

fn default_buy_threshold() -> f64 {
    0.03
}

fn default_sell_threshold() -> f64 {
    0.02
}

fn default_max_hold_ms() -> u64 {
    180_000
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            period: default_period(),
            buy_threshold: default_buy_threshold(),
            sell_threshold: default_sell_threshold(),
            max_hold_ms: default_max_hold_ms(),
        }
    }
}

/// Momentum strategy
pub struct MomentumStrategy {
    config: MomentumConfig,
    histories: HashMap<String, VecDeque<f64>>,
}

impl MomentumStrategy {
    pub fn new(config: MomentumConfig) -> Self {
        Self {
            config,
            histories: HashMap::new(),
        }
    }

    fn observe(&mut self, mint: &str, price: f64) -> Option<f64> {
        let period = self.config.period;
        let history = self.histories.entry(mint.to_string()).or_default();
        history.push_back(price);
        while history.len() > period * 2 {
            history.pop_front();
        }
        let closes: Vec<f64> = history.iter().copied().collect();
        roc(&closes, period)
    }
}

#[async_trait]
impl Strategy for MomentumStrategy {
    fn name(&self) -> &'static str {
        "momentum"
    }

    async fn on_discovered(&mut self, event: &TokenEvent, _rt: &dyn StrategyRuntime) {
        self.histories.entry(event.mint.clone()).or_default();
    }

    async fn on_tick(&mut self, rt: &dyn StrategyRuntime) {
        let now_ms = rt.now_ms();
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
            let momentum = self.observe(&mint, price);

            let token = rt.status(&mint).await;
            let held = token.as_ref().map_or(false, |t| t.state.is_held());

            if !held {
                if let Some(m) = momentum {
                    if m > self.config.buy_threshold {
                        debug!("Momentum {:.4} entry for {}", m, mint);
                        rt.buy(&mint).await;
                    }
                }
                continue;
            }

            if let Some(m) = momentum {
                if m < -self.config.sell_threshold {
                    debug!("Momentum {:.4} reversal exit for {}", m, mint);
                    rt.sell(&mint).await;
                    continue;
                }
            }

            // Time-based fallback
            if let Some(status) = token {
                if let Some(entry_time) = status.entry_time {
                    let hold_ms = now_ms
                        .saturating_sub(entry_time.timestamp_millis().max(0) as u64);
                    if hold_ms >= self.config.max_hold_ms {
                        debug!("Momentum hold timeout for {}", mint);
                        rt.sell(&mint).await;
                    }
                }
            }
        }
    }
}
