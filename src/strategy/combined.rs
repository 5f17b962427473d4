//! Combined technical strategy
//!
//! Weighted vote of three sub-signals (SMA trend, RSI level, channel
//! breakout) compared against a decision threshold in both directions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

use super::{SignalAction, Strategy, StrategyRuntime, StrategySignal};
use crate::feed::TokenEvent;
use crate::indicators::{donchian_high, donchian_low, rsi, sma};

/// Combined strategy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedConfig {
    #[serde(default = "default_sma_period")]
    pub sma_period: usize,
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    #[serde(default = "default_breakout_lookback")]
    pub breakout_lookback: usize,
    #[serde(default = "default_trend_weight")]
    pub trend_weight: f64,
    #[serde(default = "default_rsi_weight")]
    pub rsi_weight: f64,
    #[serde(default = "default_breakout_weight")]
    pub breakout_weight: f64,
    /// Absolute score needed to act in either direction
    #[serde(default = "default_decision_threshold")]
    pub decision_threshold: f64,
}

fn default_sma_period() -> usize {
    10
}

fn default_rsi_period() -> usize {
    14
}

fn default_breakout_lookback() -> usize {
    10
}

fn default_trend_weight() -> f64 {
    0.4
}

fn default_rsi_weight() -> f64 {
    0.3
}

fn default_breakout_weight() -> f64 {
    0.3
}

fn default_decision_threshold() -> f64 {
    0.5
}

impl Default for CombinedConfig {
    fn default() -> Self {
        Self {
            sma_period: default_sma_period(),
            rsi_period: default_rsi_period(),
            breakout_lookback: default_breakout_lookback(),
            trend_weight: default_trend_weight(),
            rsi_weight: default_rsi_weight(),
            breakout_weight: default_breakout_weight(),
            decision_threshold: default_decision_threshold(),
        }
    }
}

/// Weighted multi-indicator strategy
pub struct TechnicalCombined {
    config: CombinedConfig,
    histories: HashMap<String, VecDeque<f64>>,
}

impl TechnicalCombined {
    pub fn new(config: CombinedConfig) -> Self {
        Self {
            config,
            histories: HashMap::new(),
        }
    }

    fn history_cap(&self) -> usize {
        self.config
            .sma_period
            .max(self.config.rsi_period)
            .max(self.config.breakout_lookback)
            * 2
    }

    /// Push a price and score the window in [-1, 1]
    fn observe(&mut self, mint: &str, price: f64) -> Option<StrategySignal> {
        let cap = self.history_cap();
        let config = self.config.clone();
        let history = self.histories.entry(mint.to_string()).or_default();

        let prior: Vec<f64> = history.iter().copied().collect();
        history.push_back(price);
        while history.len() > cap {
            history.pop_front();
        }
        let closes: Vec<f64> = history.iter().copied().collect();

        // Trend: above or below the moving average
        let trend = sma(&closes, config.sma_period).map(|avg| {
            if price > avg {
                1.0
            } else if price < avg {
                -1.0
            } else {
                0.0
            }
        })?;

        // RSI: oversold favors entry, overbought favors exit
        let rsi_score = rsi(&closes, config.rsi_period).map(|value| {
            if value < 30.0 {
                1.0
            } else if value > 70.0 {
                -1.0
            } else {
                0.0
            }
        })?;

        // Breakout vs the prior channel
        let breakout = if prior.len() >= config.breakout_lookback {
            let high = donchian_high(&prior, config.breakout_lookback)?;
            let low = donchian_low(&prior, config.breakout_lookback)?;
            if price > high {
                1.0
            } else if price < low {
                -1.0
            } else {
                0.0
            }
        } else {
            0.0
        };

        let score = config.trend_weight * trend
            + config.rsi_weight * rsi_score
            + config.breakout_weight * breakout;

        let action = if score >= config.decision_threshold {
            SignalAction::Buy
        } else if score <= -config.decision_threshold {
            SignalAction::Sell
        } else {
            SignalAction::Hold
        };

        Some(
            StrategySignal::new(action, mint, score.abs())
                .with_meta("score", serde_json::json!(score))
                .with_meta("trend", serde_json::json!(trend))
                .with_meta("rsi", serde_json::json!(rsi_score))
                .with_meta("breakout", serde_json::json!(breakout)),
        )
    }
}

#[async_trait]
impl Strategy for TechnicalCombined {
    fn name(&self) -> &'static str {
        "technical_combined"
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
            let Some(signal) = self.observe(&mint, price) else {
                continue;
            };

            let held = rt
                .status(&mint)
                .await
                .map_or(false, |t| t.state.is_held());

            match signal.action {
                SignalAction::Buy if !held => {
                    debug!("Combined buy {} (confidence {:.2})", mint, signal.confidence);
                    rt.buy(&mint).await;
                }
                SignalAction::Sell if held => {
                    debug!("Combined sell {} (confidence {:.2})", mint, signal.confidence);
                    rt.sell(&mint).await;
                }
                _ => {}
            }
        }
    }
}
