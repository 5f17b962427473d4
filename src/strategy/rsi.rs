//! RSI cross strategy
//!
//! Tracks a capped per-mint price history and trades RSI threshold
//! crossings: entries on an oversold cross, exits on an overbought cross,
//! bearish divergence, or a neutral cross after a minimum hold.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

use super::{Strategy, StrategyRuntime};
use crate::feed::TokenEvent;
use crate::indicators::rsi;

/// RSI strategy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RsiConfig {
    #[serde(default = "default_period")]
    pub period: usize,
    #[serde(default = "default_oversold")]
    pub oversold: f64,
    #[serde(default = "default_overbought")]
    pub overbought: f64,
    /// Hold time after which a neutral cross closes the position
    #[serde(default = "default_min_hold_ms")]
    pub min_hold_ms: u64,
}

fn default_period() -> usize {
    14
}

fn default_oversold() -> f64 {
    30.0
}

fn default_overbought() -> f64 {
    70.0
}

fn default_min_hold_ms() -> u64 {
    120_000
}

impl Default for RsiConfig {
    fn default() -> Self {
        Self {
            period: default_period(),
            oversold: default_oversold(),
            overbought: default_overbought(),
            min_hold_ms: default_min_hold_ms(),
        }
    }
}

#[derive(Debug, Default)]
struct MintTrack {
    history: VecDeque<f64>,
    prev_rsi: Option<f64>,
    prev_price: Option<f64>,
}

/// RSI-based strategy
pub struct RsiStrategy {
    config: RsiConfig,
    tracks: HashMap<String, MintTrack>,
}

impl RsiStrategy {
    pub fn new(config: RsiConfig) -> Self {
        Self {
            config,
            tracks: HashMap::new(),
        }
    }

    fn history_cap(&self) -> usize {
        self.config.period * 2
    }

    /// Push a price and return (previous_rsi, current_rsi)
    fn observe(&mut self, mint: &str, price: f64) -> (Option<f64>, Option<f64>) {
        let cap = self.history_cap();
        let period = self.config.period;
        let track = self.tracks.entry(mint.to_string()).or_default();

        track.history.push_back(price);
        while track.history.len() > cap {
            track.history.pop_front();
        }

        let closes: Vec<f64> = track.history.iter().copied().collect();
        let current = rsi(&closes, period);
        let previous = track.prev_rsi;
        track.prev_rsi = current;
        (previous, current)
    }

    fn prev_price(&self, mint: &str) -> Option<f64> {
        self.tracks.get(mint).and_then(|t| t.prev_price)
    }

    fn remember_price(&mut self, mint: &str, price: f64) {
        if let Some(track) = self.tracks.get_mut(mint) {
            track.prev_price = Some(price);
        }
    }
}

#[async_trait]
impl Strategy for RsiStrategy {
    fn name(&self) -> &'static str {
        "rsi"
    }

    async fn on_discovered(&mut self, event: &TokenEvent, _rt: &dyn StrategyRuntime) {
        // Start tracking; entries come from tick-driven crossings
        self.tracks.entry(event.mint.clone()).or_default();
        debug!("RSI tracking {}", event.mint);
    }

    async fn on_tick(&mut self, rt: &dyn StrategyRuntime) {
        let now_ms = rt.now_ms();

        // Tracked mints beyond the runtime's token list keep their history warm
        let mut mints: Vec<String> = rt.all_tokens().await.iter().map(|t| t.mint.clone()).collect();
        for mint in self.tracks.keys() {
            if !mints.contains(mint) {
                mints.push(mint.clone());
            }
        }

        for mint in mints {
            let Some(price) = rt.get_token_usd_price(&mint).await else {
                continue;
            };

            let prev_price = self.prev_price(&mint);
            let (prev_rsi, current_rsi) = self.observe(&mint, price);
            self.remember_price(&mint, price);

            let (Some(prev), Some(current)) = (prev_rsi, current_rsi) else {
                continue;
            };

            let token = rt.status(&mint).await;
            let held = token.as_ref().map_or(false, |t| t.state.is_held());

            if !held {
                // Entry: RSI crossing down through the oversold line
                if prev >= self.config.oversold && current < self.config.oversold {
                    debug!("RSI oversold cross for {} ({:.1} -> {:.1})", mint, prev, current);
                    rt.buy(&mint).await;
                }
                continue;
            }

            // Exit: overbought cross
            if prev <= self.config.overbought && current > self.config.overbought {
                debug!("RSI overbought cross for {}", mint);
                rt.sell(&mint).await;
                continue;
            }

            // Exit: bearish divergence (price pushes on while RSI fades)
            if let Some(prev_px) = prev_price {
                if prev_px > 0.0 {
                    let price_up = (price - prev_px) / prev_px > 0.01;
                    let rsi_drop = prev - current > 2.0;
                    if price_up && rsi_drop {
                        debug!("RSI bearish divergence for {}", mint);
                        rt.sell(&mint).await;
                        continue;
                    }
                }
            }

            // Exit: stale position crossing back through neutral
            if let Some(status) = token {
                if let Some(entry_time) = status.entry_time {
                    let hold_ms = now_ms
                        .saturating_sub(entry_time.timestamp_millis().max(0) as u64);
                    if hold_ms >= self.config.min_hold_ms && prev >= 50.0 && current < 50.0 {
                        debug!("RSI neutral cross after hold for {}", mint);
                        rt.sell(&mint).await;
                    }
                }
            }
        }
    }
}
