//! Time-based exits
//!
//! Recommends exits from hold time, with the effective limit scaled by
//! the position's P&L, plus detection of "flat" periods where the price
//! has stopped moving entirely.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Samples considered for flat-period detection
const FLAT_WINDOW: usize = 10;

/// How the hold-time limit is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeExitMode {
    /// Exit at the unscaled maximum regardless of P&L
    HardLimit,
    /// Exit at the P&L-scaled maximum
    Conditional,
    /// Only exit profitable positions on time
    ProfitOnly,
    /// Only exit losing positions on time
    LossOnly,
}

/// Time exit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeExitConfig {
    #[serde(default = "default_mode")]
    pub time_based_exit_mode: TimeExitMode,
    /// Base maximum hold
    #[serde(default = "default_max_hold_ms")]
    pub max_hold_ms: u64,
    /// Hold scale while in profit (take the win sooner)
    #[serde(default = "default_profit_reduction")]
    pub profit_reduction: f64,
    /// Hold scale while in a shallow loss (give it room)
    #[serde(default = "default_loss_extension")]
    pub loss_extension: f64,
    /// Hold limit once the loss is deeper than 5%
    #[serde(default = "default_quick_exit_ms")]
    pub quick_exit_time_ms: u64,
    /// Range (fraction of mid) under which the trailing window counts as flat
    #[serde(default = "default_flat_range")]
    pub flat_range_threshold: f64,
    /// Flat persistence required before recommending exit
    #[serde(default = "default_time_to_flat_ms")]
    pub time_to_flat_ms: u64,
}

fn default_mode() -> TimeExitMode {
    TimeExitMode::Conditional
}

fn default_max_hold_ms() -> u64 {
    300_000
}

fn default_profit_reduction() -> f64 {
    0.5
}

fn default_loss_extension() -> f64 {
    1.5
}

fn default_quick_exit_ms() -> u64 {
    30_000
}

fn default_flat_range() -> f64 {
    0.005
}

fn default_time_to_flat_ms() -> u64 {
    120_000
}

impl Default for TimeExitConfig {
    fn default() -> Self {
        Self {
            time_based_exit_mode: default_mode(),
            max_hold_ms: default_max_hold_ms(),
            profit_reduction: default_profit_reduction(),
            loss_extension: default_loss_extension(),
            quick_exit_time_ms: default_quick_exit_ms(),
            flat_range_threshold: default_flat_range(),
            time_to_flat_ms: default_time_to_flat_ms(),
        }
    }
}

/// Why a time exit fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeExitReason {
    /// Unscaled hard limit reached
    HardLimit,
    /// P&L-scaled limit reached
    ScaledLimit,
    /// Price has been flat long enough
    Flat,
}

#[derive(Debug, Default)]
struct FlatTracker {
    flat_since_ms: Option<u64>,
}

/// Time-based exit manager
pub struct TimeBasedExitManager {
    config: TimeExitConfig,
    flat: HashMap<String, FlatTracker>,
}

impl TimeBasedExitManager {
    pub fn new(config: TimeExitConfig) -> Self {
        Self {
            config,
            flat: HashMap::new(),
        }
    }

    /// Effective maximum hold for a position at the given P&L
    pub fn effective_max_hold_ms(&self, pnl_pct: f64) -> u64 {
        if pnl_pct > 0.0 {
            (self.config.max_hold_ms as f64 * self.config.profit_reduction) as u64
        } else if pnl_pct < -0.05 {
            self.config.quick_exit_time_ms
        } else {
            (self.config.max_hold_ms as f64 * self.config.loss_extension) as u64
        }
    }

    /// Check hold-time exits for a position
    pub fn check_hold(&self, pnl_pct: f64, hold_ms: u64) -> Option<TimeExitReason> {
        match self.config.time_based_exit_mode {
            TimeExitMode::HardLimit => {
                (hold_ms >= self.config.max_hold_ms).then_some(TimeExitReason::HardLimit)
            }
            TimeExitMode::Conditional => {
                (hold_ms >= self.effective_max_hold_ms(pnl_pct))
                    .then_some(TimeExitReason::ScaledLimit)
            }
            TimeExitMode::ProfitOnly => (pnl_pct > 0.0
                && hold_ms >= self.effective_max_hold_ms(pnl_pct))
            .then_some(TimeExitReason::ScaledLimit),
            TimeExitMode::LossOnly => (pnl_pct < 0.0
                && hold_ms >= self.effective_max_hold_ms(pnl_pct))
            .then_some(TimeExitReason::ScaledLimit),
        }
    }

    /// Feed the trailing price history; returns `Flat` once the trailing-10
    /// range has stayed inside the threshold for long enough.
    pub fn check_flat(
        &mut self,
        mint: &str,
        prices: &[f64],
        now_ms: u64,
    ) -> Option<TimeExitReason> {
        if prices.len() < FLAT_WINDOW {
            return None;
        }
        let window = &prices[prices.len() - FLAT_WINDOW..];
        let high = window.iter().copied().fold(f64::MIN, f64::max);
        let low = window.iter().copied().fold(f64::MAX, f64::min);
        let mid = (high + low) / 2.0;
        let is_flat = mid > 0.0 && (high - low) / mid <= self.config.flat_range_threshold;

        let tracker = self.flat.entry(mint.to_string()).or_default();
        if !is_flat {
            tracker.flat_since_ms = None;
            return None;
        }

        let since = *tracker.flat_since_ms.get_or_insert(now_ms);
        (now_ms.saturating_sub(since) >= self.config.time_to_flat_ms)
            .then_some(TimeExitReason::Flat)
    }

    pub fn clear(&mut self, mint: &str) {
        self.flat.remove(mint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(mode: TimeExitMode) -> TimeBasedExitManager {
        TimeBasedExitManager::new(TimeExitConfig {
            time_based_exit_mode: mode,
            max_hold_ms: 100_000,
            profit_reduction: 0.5,
            loss_extension: 1.5,
            quick_exit_time_ms: 10_000,
            flat_range_threshold: 0.01,
            time_to_flat_ms: 5_000,
        })
    }

    #[test]
    fn test_effective_hold_scaling() {
        let m = manager(TimeExitMode::Conditional);
        // Profitable: half the base hold
        assert_eq!(m.effective_max_hold_ms(0.02), 50_000);
        // Deep loss: quick exit window
        assert_eq!(m.effective_max_hold_ms(-0.10), 10_000);
        // Shallow loss: extended hold
        assert_eq!(m.effective_max_hold_ms(-0.02), 150_000);
        assert_eq!(m.effective_max_hold_ms(0.0), 150_000);
    }

    #[test]
    fn test_hard_limit_mode_ignores_pnl() {
        let m = manager(TimeExitMode::HardLimit);
        assert_eq!(m.check_hold(0.5, 99_999), None);
        assert_eq!(m.check_hold(0.5, 100_000), Some(TimeExitReason::HardLimit));
        assert_eq!(m.check_hold(-0.5, 100_000), Some(TimeExitReason::HardLimit));
    }

    #[test]
    fn test_conditional_mode() {
        let m = manager(TimeExitMode::Conditional);
        // Profitable position exits at the reduced limit
        assert_eq!(m.check_hold(0.02, 50_000), Some(TimeExitReason::ScaledLimit));
        assert_eq!(m.check_hold(0.02, 49_999), None);
        // Deep loss exits quickly
        assert_eq!(m.check_hold(-0.10, 10_000), Some(TimeExitReason::ScaledLimit));
    }

    #[test]
    fn test_profit_only_mode() {
        let m = manager(TimeExitMode::ProfitOnly);
        assert_eq!(m.check_hold(0.02, 60_000), Some(TimeExitReason::ScaledLimit));
        assert_eq!(m.check_hold(-0.10, 999_999), None);
    }

    #[test]
    fn test_loss_only_mode() {
        let m = manager(TimeExitMode::LossOnly);
        assert_eq!(m.check_hold(-0.10, 10_000), Some(TimeExitReason::ScaledLimit));
        assert_eq!(m.check_hold(0.5, 999_999), None);
    }

    #[test]
    fn test_flat_detection_requires_persistence() {
        let mut m = manager(TimeExitMode::Conditional);
        let flat_prices = vec![1.0; 12];

        // First sighting starts the clock
        assert_eq!(m.check_flat("m", &flat_prices, 0), None);
        // Not yet persisted long enough
        assert_eq!(m.check_flat("m", &flat_prices, 4_000), None);
        // Past the persistence threshold
        assert_eq!(m.check_flat("m", &flat_prices, 5_000), Some(TimeExitReason::Flat));
    }

    #[test]
    fn test_movement_resets_flat_clock() {
        let mut m = manager(TimeExitMode::Conditional);
        let flat_prices = vec![1.0; 12];
        let mut moving = vec![1.0; 11];
        moving.push(1.2);

        m.check_flat("m", &flat_prices, 0);
        // A real move resets the tracker
        assert_eq!(m.check_flat("m", &moving, 3_000), None);
        // Clock restarts from the next flat sighting
        assert_eq!(m.check_flat("m", &flat_prices, 6_000), None);
        assert_eq!(
            m.check_flat("m", &flat_prices, 11_000),
            Some(TimeExitReason::Flat)
        );
    }

    #[test]
    fn test_flat_needs_full_window() {
        let mut m = manager(TimeExitMode::Conditional);
        assert_eq!(m.check_flat("m", &[1.0; 5], 0), None);
    }
}
