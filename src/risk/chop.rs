//! Anti-chop filter
//!
//! Computes a choppiness index over the trailing price window and, when
//! the market is ranging instead of trending, applies one of several
//! defensive actions. Repeated detections force a longer recovery pause.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Response mode when chop is detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChopMode {
    /// Stop entering until the pause expires
    Pause,
    /// Halve position sizing
    ReduceSize,
    /// Tighten stop distances
    TightenStops,
    /// Raise the signal confidence bar
    FilterSignals,
}

/// Concrete action emitted on detection
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChopAction {
    Pause { until_ms: u64 },
    ReduceSize { factor: f64 },
    TightenStops { factor: f64 },
    FilterSignals { factor: f64 },
}

/// Anti-chop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChopConfig {
    /// Choppiness index above which the market counts as choppy (0-100)
    #[serde(default = "default_choppy_threshold")]
    pub choppy_threshold: f64,
    /// Trailing prices considered
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default = "default_mode")]
    pub anti_chop_mode: ChopMode,
    /// Pause length for `Pause` mode
    #[serde(default = "default_pause_secs")]
    pub pause_secs: u64,
    /// Consecutive detections before the long recovery pause kicks in
    #[serde(default = "default_max_consecutive")]
    pub max_consecutive: u32,
    /// Recovery pause after too many consecutive detections
    #[serde(default = "default_recovery_wait_secs")]
    pub recovery_wait_secs: u64,
}

fn default_choppy_threshold() -> f64 {
    61.8
}

fn default_window() -> usize {
    14
}

fn default_mode() -> ChopMode {
    ChopMode::Pause
}

fn default_pause_secs() -> u64 {
    60
}

fn default_max_consecutive() -> u32 {
    3
}

fn default_recovery_wait_secs() -> u64 {
    300
}

impl Default for ChopConfig {
    fn default() -> Self {
        Self {
            choppy_threshold: default_choppy_threshold(),
            window: default_window(),
            anti_chop_mode: default_mode(),
            pause_secs: default_pause_secs(),
            max_consecutive: default_max_consecutive(),
            recovery_wait_secs: default_recovery_wait_secs(),
        }
    }
}

/// Current chop assessment for one mint
#[derive(Debug, Clone)]
pub struct ChopState {
    pub choppiness: f64,
    pub is_choppy: bool,
    pub action: Option<ChopAction>,
    /// Whether entries are currently permitted for this mint
    pub trading_permitted: bool,
}

#[derive(Debug, Default)]
struct MintChop {
    consecutive: u32,
    last_detection_ms: Option<u64>,
    paused_until_ms: Option<u64>,
}

/// Anti-chop filter with per-mint state
pub struct AntiChopFilter {
    config: ChopConfig,
    trackers: HashMap<String, MintChop>,
}

/// Choppiness index over closing prices: ratio of path length travelled to
/// net range, log-scaled into [0, 100]. A window of identical prices has
/// no range and is defined as 0 (not choppy).
pub fn choppiness_index(prices: &[f64]) -> f64 {
    if prices.len() < 3 {
        return 0.0;
    }
    let high = prices.iter().copied().fold(f64::MIN, f64::max);
    let low = prices.iter().copied().fold(f64::MAX, f64::min);
    let range = high - low;
    if range <= 0.0 {
        return 0.0;
    }
    let path: f64 = prices.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
    if path <= 0.0 {
        return 0.0;
    }
    let n = (prices.len() - 1) as f64;
    (100.0 * (path / range).log10() / n.log10()).clamp(0.0, 100.0)
}

impl AntiChopFilter {
    pub fn new(config: ChopConfig) -> Self {
        Self {
            config,
            trackers: HashMap::new(),
        }
    }

    /// Evaluate a mint's trailing window at time `now_ms`
    pub fn evaluate(&mut self, mint: &str, prices: &[f64], now_ms: u64) -> ChopState {
        let window_start = prices.len().saturating_sub(self.config.window);
        let choppiness = choppiness_index(&prices[window_start..]);
        let is_choppy = choppiness > self.config.choppy_threshold;

        let recovery_wait_ms = self.config.recovery_wait_secs * 1000;
        let pause_ms = self.config.pause_secs * 1000;
        let max_consecutive = self.config.max_consecutive;
        let mode = self.config.anti_chop_mode;

        let tracker = self.trackers.entry(mint.to_string()).or_default();

        let action = if is_choppy {
            tracker.consecutive += 1;
            tracker.last_detection_ms = Some(now_ms);

            if tracker.consecutive > max_consecutive {
                // Too many detections in a row: force the long pause
                tracker.paused_until_ms = Some(now_ms + recovery_wait_ms);
                Some(ChopAction::Pause {
                    until_ms: now_ms + recovery_wait_ms,
                })
            } else {
                match mode {
                    ChopMode::Pause => {
                        tracker.paused_until_ms = Some(now_ms + pause_ms);
                        Some(ChopAction::Pause {
                            until_ms: now_ms + pause_ms,
                        })
                    }
                    ChopMode::ReduceSize => Some(ChopAction::ReduceSize { factor: 0.5 }),
                    ChopMode::TightenStops => Some(ChopAction::TightenStops { factor: 0.7 }),
                    ChopMode::FilterSignals => Some(ChopAction::FilterSignals { factor: 0.7 }),
                }
            }
        } else {
            // Re-permit once the last detection has aged out
            if tracker
                .last_detection_ms
                .map_or(true, |ts| now_ms.saturating_sub(ts) >= recovery_wait_ms)
            {
                tracker.consecutive = 0;
            }
            None
        };

        let paused = tracker.paused_until_ms.map_or(false, |until| now_ms < until);
        let recovered = tracker
            .last_detection_ms
            .map_or(true, |ts| now_ms.saturating_sub(ts) >= recovery_wait_ms);

        ChopState {
            choppiness,
            is_choppy,
            action,
            trading_permitted: !paused && (!is_choppy || recovered),
        }
    }

    /// Drop tracking for a mint
    pub fn clear(&mut self, mint: &str) {
        self.trackers.remove(mint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choppy_prices() -> Vec<f64> {
        // Oscillating hard around 1.0: long path, tiny net range coverage
        (0..20)
            .map(|i| if i % 2 == 0 { 1.0 } else { 1.05 })
            .collect()
    }

    fn trending_prices() -> Vec<f64> {
        (0..20).map(|i| 1.0 + i as f64 * 0.05).collect()
    }

    #[test]
    fn test_flat_window_is_not_choppy() {
        // All prices equal: choppiness is defined as 0
        let prices = vec![1.0; 20];
        assert_eq!(choppiness_index(&prices), 0.0);

        let mut filter = AntiChopFilter::new(ChopConfig::default());
        let state = filter.evaluate("m", &prices, 0);
        assert!(!state.is_choppy);
        assert!(state.trading_permitted);
    }

    #[test]
    fn test_trend_scores_low_chop_scores_high() {
        let trend = choppiness_index(&trending_prices());
        let chop = choppiness_index(&choppy_prices());
        assert!(chop > trend);
        assert!(chop > 61.8);
    }

    #[test]
    fn test_pause_mode_blocks_trading() {
        let mut filter = AntiChopFilter::new(ChopConfig {
            anti_chop_mode: ChopMode::Pause,
            pause_secs: 60,
            ..Default::default()
        });

        let state = filter.evaluate("m", &choppy_prices(), 1_000);
        assert!(state.is_choppy);
        assert!(matches!(state.action, Some(ChopAction::Pause { .. })));
        assert!(!state.trading_permitted);

        // Still paused 30s later
        let state = filter.evaluate("m", &trending_prices(), 31_000);
        assert!(!state.trading_permitted);
    }

    #[test]
    fn test_reduce_size_mode() {
        let mut filter = AntiChopFilter::new(ChopConfig {
            anti_chop_mode: ChopMode::ReduceSize,
            ..Default::default()
        });
        let state = filter.evaluate("m", &choppy_prices(), 0);
        assert!(matches!(
            state.action,
            Some(ChopAction::ReduceSize { factor }) if (factor - 0.5).abs() < 1e-9
        ));
    }

    #[test]
    fn test_consecutive_detections_force_recovery_pause() {
        let mut filter = AntiChopFilter::new(ChopConfig {
            anti_chop_mode: ChopMode::ReduceSize,
            max_consecutive: 2,
            recovery_wait_secs: 300,
            ..Default::default()
        });

        filter.evaluate("m", &choppy_prices(), 0);
        filter.evaluate("m", &choppy_prices(), 1_000);
        // Third consecutive detection exceeds the cap
        let state = filter.evaluate("m", &choppy_prices(), 2_000);
        assert!(matches!(
            state.action,
            Some(ChopAction::Pause { until_ms }) if until_ms == 2_000 + 300_000
        ));
        assert!(!state.trading_permitted);
    }

    #[test]
    fn test_recovery_after_wait() {
        let mut filter = AntiChopFilter::new(ChopConfig {
            anti_chop_mode: ChopMode::ReduceSize,
            recovery_wait_secs: 10,
            ..Default::default()
        });

        filter.evaluate("m", &choppy_prices(), 0);
        // Calm market well past the recovery wait
        let state = filter.evaluate("m", &trending_prices(), 20_000);
        assert!(!state.is_choppy);
        assert!(state.trading_permitted);
    }

    #[test]
    fn test_per_mint_isolation() {
        let mut filter = AntiChopFilter::new(ChopConfig::default());
        filter.evaluate("choppy", &choppy_prices(), 0);
        let state = filter.evaluate("calm", &trending_prices(), 0);
        assert!(state.trading_permitted);
    }
}
