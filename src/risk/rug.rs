//! Rug-pull detection
//!
//! Keeps a sliding window of recent ticks per mint and scores the window
//! for collapse patterns: clustered drops, vanishing volume, and runaway
//! downward velocity. Liquidity snapshots are tracked separately; a sharp
//! drop between consecutive snapshots raises its own alert regardless of
//! the tick score.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::warn;

/// How long an alert counts as "recent"
const ALERT_RECENCY_SECS: i64 = 60;

/// Rug detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RugConfig {
    /// Sliding tick window in seconds
    #[serde(default = "default_window_secs")]
    pub detection_window_secs: u64,
    /// Minimum ticks before scoring
    #[serde(default = "default_min_ticks")]
    pub min_ticks: usize,
    /// Per-tick drop fraction counted as a dump tick (0.10 = -10%)
    #[serde(default = "default_tick_drop")]
    pub tick_drop_threshold: f64,
    /// Volume fade fraction vs the historical average (0.5 = half)
    #[serde(default = "default_volume_drop")]
    pub volume_drop_threshold: f64,
    /// Price velocity trigger, in percent per second
    #[serde(default = "default_velocity")]
    pub velocity_threshold: f64,
    /// Score at which the window is called a rug
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f64,
    /// Liquidity drop fraction between snapshots raising a liquidity alert
    #[serde(default = "default_liq_drop")]
    pub liq_drop_threshold: f64,
}

fn default_window_secs() -> u64 {
    30
}

fn default_min_ticks() -> usize {
    5
}

fn default_tick_drop() -> f64 {
    0.10
}

fn default_volume_drop() -> f64 {
    0.5
}

fn default_velocity() -> f64 {
    2.0
}

fn default_confidence() -> f64 {
    0.7
}

fn default_liq_drop() -> f64 {
    0.3
}

impl Default for RugConfig {
    fn default() -> Self {
        Self {
            detection_window_secs: default_window_secs(),
            min_ticks: default_min_ticks(),
            tick_drop_threshold: default_tick_drop(),
            volume_drop_threshold: default_volume_drop(),
            velocity_threshold: default_velocity(),
            confidence_threshold: default_confidence(),
            liq_drop_threshold: default_liq_drop(),
        }
    }
}

/// Urgency tier derived from the rug score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RugUrgency {
    Low,
    Medium,
    High,
    Critical,
}

impl RugUrgency {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            RugUrgency::Critical
        } else if score >= 0.7 {
            RugUrgency::High
        } else if score >= 0.5 {
            RugUrgency::Medium
        } else {
            RugUrgency::Low
        }
    }
}

/// Result of scoring a mint's tick window
#[derive(Debug, Clone)]
pub struct RugAnalysis {
    pub mint: String,
    pub score: f64,
    pub urgency: RugUrgency,
    pub is_rug: bool,
    /// Which score terms fired
    pub reasons: Vec<String>,
}

impl RugAnalysis {
    fn clean(mint: &str) -> Self {
        Self {
            mint: mint.to_string(),
            score: 0.0,
            urgency: RugUrgency::Low,
            is_rug: false,
            reasons: vec![],
        }
    }
}

#[derive(Debug, Clone)]
struct Tick {
    price: f64,
    volume: f64,
    ts: chrono::DateTime<chrono::Utc>,
    /// Fractional change vs the previous tick
    price_change: f64,
}

#[derive(Debug, Default)]
struct MintWindow {
    ticks: VecDeque<Tick>,
    last_liquidity: Option<f64>,
    last_alert: Option<chrono::DateTime<chrono::Utc>>,
}

/// Rug detector
pub struct RugDetector {
    config: RugConfig,
    windows: HashMap<String, MintWindow>,
}

impl RugDetector {
    pub fn new(config: RugConfig) -> Self {
        Self {
            config,
            windows: HashMap::new(),
        }
    }

    /// Record a tick for a mint, evicting anything outside the window
    pub fn record_tick(
        &mut self,
        mint: &str,
        price: f64,
        volume: f64,
        ts: chrono::DateTime<chrono::Utc>,
    ) {
        let window = self.windows.entry(mint.to_string()).or_default();

        let price_change = match window.ticks.back() {
            Some(prev) if prev.price > 0.0 => (price - prev.price) / prev.price,
            _ => 0.0,
        };

        window.ticks.push_back(Tick {
            price,
            volume,
            ts,
            price_change,
        });

        let cutoff = ts - chrono::Duration::seconds(self.config.detection_window_secs as i64);
        while window
            .ticks
            .front()
            .map_or(false, |t| t.ts < cutoff)
        {
            window.ticks.pop_front();
        }
    }

    /// Score the current window for a mint
    pub fn analyze(&self, mint: &str) -> RugAnalysis {
        let Some(window) = self.windows.get(mint) else {
            return RugAnalysis::clean(mint);
        };
        let ticks = &window.ticks;
        if ticks.len() < self.config.min_ticks {
            return RugAnalysis::clean(mint);
        }

        let mut score = 0.0;
        let mut reasons = vec![];

        // Clustered dump ticks: at least half the window dropping hard
        let drop_count = ticks
            .iter()
            .filter(|t| t.price_change <= -self.config.tick_drop_threshold)
            .count();
        if drop_count >= ticks.len() / 2 {
            score += 0.4;
            reasons.push(format!("{}/{} dump ticks", drop_count, ticks.len()));
        }

        // Volume fade: recent volume collapsing vs the window average
        if ticks.len() >= 3 {
            let hist_avg = ticks.iter().map(|t| t.volume).sum::<f64>() / ticks.len() as f64;
            let recent: Vec<f64> = ticks.iter().rev().take(3).map(|t| t.volume).collect();
            let recent_avg = recent.iter().sum::<f64>() / recent.len() as f64;
            if hist_avg > 0.0 && recent_avg < hist_avg * (1.0 - self.config.volume_drop_threshold)
            {
                score += 0.3;
                reasons.push(format!(
                    "volume fade {:.3} vs {:.3}",
                    recent_avg, hist_avg
                ));
            }
        }

        // Velocity: absolute change over elapsed time, percent per second
        if let (Some(first), Some(last)) = (ticks.front(), ticks.back()) {
            let elapsed = (last.ts - first.ts).num_milliseconds() as f64 / 1000.0;
            if elapsed > 0.0 && first.price > 0.0 {
                let total_change = (last.price - first.price) / first.price;
                let velocity = total_change.abs() / elapsed * 100.0;
                if velocity > self.config.velocity_threshold {
                    score += 0.3;
                    reasons.push(format!("velocity {:.2}%/s", velocity));
                }
            }
        }

        let is_rug = score >= self.config.confidence_threshold;
        if is_rug {
            warn!("Rug score {:.2} for {} ({})", score, mint, reasons.join(", "));
        }

        RugAnalysis {
            mint: mint.to_string(),
            score,
            urgency: RugUrgency::from_score(score),
            is_rug,
            reasons,
        }
    }

    /// Record a liquidity snapshot; a drop beyond the threshold between
    /// consecutive snapshots raises a liquidity-rug alert.
    pub fn record_liquidity(
        &mut self,
        mint: &str,
        liquidity: f64,
        ts: chrono::DateTime<chrono::Utc>,
    ) -> bool {
        let threshold = self.config.liq_drop_threshold;
        let window = self.windows.entry(mint.to_string()).or_default();
        let alert = match window.last_liquidity {
            Some(prev) if prev > 0.0 => (prev - liquidity) / prev > threshold,
            _ => false,
        };
        window.last_liquidity = Some(liquidity);
        if alert {
            warn!("Liquidity rug alert for {}", mint);
            window.last_alert = Some(ts);
        }
        alert
    }

    /// Whether a liquidity alert fired within the last 60 seconds
    pub fn has_recent_alert(&self, mint: &str, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.windows
            .get(mint)
            .and_then(|w| w.last_alert)
            .map_or(false, |ts| {
                (now - ts).num_seconds() <= ALERT_RECENCY_SECS
            })
    }

    /// Drop all tracking for a mint
    pub fn clear(&mut self, mint: &str) {
        self.windows.remove(mint);
    }

    /// Ticks currently inside a mint's window
    pub fn tick_count(&self, mint: &str) -> usize {
        self.windows.get(mint).map_or(0, |w| w.ticks.len())
    }

    /// Prices inside a mint's window, oldest first
    pub fn recent_prices(&self, mint: &str) -> Vec<f64> {
        self.windows
            .get(mint)
            .map(|w| w.ticks.iter().map(|t| t.price).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> RugDetector {
        RugDetector::new(RugConfig {
            detection_window_secs: 30,
            min_ticks: 5,
            tick_drop_threshold: 0.10,
            ..Default::default()
        })
    }

    fn feed_drops(detector: &mut RugDetector, mint: &str, n: usize, drop: f64) {
        let start = chrono::Utc::now();
        let mut price = 1.0;
        detector.record_tick(mint, price, 10.0, start);
        for i in 0..n {
            price *= 1.0 + drop;
            detector.record_tick(
                mint,
                price,
                10.0,
                start + chrono::Duration::seconds(i as i64 + 1),
            );
        }
    }

    #[test]
    fn test_clean_below_min_ticks() {
        let mut detector = detector();
        detector.record_tick("m", 1.0, 10.0, chrono::Utc::now());
        let analysis = detector.analyze("m");
        assert_eq!(analysis.score, 0.0);
        assert!(!analysis.is_rug);
    }

    #[test]
    fn test_sustained_dump_is_rug() {
        let mut detector = detector();
        // Five ticks each -12%: dump-tick term and velocity term both fire
        feed_drops(&mut detector, "m", 5, -0.12);

        let analysis = detector.analyze("m");
        assert!(analysis.is_rug);
        assert!(analysis.score >= 0.7);
        assert!(matches!(
            analysis.urgency,
            RugUrgency::High | RugUrgency::Critical
        ));
    }

    #[test]
    fn test_steady_prices_not_rug() {
        let mut detector = detector();
        let start = chrono::Utc::now();
        for i in 0..8 {
            detector.record_tick(
                "m",
                1.0 + (i as f64) * 0.001,
                10.0,
                start + chrono::Duration::seconds(i),
            );
        }
        let analysis = detector.analyze("m");
        assert!(!analysis.is_rug);
        assert_eq!(analysis.score, 0.0);
    }

    #[test]
    fn test_volume_fade_scores() {
        let mut detector = detector();
        let start = chrono::Utc::now();
        // Healthy volume then collapse; price flat so only volume fires
        for i in 0..5 {
            detector.record_tick("m", 1.0, 20.0, start + chrono::Duration::seconds(i));
        }
        for i in 5..8 {
            detector.record_tick("m", 1.0, 0.5, start + chrono::Duration::seconds(i));
        }
        let analysis = detector.analyze("m");
        assert!((analysis.score - 0.3).abs() < 1e-9);
        assert!(!analysis.is_rug);
    }

    #[test]
    fn test_window_eviction() {
        let mut detector = detector();
        let start = chrono::Utc::now();
        detector.record_tick("m", 1.0, 10.0, start);
        // 40 seconds later; the first tick leaves the 30s window
        detector.record_tick("m", 1.0, 10.0, start + chrono::Duration::seconds(40));
        assert_eq!(detector.tick_count("m"), 1);
    }

    #[test]
    fn test_liquidity_rug_alert() {
        let mut detector = detector();
        let now = chrono::Utc::now();
        assert!(!detector.record_liquidity("m", 100.0, now));
        // 50% drop beyond the 30% threshold
        assert!(detector.record_liquidity("m", 50.0, now));
        assert!(detector.has_recent_alert("m", now));
        assert!(!detector.has_recent_alert("m", now + chrono::Duration::seconds(120)));
    }

    #[test]
    fn test_small_liquidity_drop_no_alert() {
        let mut detector = detector();
        let now = chrono::Utc::now();
        detector.record_liquidity("m", 100.0, now);
        assert!(!detector.record_liquidity("m", 90.0, now));
    }

    #[test]
    fn test_urgency_tiers() {
        assert_eq!(RugUrgency::from_score(0.95), RugUrgency::Critical);
        assert_eq!(RugUrgency::from_score(0.75), RugUrgency::High);
        assert_eq!(RugUrgency::from_score(0.55), RugUrgency::Medium);
        assert_eq!(RugUrgency::from_score(0.2), RugUrgency::Low);
    }

    #[test]
    fn test_clear_resets_state() {
        let mut detector = detector();
        feed_drops(&mut detector, "m", 5, -0.12);
        detector.clear("m");
        assert_eq!(detector.tick_count("m"), 0);
        assert!(!detector.analyze("m").is_rug);
    }
}
