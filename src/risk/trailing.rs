//! Trailing stop
//!
//! Arms once a position clears a minimum profit, then follows the peak
//! down by a fixed fraction. The stop only ever rises for long positions;
//! an optional breakeven floor keeps an armed position from turning into
//! a loss.

use serde::{Deserialize, Serialize};

use crate::position::Position;

/// Trailing stop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailingConfig {
    /// P&L fraction at which the stop arms (0.05 = +5%)
    #[serde(default = "default_min_profit")]
    pub min_profit_before_trailing: f64,
    /// Distance below the peak, as a fraction (0.15 = 15%)
    #[serde(default = "default_trailing_pct")]
    pub trailing_pct: f64,
    /// Never let the stop fall below entry once armed
    #[serde(default = "default_true")]
    pub breakeven_enabled: bool,
}

fn default_min_profit() -> f64 {
    0.05
}

fn default_trailing_pct() -> f64 {
    0.15
}

fn default_true() -> bool {
    true
}

impl Default for TrailingConfig {
    fn default() -> Self {
        Self {
            min_profit_before_trailing: default_min_profit(),
            trailing_pct: default_trailing_pct(),
            breakeven_enabled: default_true(),
        }
    }
}

/// Decision from one trailing-stop evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailingDecision {
    /// New stop level to arm or raise to, when profit qualifies
    pub stop_price: Option<f64>,
    /// Breakeven floor became active this evaluation
    pub arm_breakeven: bool,
    /// Position should be closed now
    pub triggered: bool,
}

/// Trailing stop evaluator
pub struct TrailingStop {
    config: TrailingConfig,
}

impl TrailingStop {
    pub fn new(config: TrailingConfig) -> Self {
        Self { config }
    }

    /// Evaluate a position against its peak and armed stop
    pub fn evaluate(&self, position: &Position) -> TrailingDecision {
        let pnl_pct = position.unrealized_pnl_pct();

        let mut stop_price = None;
        let mut arm_breakeven = false;

        if pnl_pct >= self.config.min_profit_before_trailing {
            let mut candidate = position.peak * (1.0 - self.config.trailing_pct);
            if self.config.breakeven_enabled {
                candidate = candidate.max(position.entry_price);
                arm_breakeven = !position.breakeven_armed;
            }
            // The manager ratchets; only propose raises
            if !position.trailing_armed || candidate > position.trailing_stop_price {
                stop_price = Some(candidate);
            }
        }

        let effective_stop = match stop_price {
            Some(candidate) if position.trailing_armed => {
                candidate.max(position.trailing_stop_price)
            }
            Some(candidate) => candidate,
            None if position.trailing_armed => position.trailing_stop_price,
            None => {
                return TrailingDecision {
                    stop_price: None,
                    arm_breakeven: false,
                    triggered: false,
                }
            }
        };

        TrailingDecision {
            stop_price,
            arm_breakeven,
            triggered: position.current_price < effective_stop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn position(entry: f64, current: f64, peak: f64) -> Position {
        Position {
            mint: "m".into(),
            entry_price: entry,
            entry_time: chrono::Utc::now(),
            amount_usd: 10.0,
            current_price: current,
            peak,
            trough: entry.min(current),
            price_history: VecDeque::new(),
            trailing_stop_price: 0.0,
            trailing_armed: false,
            breakeven_armed: false,
            volatility: 0.0,
        }
    }

    fn stop() -> TrailingStop {
        TrailingStop::new(TrailingConfig {
            min_profit_before_trailing: 0.05,
            trailing_pct: 0.10,
            breakeven_enabled: false,
        })
    }

    #[test]
    fn test_not_armed_below_min_profit() {
        let decision = stop().evaluate(&position(1.0, 1.02, 1.02));
        assert_eq!(decision.stop_price, None);
        assert!(!decision.triggered);
    }

    #[test]
    fn test_arms_at_min_profit() {
        let decision = stop().evaluate(&position(1.0, 1.06, 1.06));
        let armed = decision.stop_price.unwrap();
        assert!((armed - 1.06 * 0.9).abs() < 1e-12);
        assert!(!decision.triggered);
    }

    #[test]
    fn test_triggers_below_stop() {
        let mut p = position(1.0, 1.05, 1.3);
        p.trailing_armed = true;
        p.trailing_stop_price = 1.3 * 0.9; // 1.17

        let decision = stop().evaluate(&p);
        assert!(decision.triggered);
    }

    #[test]
    fn test_stop_only_proposes_raises() {
        let mut p = position(1.0, 1.2, 1.2);
        p.trailing_armed = true;
        p.trailing_stop_price = 1.15; // already above peak*0.9 = 1.08

        let decision = stop().evaluate(&p);
        assert_eq!(decision.stop_price, None);
        assert!(!decision.triggered); // 1.2 > 1.15
    }

    #[test]
    fn test_stop_rises_with_peak() {
        let trailing = stop();
        let mut p = position(1.0, 1.1, 1.1);

        let first = trailing.evaluate(&p).stop_price.unwrap();
        p.trailing_armed = true;
        p.trailing_stop_price = first;

        p.peak = 1.5;
        p.current_price = 1.5;
        let second = trailing.evaluate(&p).stop_price.unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_breakeven_floor() {
        let trailing = TrailingStop::new(TrailingConfig {
            min_profit_before_trailing: 0.05,
            trailing_pct: 0.30,
            breakeven_enabled: true,
        });
        // Peak*0.7 would be below entry; the floor holds at entry
        let decision = trailing.evaluate(&position(1.0, 1.06, 1.06));
        assert_eq!(decision.stop_price, Some(1.0));
        assert!(decision.arm_breakeven);
    }
}
