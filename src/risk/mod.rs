//! Position risk engine
//!
//! Composes the rug detector, anti-chop filter, time-based exits, and the
//! trailing stop into one evaluation with a fixed priority order:
//! liquidity rug, then rug score, then flat period, then hold time, then
//! trailing stop. The first rule to fire wins and the orchestrator
//! serializes the resulting sell.

pub mod chop;
pub mod rug;
pub mod time_exit;
pub mod trailing;

pub use chop::{AntiChopFilter, ChopAction, ChopConfig, ChopMode, ChopState};
pub use rug::{RugAnalysis, RugConfig, RugDetector, RugUrgency};
pub use time_exit::{TimeBasedExitManager, TimeExitConfig, TimeExitMode, TimeExitReason};
pub use trailing::{TrailingConfig, TrailingDecision, TrailingStop};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::orders::OrderPriority;
use crate::position::Position;

/// Combined risk configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default)]
    pub rug: RugConfig,
    #[serde(default)]
    pub chop: ChopConfig,
    #[serde(default)]
    pub time_exit: TimeExitConfig,
    #[serde(default)]
    pub trailing: TrailingConfig,
}

/// Why the risk engine wants out of a position, in priority order
#[derive(Debug, Clone, PartialEq)]
pub enum RiskExitReason {
    LiquidityRug,
    Rug { score: f64, urgency: RugUrgency },
    Flat,
    TimeLimit(TimeExitReason),
    TrailingStop,
}

impl RiskExitReason {
    /// Execution priority for the forced sell
    pub fn priority(&self) -> OrderPriority {
        match self {
            RiskExitReason::LiquidityRug => OrderPriority::Emergency,
            RiskExitReason::Rug { urgency, .. } => match urgency {
                RugUrgency::Critical | RugUrgency::High => OrderPriority::Emergency,
                _ => OrderPriority::High,
            },
            RiskExitReason::Flat | RiskExitReason::TimeLimit(_) => OrderPriority::High,
            RiskExitReason::TrailingStop => OrderPriority::High,
        }
    }
}

/// A forced-exit recommendation
#[derive(Debug, Clone, PartialEq)]
pub struct RiskVerdict {
    pub mint: String,
    pub reason: RiskExitReason,
}

/// Full result of one risk pass over a position
#[derive(Debug, Clone, PartialEq)]
pub struct RiskEvaluation {
    /// Forced exit, when any rule fired
    pub exit: Option<RiskVerdict>,
    /// Trailing stop level to arm or raise, applied even when holding
    pub stop_price: Option<f64>,
    pub arm_breakeven: bool,
}

/// Composed risk engine
pub struct RiskEngine {
    rug: RugDetector,
    chop: AntiChopFilter,
    time_exit: TimeBasedExitManager,
    trailing: TrailingStop,
}

impl RiskEngine {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            rug: RugDetector::new(config.rug),
            chop: AntiChopFilter::new(config.chop),
            time_exit: TimeBasedExitManager::new(config.time_exit),
            trailing: TrailingStop::new(config.trailing),
        }
    }

    /// Feed a price tick into the rug window
    pub fn record_tick(
        &mut self,
        mint: &str,
        price: f64,
        volume: f64,
        ts: chrono::DateTime<chrono::Utc>,
    ) {
        self.rug.record_tick(mint, price, volume, ts);
    }

    /// Feed a liquidity snapshot; returns true when a liquidity-rug alert fired
    pub fn record_liquidity(
        &mut self,
        mint: &str,
        liquidity: f64,
        ts: chrono::DateTime<chrono::Utc>,
    ) -> bool {
        self.rug.record_liquidity(mint, liquidity, ts)
    }

    /// Gate and scale entries for a mint based on the chop state of its
    /// recent tick window
    pub fn entry_state(&mut self, mint: &str, now_ms: u64) -> ChopState {
        let prices = self.rug.recent_prices(mint);
        self.chop.evaluate(mint, &prices, now_ms)
    }

    /// Score a mint's rug window without evaluating a position
    pub fn rug_analysis(&self, mint: &str) -> RugAnalysis {
        self.rug.analyze(mint)
    }

    /// Evaluate an open position, applying the fixed priority order
    pub fn evaluate(
        &mut self,
        position: &Position,
        now: chrono::DateTime<chrono::Utc>,
    ) -> RiskEvaluation {
        let now_ms = now.timestamp_millis().max(0) as u64;
        let mint = position.mint.as_str();

        // Trailing decision is computed up front so stop updates land even
        // when a higher-priority rule forces the exit.
        let trailing = self.trailing.evaluate(position);

        let exit = if let Some(verdict) = self.check_liquidity_rug(mint, now) {
            Some(verdict)
        } else if let Some(verdict) = self.check_rug(mint) {
            Some(verdict)
        } else if let Some(verdict) = self.check_flat(position, now_ms) {
            Some(verdict)
        } else if let Some(verdict) = self.check_hold(position, now) {
            Some(verdict)
        } else if trailing.triggered {
            Some(RiskVerdict {
                mint: mint.to_string(),
                reason: RiskExitReason::TrailingStop,
            })
        } else {
            None
        };

        if let Some(verdict) = &exit {
            info!("Risk exit for {}: {:?}", mint, verdict.reason);
        }

        RiskEvaluation {
            exit,
            stop_price: trailing.stop_price,
            arm_breakeven: trailing.arm_breakeven,
        }
    }

    /// Drop all per-mint state after a position closes
    pub fn clear(&mut self, mint: &str) {
        self.rug.clear(mint);
        self.chop.clear(mint);
        self.time_exit.clear(mint);
    }

    fn check_liquidity_rug(
        &self,
        mint: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Option<RiskVerdict> {
        self.rug.has_recent_alert(mint, now).then(|| RiskVerdict {
            mint: mint.to_string(),
            reason: RiskExitReason::LiquidityRug,
        })
    }

    fn check_rug(&self, mint: &str) -> Option<RiskVerdict> {
        let analysis = self.rug.analyze(mint);
        analysis.is_rug.then(|| RiskVerdict {
            mint: mint.to_string(),
            reason: RiskExitReason::Rug {
                score: analysis.score,
                urgency: analysis.urgency,
            },
        })
    }

    fn check_flat(&mut self, position: &Position, now_ms: u64) -> Option<RiskVerdict> {
        let prices: Vec<f64> = position.price_history.iter().copied().collect();
        self.time_exit
            .check_flat(&position.mint, &prices, now_ms)
            .map(|_| RiskVerdict {
                mint: position.mint.clone(),
                reason: RiskExitReason::Flat,
            })
    }

    fn check_hold(
        &self,
        position: &Position,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Option<RiskVerdict> {
        let hold_ms = (now - position.entry_time).num_milliseconds().max(0) as u64;
        self.time_exit
            .check_hold(position.unrealized_pnl_pct(), hold_ms)
            .map(|reason| RiskVerdict {
                mint: position.mint.clone(),
                reason: RiskExitReason::TimeLimit(reason),
            })
    }
}
