//! Trading strategies
//!
//! A strategy reacts to token discovery and price ticks through a narrow
//! capability surface granted by the engine. Dispatch is a plain tagged
//! union; strategies must not block and route all trading through the
//! queued `buy`/`sell` capabilities.

pub mod bollinger;
pub mod breakout;
pub mod combined;
pub mod momentum;
pub mod rsi;
pub mod scalper;
pub mod timing;

#[cfg(test)]
pub(crate) mod testutil;

pub use bollinger::{BollingerConfig, BollingerReversion};
pub use breakout::{BreakoutConfig, BreakoutStrategy};
pub use combined::{CombinedConfig, TechnicalCombined};
pub use momentum::{MomentumConfig, MomentumStrategy};
pub use rsi::{RsiConfig, RsiStrategy};
pub use scalper::{ScalperConfig, ShitcoinScalper};
pub use timing::{TimingConfig, TimingStrategy, TimingVariant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::feed::TokenEvent;
use crate::token::{TokenState, TokenStatus};

/// Signal direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

/// A strategy's trading intent, recorded for observability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySignal {
    pub action: SignalAction,
    pub symbol: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl StrategySignal {
    pub fn new(action: SignalAction, symbol: impl Into<String>, confidence: f64) -> Self {
        Self {
            action,
            symbol: symbol.into(),
            confidence: confidence.clamp(0.0, 1.0),
            metadata: HashMap::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// Lightweight token snapshot handed to strategies, in insertion order
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub mint: String,
    pub state: TokenState,
    pub entry_price: f64,
    pub entry_time_ms: u64,
    pub amount_usd: f64,
}

impl TokenInfo {
    pub fn is_held(&self) -> bool {
        self.state.is_held()
    }
}

/// Capability surface the engine grants to the active strategy
#[async_trait]
pub trait StrategyRuntime: Send + Sync {
    /// Whether the mint has never been traded this session
    async fn is_new(&self, mint: &str) -> bool;

    /// Full status for a mint, if tracked
    async fn status(&self, mint: &str) -> Option<TokenStatus>;

    /// Snapshot of all tracked tokens in insertion order
    async fn all_tokens(&self) -> Vec<TokenInfo>;

    /// Queue a buy; returns false when refused (limits, dedup, blocked)
    async fn buy(&self, mint: &str) -> bool;

    /// Queue a sell; returns false when refused
    async fn sell(&self, mint: &str) -> bool;

    /// Latest known USD price for a mint
    async fn get_token_usd_price(&self, mint: &str) -> Option<f64>;

    /// Recent closing prices, oldest first
    async fn get_price_history(&self, mint: &str) -> Vec<f64>;

    /// Wall-clock milliseconds
    fn now_ms(&self) -> u64;
}

/// Strategy contract
#[async_trait]
pub trait Strategy: Send {
    fn name(&self) -> &'static str;

    /// A token was discovered and passed validation
    async fn on_discovered(&mut self, event: &TokenEvent, rt: &dyn StrategyRuntime);

    /// A monitor tick fired; evaluate positions in insertion order
    async fn on_tick(&mut self, rt: &dyn StrategyRuntime);
}

/// Which strategy variant is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    ShitcoinScalper,
    Rsi,
    Breakout,
    BollingerMeanReversion,
    Momentum,
    TechnicalCombined,
    Immediate,
    DelayedEntry,
    BatchAccumulate,
    PumpFunPriority,
}

/// Strategy configuration: the active type plus per-variant parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySettings {
    #[serde(default = "default_kind")]
    pub kind: StrategyType,
    #[serde(default)]
    pub scalper: ScalperConfig,
    #[serde(default)]
    pub rsi: RsiConfig,
    #[serde(default)]
    pub breakout: BreakoutConfig,
    #[serde(default)]
    pub bollinger: BollingerConfig,
    #[serde(default)]
    pub momentum: MomentumConfig,
    #[serde(default)]
    pub combined: CombinedConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

fn default_kind() -> StrategyType {
    StrategyType::ShitcoinScalper
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            scalper: ScalperConfig::default(),
            rsi: RsiConfig::default(),
            breakout: BreakoutConfig::default(),
            bollinger: BollingerConfig::default(),
            momentum: MomentumConfig::default(),
            combined: CombinedConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

impl StrategySettings {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scalper.profit_take <= 0.0 || self.scalper.stop_loss <= 0.0 {
            anyhow::bail!("scalper profit_take and stop_loss must be positive");
        }
        if self.rsi.period < 2 {
            anyhow::bail!("rsi.period must be at least 2");
        }
        if !(0.0..=100.0).contains(&self.rsi.oversold)
            || !(0.0..=100.0).contains(&self.rsi.overbought)
            || self.rsi.oversold >= self.rsi.overbought
        {
            anyhow::bail!("rsi thresholds must satisfy 0 <= oversold < overbought <= 100");
        }
        if self.breakout.lookback < 2 {
            anyhow::bail!("breakout.lookback must be at least 2");
        }
        if self.combined.decision_threshold <= 0.0 {
            anyhow::bail!("combined.decision_threshold must be positive");
        }
        Ok(())
    }
}

/// The active strategy, dispatched by tagged union
pub enum StrategyKind {
    Scalper(ShitcoinScalper),
    Rsi(RsiStrategy),
    Breakout(BreakoutStrategy),
    Bollinger(BollingerReversion),
    Momentum(MomentumStrategy),
    Combined(TechnicalCombined),
    Timing(TimingStrategy),
}

impl StrategyKind {
    /// Build the configured variant
    pub fn from_settings(settings: &StrategySettings) -> Self {
        match settings.kind {
            StrategyType::ShitcoinScalper => {
                StrategyKind::Scalper(ShitcoinScalper::new(settings.scalper.clone()))
            }
            StrategyType::Rsi => StrategyKind::Rsi(RsiStrategy::new(settings.rsi.clone())),
            StrategyType::Breakout => {
                StrategyKind::Breakout(BreakoutStrategy::new(settings.breakout.clone()))
            }
            StrategyType::BollingerMeanReversion => {
                StrategyKind::Bollinger(BollingerReversion::new(settings.bollinger.clone()))
            }
            StrategyType::Momentum => {
                StrategyKind::Momentum(MomentumStrategy::new(settings.momentum.clone()))
            }
            StrategyType::TechnicalCombined => {
                StrategyKind::Combined(TechnicalCombined::new(settings.combined.clone()))
            }
            StrategyType::Immediate => StrategyKind::Timing(TimingStrategy::new(
                TimingVariant::Immediate,
                settings.timing.clone(),
            )),
            StrategyType::DelayedEntry => StrategyKind::Timing(TimingStrategy::new(
                TimingVariant::DelayedEntry,
                settings.timing.clone(),
            )),
            StrategyType::BatchAccumulate => StrategyKind::Timing(TimingStrategy::new(
                TimingVariant::BatchAccumulate,
                settings.timing.clone(),
            )),
            StrategyType::PumpFunPriority => StrategyKind::Timing(TimingStrategy::new(
                TimingVariant::PumpFunPriority,
                settings.timing.clone(),
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::Scalper(s) => s.name(),
            StrategyKind::Rsi(s) => s.name(),
            StrategyKind::Breakout(s) => s.name(),
            StrategyKind::Bollinger(s) => s.name(),
            StrategyKind::Momentum(s) => s.name(),
            StrategyKind::Combined(s) => s.name(),
            StrategyKind::Timing(s) => s.name(),
        }
    }

    pub async fn on_discovered(&mut self, event: &TokenEvent, rt: &dyn StrategyRuntime) {
        match self {
            StrategyKind::Scalper(s) => s.on_discovered(event, rt).await,
            StrategyKind::Rsi(s) => s.on_discovered(event, rt).await,
            StrategyKind::Breakout(s) => s.on_discovered(event, rt).await,
            StrategyKind::Bollinger(s) => s.on_discovered(event, rt).await,
            StrategyKind::Momentum(s) => s.on_discovered(event, rt).await,
            StrategyKind::Combined(s) => s.on_discovered(event, rt).await,
            StrategyKind::Timing(s) => s.on_discovered(event, rt).await,
        }
    }

    pub async fn on_tick(&mut self, rt: &dyn StrategyRuntime) {
        match self {
            StrategyKind::Scalper(s) => s.on_tick(rt).await,
            StrategyKind::Rsi(s) => s.on_tick(rt).await,
            StrategyKind::Breakout(s) => s.on_tick(rt).await,
            StrategyKind::Bollinger(s) => s.on_tick(rt).await,
            StrategyKind::Momentum(s) => s.on_tick(rt).await,
            StrategyKind::Combined(s) => s.on_tick(rt).await,
            StrategyKind::Timing(s) => s.on_tick(rt).await,
        }
    }
}

/// Per-tick signal deduplication
///
/// Within a single tick, at most one BUY and one SELL may be emitted per
/// mint; later signals for the same mint in the same tick are suppressed.
#[derive(Debug, Default)]
pub struct SignalGate {
    bought: HashSet<String>,
    sold: HashSet<String>,
}

impl SignalGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset at the start of each tick
    pub fn begin_tick(&mut self) {
        self.bought.clear();
        self.sold.clear();
    }

    /// Admit or suppress a signal for this tick
    pub fn admit(&mut self, signal: &StrategySignal) -> bool {
        match signal.action {
            SignalAction::Buy => self.bought.insert(signal.symbol.clone()),
            SignalAction::Sell => self.sold.insert(signal.symbol.clone()),
            SignalAction::Hold => true,
        }
    }
}
