//! Token lifecycle tracking
//!
//! Each discovered token moves through a strict state machine; transitions
//! outside the diagram are rejected so concurrent buy/sell paths cannot
//! corrupt lifecycle state.

use serde::{Deserialize, Serialize};

/// Where a token was discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    PumpFun,
    Boosted,
    Profile,
    Pool,
    Manual,
}

impl Default for TokenSource {
    fn default() -> Self {
        TokenSource::Manual
    }
}

/// Lifecycle state of a tracked token
///
/// Valid paths:
/// ```text
/// New          --buy()-->   TradePending
/// TradePending --fill-->    Swapped
/// TradePending --fail-->    SellFailed   (retryable)
/// Swapped      --sell()-->  Selling
/// Selling      --fill-->    Sold
/// Selling      --fail-->    Swapped      (retryable)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    New,
    TradePending,
    Swapped,
    Selling,
    Sold,
    SellFailed,
}

impl TokenState {
    /// Whether `self -> to` is an edge of the lifecycle diagram
    pub fn can_transition(self, to: TokenState) -> bool {
        use TokenState::*;
        matches!(
            (self, to),
            (New, TradePending)
                | (TradePending, Swapped)
                | (TradePending, SellFailed)
                | (Swapped, Selling)
                | (Selling, Sold)
                | (Selling, Swapped)
                | (SellFailed, TradePending)
        )
    }

    /// True once a swap has landed and a position exists
    pub fn is_held(self) -> bool {
        matches!(self, TokenState::Swapped | TokenState::Selling)
    }

    /// True when no further transitions are expected
    pub fn is_terminal(self) -> bool {
        matches!(self, TokenState::Sold)
    }
}

/// Tracked status of a single token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenStatus {
    /// Token mint address
    pub mint: String,
    /// Current lifecycle state
    pub state: TokenState,
    /// Discovery timestamp
    pub discovered_at: chrono::DateTime<chrono::Utc>,
    /// Discovery source
    pub source: TokenSource,
    /// Entry price in USD, set when the swap fills
    pub entry_price: f64,
    /// Entry timestamp, set when the swap fills
    pub entry_time: Option<chrono::DateTime<chrono::Utc>>,
    /// USD notional committed to the position
    pub amount_usd: f64,
}

impl TokenStatus {
    /// Create a freshly discovered token in `New`
    pub fn discovered(mint: impl Into<String>, source: TokenSource) -> Self {
        Self {
            mint: mint.into(),
            state: TokenState::New,
            discovered_at: chrono::Utc::now(),
            source,
            entry_price: 0.0,
            entry_time: None,
            amount_usd: 0.0,
        }
    }

    /// Attempt a state transition, enforcing the lifecycle diagram
    pub fn transition(&mut self, to: TokenState) -> crate::Result<()> {
        if !self.state.can_transition(to) {
            return Err(crate::Error::InvalidTransition {
                mint: self.mint.clone(),
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// Record a filled entry. Invariant: once Swapped, entry_price > 0.
    pub fn record_fill(&mut self, entry_price: f64, amount_usd: f64) -> crate::Result<()> {
        if entry_price <= 0.0 {
            return Err(crate::Error::Internal(format!(
                "fill for {} with non-positive price {}",
                self.mint, entry_price
            )));
        }
        self.transition(TokenState::Swapped)?;
        self.entry_price = entry_price;
        self.entry_time = Some(chrono::Utc::now());
        self.amount_usd = amount_usd;
        Ok(())
    }

    /// Seconds since discovery
    pub fn age_secs(&self) -> i64 {
        chrono::Utc::now()
            .signed_duration_since(self.discovered_at)
            .num_seconds()
    }
}
