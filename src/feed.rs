//! Market data feeds
//!
//! The engine consumes two abstract streams: token discovery events and
//! per-mint price ticks. Concrete implementations bind to external APIs;
//! the engine only sees bounded channels and the `PriceFeed` trait used
//! for spot reads during restart revalidation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::Result;
use crate::token::TokenSource;

/// A single price observation for a mint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTick {
    pub mint: String,
    pub price_usd: f64,
    pub volume: f64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// A token discovery event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEvent {
    pub mint: String,
    pub source: TokenSource,
    /// Creator's initial buy in SOL, when the source reports it
    pub initial_buy: Option<f64>,
    /// Market cap in SOL at discovery, when the source reports it
    pub market_cap_sol: Option<f64>,
}

/// Abstract spot/history price source
///
/// Used for restart revalidation and for strategies that need an
/// out-of-band price read between ticks.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Current spot price in USD for a mint
    async fn spot(&self, mint: &str) -> Result<f64>;

    /// Recent closing prices for a mint, oldest first
    async fn history(&self, mint: &str) -> Result<Vec<f64>>;
}

/// Sending half handed to feed implementations
#[derive(Clone)]
pub struct FeedSender {
    discovery_tx: mpsc::Sender<TokenEvent>,
    price_tx: mpsc::Sender<PriceTick>,
}

impl FeedSender {
    /// Deliver a discovery event; blocks when the engine is backlogged
    pub async fn send_discovery(&self, event: TokenEvent) -> Result<()> {
        self.discovery_tx
            .send(event)
            .await
            .map_err(|_| crate::Error::ChannelClosed("discovery".into()))
    }

    /// Deliver a price tick. Under overload the newest tick for a mint
    /// wins; see [`PriceIntake`].
    pub async fn send_price(&self, tick: PriceTick) -> Result<()> {
        self.price_tx
            .send(tick)
            .await
            .map_err(|_| crate::Error::ChannelClosed("price".into()))
    }
}

/// Receiving half owned by the engine
pub struct FeedReceiver {
    pub discovery_rx: mpsc::Receiver<TokenEvent>,
    pub price_rx: mpsc::Receiver<PriceTick>,
}

/// Create a bounded feed channel pair
pub fn feed_channel(capacity: usize) -> (FeedSender, FeedReceiver) {
    let (discovery_tx, discovery_rx) = mpsc::channel(capacity);
    let (price_tx, price_rx) = mpsc::channel(capacity);
    (
        FeedSender {
            discovery_tx,
            price_tx,
        },
        FeedReceiver {
            discovery_rx,
            price_rx,
        },
    )
}

/// Per-mint last-write-wins coalescing of price ticks
///
/// When the monitor loop falls behind the feed, intermediate ticks for a
/// mint are dropped rather than queued; only the newest survives a drain.
#[derive(Default)]
pub struct PriceIntake {
    latest: HashMap<String, PriceTick>,
}

impl PriceIntake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb a tick, replacing any pending tick for the same mint
    pub fn absorb(&mut self, tick: PriceTick) {
        if let Some(prev) = self.latest.insert(tick.mint.clone(), tick) {
            debug!("Dropped stale tick for {}", prev.mint);
        }
    }

    /// Take all pending ticks, leaving the intake empty
    pub fn drain(&mut self) -> Vec<PriceTick> {
        self.latest.drain().map(|(_, t)| t).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}
