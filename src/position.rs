//! Position management
//!
//! Tracks open positions with bounded price history, peak/trough
//! watermarks, a rolling volatility estimate, and session P&L statistics.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::PositionConfig;
use crate::indicators::log_return_volatility;

/// A single open position in a token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Token mint address
    pub mint: String,
    /// Entry price in USD
    pub entry_price: f64,
    /// Entry timestamp
    pub entry_time: chrono::DateTime<chrono::Utc>,
    /// USD committed at entry
    pub amount_usd: f64,
    /// Latest observed price
    pub current_price: f64,
    /// Highest price observed since entry
    pub peak: f64,
    /// Lowest price observed since entry
    pub trough: f64,
    /// Bounded recent price samples, oldest first
    pub price_history: VecDeque<f64>,
    /// Trailing stop level once armed
    pub trailing_stop_price: f64,
    pub trailing_armed: bool,
    pub breakeven_armed: bool,
    /// Population stddev of log-returns over the trailing lookback
    pub volatility: f64,
}

impl Position {
    fn open(mint: String, entry_price: f64, amount_usd: f64, history_cap: usize) -> Self {
        let mut price_history = VecDeque::with_capacity(history_cap);
        price_history.push_back(entry_price);
        Self {
            mint,
            entry_price,
            entry_time: chrono::Utc::now(),
            amount_usd,
            current_price: entry_price,
            peak: entry_price,
            trough: entry_price,
            price_history,
            trailing_stop_price: 0.0,
            trailing_armed: false,
            breakeven_armed: false,
            volatility: 0.0,
        }
    }

    /// Token quantity; fixed by entry price and notional
    pub fn quantity(&self) -> f64 {
        self.amount_usd / self.entry_price
    }

    /// Unrealized P&L as a fraction of entry (0.05 = +5%)
    pub fn unrealized_pnl_pct(&self) -> f64 {
        (self.current_price - self.entry_price) / self.entry_price
    }

    /// Unrealized P&L in USD
    pub fn unrealized_pnl_usd(&self) -> f64 {
        self.quantity() * (self.current_price - self.entry_price)
    }

    /// Drawdown from the peak as a fraction (0.1 = 10% below peak)
    pub fn drawdown_from_peak(&self) -> f64 {
        if self.peak <= 0.0 {
            return 0.0;
        }
        (self.peak - self.current_price) / self.peak
    }

    /// Milliseconds held so far
    pub fn hold_time_ms(&self) -> u64 {
        chrono::Utc::now()
            .signed_duration_since(self.entry_time)
            .num_milliseconds()
            .max(0) as u64
    }

    pub fn is_profitable(&self) -> bool {
        self.unrealized_pnl_usd() > 0.0
    }
}

/// Session trading statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub total_profit_usd: f64,
    pub total_loss_usd: f64,
    pub net_pnl_usd: f64,
}

impl SessionStats {
    pub fn record_trade(&mut self, pnl_usd: f64) {
        self.total_trades += 1;
        if pnl_usd >= 0.0 {
            self.winning_trades += 1;
            self.total_profit_usd += pnl_usd;
        } else {
            self.losing_trades += 1;
            self.total_loss_usd += pnl_usd.abs();
        }
        self.net_pnl_usd = self.total_profit_usd - self.total_loss_usd;
    }

    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }
        (self.winning_trades as f64 / self.total_trades as f64) * 100.0
    }
}

/// Position manager
pub struct PositionManager {
    positions: Arc<RwLock<HashMap<String, Position>>>,
    stats: Arc<RwLock<SessionStats>>,
    config: PositionConfig,
}

impl PositionManager {
    pub fn new(config: PositionConfig) -> Self {
        Self {
            positions: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(RwLock::new(SessionStats::default())),
            config,
        }
    }

    fn history_cap(&self) -> usize {
        self.config.volatility_lookback_periods * 2
    }

    /// Open a position. At most one position per mint; a second add for
    /// the same mint returns None and leaves the original untouched.
    pub async fn add(&self, mint: &str, entry_price: f64, amount_usd: f64) -> Option<Position> {
        if entry_price <= 0.0 {
            return None;
        }
        let mut positions = self.positions.write().await;
        if positions.contains_key(mint) {
            return None;
        }
        let position = Position::open(mint.to_string(), entry_price, amount_usd, self.history_cap());
        positions.insert(mint.to_string(), position.clone());
        info!("Opened position in {} at {}", mint, entry_price);
        Some(position)
    }

    /// Re-insert a previously persisted position (restart path)
    pub async fn restore(&self, position: Position) {
        let mut positions = self.positions.write().await;
        positions.insert(position.mint.clone(), position);
    }

    /// Push a new price into a position, updating watermarks and volatility
    pub async fn update(&self, mint: &str, current_price: f64) -> Option<Position> {
        let cap = self.history_cap();
        let lookback = self.config.volatility_lookback_periods;
        let mut positions = self.positions.write().await;
        let position = positions.get_mut(mint)?;

        position.current_price = current_price;
        if current_price > position.peak {
            position.peak = current_price;
        }
        if current_price < position.trough {
            position.trough = current_price;
        }

        position.price_history.push_back(current_price);
        while position.price_history.len() > cap {
            position.price_history.pop_front();
        }

        if position.price_history.len() >= 2 {
            let prices: Vec<f64> = position.price_history.iter().copied().collect();
            if let Some(vol) = log_return_volatility(&prices, lookback) {
                position.volatility = vol;
            }
        }

        Some(position.clone())
    }

    /// Arm or raise the trailing stop on a position
    pub async fn set_trailing_stop(&self, mint: &str, stop_price: f64) {
        let mut positions = self.positions.write().await;
        if let Some(position) = positions.get_mut(mint) {
            // Stops only ever ratchet upward for long positions
            if !position.trailing_armed || stop_price > position.trailing_stop_price {
                position.trailing_stop_price = stop_price;
            }
            position.trailing_armed = true;
        }
    }

    /// Mark the breakeven floor as armed
    pub async fn arm_breakeven(&self, mint: &str) {
        let mut positions = self.positions.write().await;
        if let Some(position) = positions.get_mut(mint) {
            position.breakeven_armed = true;
        }
    }

    /// Close out a position, recording realized P&L at the exit price
    pub async fn remove(&self, mint: &str) -> Option<Position> {
        let mut positions = self.positions.write().await;
        let position = positions.remove(mint)?;
        drop(positions);

        let pnl = position.unrealized_pnl_usd();
        let mut stats = self.stats.write().await;
        stats.record_trade(pnl);
        info!("Closed position in {} with P&L {:.4} USD", mint, pnl);

        Some(position)
    }

    pub async fn get(&self, mint: &str) -> Option<Position> {
        self.positions.read().await.get(mint).cloned()
    }

    pub async fn all(&self) -> Vec<Position> {
        self.positions.read().await.values().cloned().collect()
    }

    pub async fn count(&self) -> usize {
        self.positions.read().await.len()
    }

    pub async fn contains(&self, mint: &str) -> bool {
        self.positions.read().await.contains_key(mint)
    }

    /// Evict positions older than the configured age (orphaned-state safety net)
    pub async fn cleanup(&self) -> Vec<Position> {
        let cutoff = chrono::Utc::now()
            - chrono::Duration::seconds(self.config.max_position_age_secs as i64);
        let mut positions = self.positions.write().await;
        let stale: Vec<String> = positions
            .iter()
            .filter(|(_, p)| p.entry_time < cutoff)
            .map(|(mint, _)| mint.clone())
            .collect();

        let mut evicted = Vec::with_capacity(stale.len());
        for mint in stale {
            if let Some(position) = positions.remove(&mint) {
                debug!("Evicted stale position {}", mint);
                evicted.push(position);
            }
        }
        evicted
    }

    pub async fn session_stats(&self) -> SessionStats {
        self.stats.read().await.clone()
    }
}
