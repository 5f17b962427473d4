//! Shared mock runtime for strategy tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use super::{StrategyRuntime, TokenInfo};
use crate::token::{TokenSource, TokenState, TokenStatus};

/// Scripted runtime that records every buy/sell a strategy requests
pub struct MockRuntime {
    pub tokens: Mutex<Vec<TokenInfo>>,
    /// Price history per mint, oldest first; the last entry is spot
    pub prices: Mutex<HashMap<String, Vec<f64>>>,
    pub buys: Mutex<Vec<String>>,
    pub sells: Mutex<Vec<String>>,
    pub now: AtomicU64,
    pub refuse_buys: AtomicBool,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(vec![]),
            prices: Mutex::new(HashMap::new()),
            buys: Mutex::new(vec![]),
            sells: Mutex::new(vec![]),
            now: AtomicU64::new(1_000_000),
            refuse_buys: AtomicBool::new(false),
        }
    }

    pub fn add_held(&self, mint: &str, entry_price: f64, entry_time_ms: u64) {
        self.tokens.lock().unwrap().push(TokenInfo {
            mint: mint.to_string(),
            state: TokenState::Swapped,
            entry_price,
            entry_time_ms,
            amount_usd: 10.0,
        });
    }

    pub fn set_history(&self, mint: &str, history: Vec<f64>) {
        self.prices.lock().unwrap().insert(mint.to_string(), history);
    }

    pub fn push_price(&self, mint: &str, price: f64) {
        self.prices
            .lock()
            .unwrap()
            .entry(mint.to_string())
            .or_default()
            .push(price);
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn buy_count(&self) -> usize {
        self.buys.lock().unwrap().len()
    }

    pub fn sell_count(&self) -> usize {
        self.sells.lock().unwrap().len()
    }
}

#[async_trait]
impl StrategyRuntime for MockRuntime {
    async fn is_new(&self, mint: &str) -> bool {
        !self
            .tokens
            .lock()
            .unwrap()
            .iter()
            .any(|t| t.mint == mint && t.state != TokenState::New)
    }

    async fn status(&self, mint: &str) -> Option<TokenStatus> {
        self.tokens.lock().unwrap().iter().find(|t| t.mint == mint).map(|t| {
            let mut status = TokenStatus::discovered(&t.mint, TokenSource::PumpFun);
            status.state = t.state;
            status.entry_price = t.entry_price;
            status.amount_usd = t.amount_usd;
            status.entry_time = chrono::DateTime::from_timestamp_millis(t.entry_time_ms as i64);
            status
        })
    }

    async fn all_tokens(&self) -> Vec<TokenInfo> {
        self.tokens.lock().unwrap().clone()
    }

    async fn buy(&self, mint: &str) -> bool {
        if self.refuse_buys.load(Ordering::SeqCst) {
            return false;
        }
        self.buys.lock().unwrap().push(mint.to_string());
        true
    }

    async fn sell(&self, mint: &str) -> bool {
        self.sells.lock().unwrap().push(mint.to_string());
        true
    }

    async fn get_token_usd_price(&self, mint: &str) -> Option<f64> {
        self.prices
            .lock()
            .unwrap()
            .get(mint)
            .and_then(|h| h.last().copied())
    }

    async fn get_price_history(&self, mint: &str) -> Vec<f64> {
        self.prices.lock().unwrap().get(mint).cloned().unwrap_or_default()
    }

    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
