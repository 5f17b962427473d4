//! Order types and idempotent submission tracking
//!
//! Every order carries a client-generated id that acts as an idempotency
//! key: submitting the same id twice performs one execution and hands the
//! cached result to every caller, including callers that race the first
//! submission.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

use crate::error::Result;

/// Order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

/// Order priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPriority {
    Normal,
    High,
    Emergency,
}

/// Lifecycle status of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Submitted,
    Filled,
    PartiallyFilled,
    Cancelled,
    Rejected,
    Timeout,
}

impl OrderStatus {
    pub fn is_final(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::PartiallyFilled
                | OrderStatus::Cancelled
                | OrderStatus::Rejected
                | OrderStatus::Timeout
        )
    }
}

/// A single order request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Client-generated idempotency key
    pub id: String,
    pub mint: String,
    pub side: Side,
    /// UI amount (tokens for sells, quote currency for buys)
    pub amount: f64,
    pub max_slippage_bps: u32,
    pub timeout_ms: u64,
    pub priority: OrderPriority,
}

impl OrderRequest {
    pub fn new(mint: impl Into<String>, side: Side, amount: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            mint: mint.into(),
            side,
            amount,
            max_slippage_bps: 2500,
            timeout_ms: 30_000,
            priority: OrderPriority::Normal,
        }
    }

    pub fn with_priority(mut self, priority: OrderPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// Result of an order execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub status: OrderStatus,
    pub executed_amount: f64,
    pub executed_price: f64,
    pub fees: f64,
    pub slippage: f64,
    pub latency_ms: u64,
}

impl OrderResult {
    pub fn rejected() -> Self {
        Self {
            status: OrderStatus::Rejected,
            executed_amount: 0.0,
            executed_price: 0.0,
            fees: 0.0,
            slippage: 0.0,
            latency_ms: 0,
        }
    }

    pub fn timeout(latency_ms: u64) -> Self {
        Self {
            status: OrderStatus::Timeout,
            executed_amount: 0.0,
            executed_price: 0.0,
            fees: 0.0,
            slippage: 0.0,
            latency_ms,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            status: OrderStatus::Cancelled,
            executed_amount: 0.0,
            executed_price: 0.0,
            fees: 0.0,
            slippage: 0.0,
            latency_ms: 0,
        }
    }

    pub fn is_fill(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Filled | OrderStatus::PartiallyFilled
        )
    }
}

/// Idempotent order submission tracker
///
/// Keyed by `OrderRequest::id`. The first submission for an id runs the
/// provided execution future; any later (or concurrent) submission with
/// the same id waits for and returns that same result.
#[derive(Default)]
pub struct OrderTracker {
    slots: Mutex<HashMap<String, Arc<OnceCell<OrderResult>>>>,
}

impl OrderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit an order through the tracker
    pub async fn submit<F, Fut>(&self, request: &OrderRequest, execute: F) -> Result<OrderResult>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<OrderResult>>,
    {
        let cell = {
            let mut slots = self.slots.lock().await;
            slots
                .entry(request.id.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        if let Some(existing) = cell.get() {
            debug!("Duplicate order {} returned cached result", request.id);
            return Ok(existing.clone());
        }

        let result = cell
            .get_or_try_init(|| async {
                debug!("Executing order {} ({:?} {})", request.id, request.side, request.mint);
                execute().await
            })
            .await?;

        Ok(result.clone())
    }

    /// Peek at a completed order's result
    pub async fn result_of(&self, id: &str) -> Option<OrderResult> {
        let slots = self.slots.lock().await;
        slots.get(id).and_then(|cell| cell.get().cloned())
    }

    /// Number of tracked order ids
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }

    /// Drop completed orders, keeping in-flight slots alive
    pub async fn prune_completed(&self) {
        let mut slots = self.slots.lock().await;
        slots.retain(|_, cell| cell.get().is_none());
    }

    /// Mark every order that has not completed as Cancelled. Duplicate
    /// submissions of those ids now get the cancelled result instead of
    /// executing.
    pub async fn cancel_pending(&self) {
        let slots = self.slots.lock().await;
        for cell in slots.values() {
            if cell.get().is_none() {
                let _ = cell.set(OrderResult::cancelled());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn filled(price: f64) -> OrderResult {
        OrderResult {
            status: OrderStatus::Filled,
            executed_amount: 1.0,
            executed_price: price,
            fees: 0.0,
            slippage: 0.0,
            latency_ms: 5,
        }
    }

    #[tokio::test]
    async fn test_idempotent_submission() {
        let tracker = OrderTracker::new();
        let request = OrderRequest::new("mint", Side::Buy, 1.0);
        let executions = AtomicU32::new(0);

        let first = tracker
            .submit(&request, || async {
                executions.fetch_add(1, Ordering::SeqCst);
                Ok(filled(1.0))
            })
            .await
            .unwrap();

        let second = tracker
            .submit(&request, || async {
                executions.fetch_add(1, Ordering::SeqCst);
                Ok(filled(2.0))
            })
            .await
            .unwrap();

        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        assert_eq!(second.executed_price, 1.0);
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_share_one_execution() {
        let tracker = Arc::new(OrderTracker::new());
        let request = OrderRequest::new("mint", Side::Buy, 1.0);
        let executions = Arc::new(AtomicU32::new(0));

        let mut handles = vec![];
        for _ in 0..8 {
            let tracker = tracker.clone();
            let request = request.clone();
            let executions = executions.clone();
            handles.push(tokio::spawn(async move {
                tracker
                    .submit(&request, || async move {
                        executions.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok(filled(3.0))
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut results = vec![];
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn test_distinct_ids_execute_separately() {
        let tracker = OrderTracker::new();
        let a = OrderRequest::new("mint", Side::Buy, 1.0);
        let b = OrderRequest::new("mint", Side::Buy, 1.0);
        assert_ne!(a.id, b.id);

        tracker.submit(&a, || async { Ok(filled(1.0)) }).await.unwrap();
        tracker.submit(&b, || async { Ok(filled(2.0)) }).await.unwrap();

        assert_eq!(tracker.len().await, 2);
        assert_eq!(tracker.result_of(&b.id).await.unwrap().executed_price, 2.0);
    }

    #[tokio::test]
    async fn test_prune_completed() {
        let tracker = OrderTracker::new();
        let request = OrderRequest::new("mint", Side::Sell, 1.0);
        tracker
            .submit(&request, || async { Ok(filled(1.0)) })
            .await
            .unwrap();

        tracker.prune_completed().await;
        assert!(tracker.is_empty().await);
    }

    #[tokio::test]
    async fn test_cancel_pending_marks_unfinished() {
        let tracker = OrderTracker::new();
        let done = OrderRequest::new("mint", Side::Buy, 1.0);
        tracker
            .submit(&done, || async { Ok(filled(1.0)) })
            .await
            .unwrap();

        // Reserve a slot without completing it
        let pending_id = "pending-order".to_string();
        {
            let mut slots = tracker.slots.lock().await;
            slots.insert(pending_id.clone(), Arc::new(OnceCell::new()));
        }

        tracker.cancel_pending().await;

        assert_eq!(
            tracker.result_of(&pending_id).await.unwrap().status,
            OrderStatus::Cancelled
        );
        // Completed orders keep their result
        assert_eq!(
            tracker.result_of(&done.id).await.unwrap().status,
            OrderStatus::Filled
        );
    }

    #[test]
    fn test_status_finality() {
        assert!(OrderStatus::Filled.is_final());
        assert!(OrderStatus::Timeout.is_final());
        assert!(!OrderStatus::Pending.is_final());
        assert!(!OrderStatus::Submitted.is_final());
    }
}
