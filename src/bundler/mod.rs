//! Transaction bundler
//!
//! Queues signed transaction bytes, batches them under a tip transaction,
//! and broadcasts the bundle to every configured relay. Submission is
//! at-most-once per batch at this layer; duplicate suppression on-chain
//! rides on the transaction blockhash.

pub mod relay;

pub use relay::{bundle_id, HttpRelaySink, RelaySink};

use futures::future::join_all;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::tx::TxFactory;

lazy_static::lazy_static! {
    /// Default relay tip accounts, used when the config leaves the table empty
    pub static ref DEFAULT_TIP_ACCOUNTS: Vec<String> = vec![
        "96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5".to_string(),
        "HFqU5x63VTqvQss8hp11i4wVV8bD44PvwucfZ2bU7gRe".to_string(),
        "Cw8CFyM9FkoMi7K7Crf6HNQqf4uEMzpKw6QNghXLvLkY".to_string(),
        "ADaUMid9yfUytqMBgopwjb2DTLSokTSzL1zt6iGPaS49".to_string(),
        "DfXygSm4jCyNCybVYYK6DwvWqjKee8pbDmJGcLWNDXjh".to_string(),
        "ADuUkR4vqLUMWXxW9gh6D6L8pMSawimctcNZ5pGwDcEt".to_string(),
        "DttWaMuVvTiduZRnguLF7jNxTgiMBZ1hyAumKUiL2KRL".to_string(),
        "3AVi9Tg9Uo68tJfuvoKvqKNWKkC5wPdSSdeBnizKZ6jT".to_string(),
    ];
}

/// Bundler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundlerConfig {
    /// Swap transactions per bundle (tip excluded)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Periodic flush interval
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Also flush after every enqueue (latency-critical deployments)
    #[serde(default)]
    pub flush_on_enqueue: bool,
    /// Tip paid per bundle
    #[serde(default = "default_tip_lamports")]
    pub tip_lamports: u64,
    #[serde(default = "default_min_tip")]
    pub min_tip_lamports: u64,
    #[serde(default = "default_max_tip")]
    pub max_tip_lamports: u64,
    /// Relay endpoints receiving every bundle
    #[serde(default = "default_relay_urls")]
    pub relay_urls: Vec<String>,
    /// Tip destinations, one chosen at random per bundle
    #[serde(default = "default_tip_accounts")]
    pub tip_accounts: Vec<String>,
    /// Queue capacity; enqueue blocks when full
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// HTTP timeout for relay posts
    #[serde(default = "default_relay_timeout_ms")]
    pub relay_timeout_ms: u64,
}

fn default_batch_size() -> usize {
    4
}

fn default_flush_interval_ms() -> u64 {
    200
}

fn default_tip_lamports() -> u64 {
    10_000
}

fn default_min_tip() -> u64 {
    1_000
}

fn default_max_tip() -> u64 {
    1_000_000
}

fn default_relay_urls() -> Vec<String> {
    vec!["https://mainnet.block-engine.jito.wtf/api/v1/bundles".to_string()]
}

fn default_tip_accounts() -> Vec<String> {
    DEFAULT_TIP_ACCOUNTS.clone()
}

fn default_queue_capacity() -> usize {
    256
}

fn default_relay_timeout_ms() -> u64 {
    5_000
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            flush_on_enqueue: false,
            tip_lamports: default_tip_lamports(),
            min_tip_lamports: default_min_tip(),
            max_tip_lamports: default_max_tip(),
            relay_urls: default_relay_urls(),
            tip_accounts: default_tip_accounts(),
            queue_capacity: default_queue_capacity(),
            relay_timeout_ms: default_relay_timeout_ms(),
        }
    }
}

impl BundlerConfig {
    /// Clamp the configured tip into its bounds
    pub fn clamped_tip(&self) -> u64 {
        self.tip_lamports
            .clamp(self.min_tip_lamports, self.max_tip_lamports)
    }
}

/// Outcome of one flushed bundle
#[derive(Debug, Clone)]
pub struct FlushReport {
    pub bundle_id: String,
    /// Transactions in the bundle including the tip
    pub bundle_len: usize,
    /// Relays that accepted the submission
    pub accepted: usize,
    /// Relays that errored
    pub failed: usize,
}

/// Transaction bundler with a background flush loop
pub struct Bundler {
    config: BundlerConfig,
    factory: Arc<TxFactory>,
    sink: Arc<dyn RelaySink>,
    queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
    /// Signalled when the queue reaches batch size (or per enqueue)
    flush_notify: Arc<Notify>,
    /// Signalled when space frees up in a full queue
    space_notify: Arc<Notify>,
    stopped: Arc<AtomicBool>,
    cancel: CancellationToken,
    worker: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Bundler {
    pub fn new(config: BundlerConfig, factory: Arc<TxFactory>, sink: Arc<dyn RelaySink>) -> Self {
        Self {
            config,
            factory,
            sink,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            flush_notify: Arc::new(Notify::new()),
            space_notify: Arc::new(Notify::new()),
            stopped: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            worker: Mutex::new(None),
        }
    }

    /// Start the background flush loop
    pub async fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            this.run().await;
        });
        *self.worker.lock().await = Some(handle);
        info!(
            "Bundler started: batch_size={}, flush_interval={}ms, relays={}",
            self.config.batch_size,
            self.config.flush_interval_ms,
            self.config.relay_urls.len()
        );
    }

    /// Queue signed transaction bytes for the next bundle
    ///
    /// Blocks while the queue is full. Returns an error once the bundler
    /// has been stopped.
    pub async fn enqueue(&self, signed_tx: Vec<u8>) -> Result<()> {
        loop {
            if self.stopped.load(Ordering::Acquire) {
                return Err(Error::BundlerStopped);
            }

            {
                let mut queue = self.queue.lock().await;
                if queue.len() < self.config.queue_capacity {
                    queue.push_back(signed_tx);
                    let len = queue.len();
                    drop(queue);

                    if len >= self.config.batch_size || self.config.flush_on_enqueue {
                        self.flush_notify.notify_one();
                    }
                    return Ok(());
                }
            }

            // Queue full: wait for the flush loop to drain
            self.space_notify.notified().await;
        }
    }

    /// Current queue depth
    pub async fn pending(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Stop the bundler, forcing one final drain before returning
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        // Unblock any producer stuck in enqueue
        self.space_notify.notify_waiters();

        if let Some(handle) = self.worker.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("Bundler worker join failed: {}", e);
            }
        }
        info!("Bundler stopped");
    }

    async fn run(&self) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.flush_interval_ms));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.flush_all().await;
                }
                _ = self.flush_notify.notified() => {
                    self.flush_all().await;
                }
                _ = self.cancel.cancelled() => {
                    // Final drain on shutdown
                    self.flush_all().await;
                    break;
                }
            }
        }
    }

    /// Drain the queue in batches until empty
    async fn flush_all(&self) {
        loop {
            match self.flush_once().await {
                Ok(Some(report)) => {
                    debug!(
                        "Flushed bundle {} ({} txs, {}/{} relays ok)",
                        report.bundle_id,
                        report.bundle_len,
                        report.accepted,
                        report.accepted + report.failed
                    );
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Bundle flush failed: {}", e);
                    break;
                }
            }
        }
    }

    /// Flush at most one batch. Returns None when the queue is empty.
    ///
    /// The queue mutex is released before any network I/O; once a chunk is
    /// drained it is submitted exactly once and never requeued.
    pub async fn flush_once(&self) -> Result<Option<FlushReport>> {
        let chunk: Vec<Vec<u8>> = {
            let mut queue = self.queue.lock().await;
            if queue.is_empty() {
                return Ok(None);
            }
            let take = queue.len().min(self.config.batch_size);
            queue.drain(..take).collect()
        };
        self.space_notify.notify_waiters();

        let tip_account = self.pick_tip_account()?;
        let tip = self
            .factory
            .build_tip(self.config.clamped_tip(), &tip_account)
            .await?;

        let mut bundle = Vec::with_capacity(chunk.len() + 1);
        bundle.push(tip);
        bundle.extend(chunk.iter().map(|tx| bs58::encode(tx).into_string()));
        debug_assert!(bundle.len() <= self.config.batch_size + 1);

        let id = bundle_id(&bundle);

        // Broadcast to every relay concurrently; one failure never blocks
        // the others and nothing is retried here.
        let submissions = self
            .config
            .relay_urls
            .iter()
            .map(|url| self.sink.submit(url, &bundle));
        let results = join_all(submissions).await;

        let mut accepted = 0;
        let mut failed = 0;
        for (url, result) in self.config.relay_urls.iter().zip(results) {
            match result {
                Ok(_) => accepted += 1,
                Err(e) => {
                    failed += 1;
                    warn!("Relay {} rejected bundle {}: {}", url, id, e);
                }
            }
        }

        Ok(Some(FlushReport {
            bundle_id: id,
            bundle_len: bundle.len(),
            accepted,
            failed,
        }))
    }

    fn pick_tip_account(&self) -> Result<String> {
        if self.config.tip_accounts.is_empty() {
            return Err(Error::TipAccountMissing);
        }
        let idx = rand::thread_rng().gen_range(0..self.config.tip_accounts.len());
        Ok(self.config.tip_accounts[idx].clone())
    }
}
