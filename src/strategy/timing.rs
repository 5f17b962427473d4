//! Entry-timing strategy variants
//!
//! Four timing policies over the same buy path: immediate entry, delayed
//! entry, batch accumulation, and source-priority entry that fast-tracks
//! pump.fun discoveries and delays the rest.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

use super::{Strategy, StrategyRuntime};
use crate::feed::TokenEvent;
use crate::token::TokenSource;

/// Timing parameters shared by the variants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Entry delay for delayed variants
    #[serde(default = "default_entry_delay_ms")]
    pub entry_delay_ms: u64,
    /// Discoveries accumulated before a batch entry
    #[serde(default = "default_accumulate_batch")]
    pub accumulate_batch: usize,
}

fn default_entry_delay_ms() -> u64 {
    5_000
}

fn default_accumulate_batch() -> usize {
    3
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            entry_delay_ms: default_entry_delay_ms(),
            accumulate_batch: default_accumulate_batch(),
        }
    }
}

/// Which timing policy is active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingVariant {
    Immediate,
    DelayedEntry,
    BatchAccumulate,
    PumpFunPriority,
}

#[derive(Debug, Clone)]
struct PendingEntry {
    mint: String,
    due_ms: u64,
}

/// Timing strategy over the shared buy path
pub struct TimingStrategy {
    variant: TimingVariant,
    config: TimingConfig,
    pending: VecDeque<PendingEntry>,
}

impl TimingStrategy {
    pub fn new(variant: TimingVariant, config: TimingConfig) -> Self {
        Self {
            variant,
            config,
            pending: VecDeque::new(),
        }
    }

    fn schedule(&mut self, mint: &str, due_ms: u64) {
        if self.pending.iter().any(|p| p.mint == mint) {
            return;
        }
        self.pending.push_back(PendingEntry {
            mint: mint.to_string(),
            due_ms,
        });
    }

    async fn fire_due(&mut self, rt: &dyn StrategyRuntime, now_ms: u64) {
        while let Some(entry) = self.pending.front() {
            if entry.due_ms > now_ms {
                break;
            }
            let entry = self.pending.pop_front().unwrap();
            debug!("Timed entry firing for {}", entry.mint);
            rt.buy(&entry.mint).await;
        }
    }
}

#[async_trait]
impl Strategy for TimingStrategy {
    fn name(&self) -> &'static str {
        match self.variant {
            TimingVariant::Immediate => "immediate",
            TimingVariant::DelayedEntry => "delayed_entry",
            TimingVariant::BatchAccumulate => "batch_accumulate",
            TimingVariant::PumpFunPriority => "pumpfun_priority",
        }
    }

    async fn on_discovered(&mut self, event: &TokenEvent, rt: &dyn StrategyRuntime) {
        if !rt.is_new(&event.mint).await {
            return;
        }
        let now_ms = rt.now_ms();

        match self.variant {
            TimingVariant::Immediate => {
                rt.buy(&event.mint).await;
            }
            TimingVariant::DelayedEntry => {
                self.schedule(&event.mint, now_ms + self.config.entry_delay_ms);
            }
            TimingVariant::BatchAccumulate => {
                self.schedule(&event.mint, u64::MAX);
                if self.pending.len() >= self.config.accumulate_batch {
                    // Release the whole batch at once
                    let batch: Vec<PendingEntry> = self.pending.drain(..).collect();
                    for entry in batch {
                        debug!("Batch entry firing for {}", entry.mint);
                        rt.buy(&entry.mint).await;
                    }
                }
            }
            TimingVariant::PumpFunPriority => {
                if event.source == TokenSource::PumpFun {
                    rt.buy(&event.mint).await;
                } else {
                    self.schedule(&event.mint, now_ms + self.config.entry_delay_ms);
                }
            }
        }
    }

    async fn on_tick(&mut self, rt: &dyn StrategyRuntime) {
        if matches!(
            self.variant,
            TimingVariant::DelayedEntry | TimingVariant::PumpFunPriority
        ) {
            self.fire_due(rt, rt.now_ms()).await;
        }
    }
}
