//! Trading engine orchestrator
//!
//! Owns the token lifecycle and position maps, wires the feeds to the
//! active strategy and the risk engine, and funnels every trade through
//! the quote/sign/bundle execution path. Per-mint ordering is enforced by
//! a keyed lock registry; global limits cap positions and concurrent buys.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bundler::{Bundler, RelaySink};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::feed::{feed_channel, FeedReceiver, FeedSender, PriceFeed, PriceTick, TokenEvent};
use crate::orders::{OrderPriority, OrderRequest, OrderResult, OrderStatus, OrderTracker, Side};
use crate::persist::{self, EngineSnapshot};
use crate::position::PositionManager;
use crate::quote::{QuoteApi, QuoteRequest};
use crate::risk::RiskEngine;
use crate::rpc::RpcApi;
use crate::signer::SignerCapability;
use crate::strategy::{
    SignalAction, SignalGate, StrategyKind, StrategyRuntime, StrategySignal, TokenInfo,
};
use crate::token::{TokenSource, TokenState, TokenStatus};
use crate::tx::TxFactory;
use crate::validator::TokenValidator;

/// Injected collaborators; the engine owns no transport or key material
pub struct EngineDeps {
    pub signer: Arc<dyn SignerCapability>,
    pub rpc: Arc<dyn RpcApi>,
    pub quote: Arc<dyn QuoteApi>,
    pub price_feed: Arc<dyn PriceFeed>,
    pub relay_sink: Arc<dyn RelaySink>,
}

/// Per-mint serialization gate: cached buy outcome plus the health
/// counter of consecutive execution failures
#[derive(Debug, Default)]
struct MintGate {
    last_buy: Option<bool>,
    consecutive_failures: u32,
}

struct EngineInner {
    config: Config,
    tokens: RwLock<HashMap<String, TokenStatus>>,
    /// Mints in discovery order; drives strategy evaluation order
    insertion: RwLock<Vec<String>>,
    positions: PositionManager,
    risk: Mutex<RiskEngine>,
    strategy: Mutex<StrategyKind>,
    orders: OrderTracker,
    bundler: Arc<Bundler>,
    factory: Arc<TxFactory>,
    quote: Arc<dyn QuoteApi>,
    price_feed: Arc<dyn PriceFeed>,
    rpc: Arc<dyn RpcApi>,
    validator: TokenValidator,
    gates: DashMap<String, Arc<Mutex<MintGate>>>,
    buy_permits: Semaphore,
    block_buy: AtomicBool,
    running: AtomicBool,
    cancel: CancellationToken,
    /// Latest tick price per mint
    prices: RwLock<HashMap<String, f64>>,
    signal_gate: Mutex<SignalGate>,
    wallet: String,
    /// Fatal fault recorded by the supervisor on a worker panic
    fault: Mutex<Option<String>>,
}

/// The trading engine
pub struct TradingEngine {
    inner: Arc<EngineInner>,
    feed_rx: Mutex<Option<FeedReceiver>>,
    supervisor: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl TradingEngine {
    /// Build an engine; returns the sender half handed to feed implementations
    pub fn new(config: Config, deps: EngineDeps) -> Result<(Self, FeedSender)> {
        config.validate().map_err(|e| Error::Config(e.to_string()))?;

        let validator = TokenValidator::new(config.validator.clone())?;
        let factory = Arc::new(TxFactory::new(deps.signer.clone(), deps.rpc.clone()));
        let bundler = Arc::new(Bundler::new(
            config.bundler.clone(),
            factory.clone(),
            deps.relay_sink,
        ));

        let (feed_tx, feed_rx) = feed_channel(config.engine.channel_capacity);
        let wallet = deps.signer.pubkey().to_string();

        let inner = Arc::new(EngineInner {
            positions: PositionManager::new(config.position.clone()),
            risk: Mutex::new(RiskEngine::new(config.risk.clone())),
            strategy: Mutex::new(StrategyKind::from_settings(&config.strategy)),
            orders: OrderTracker::new(),
            bundler,
            factory,
            quote: deps.quote,
            price_feed: deps.price_feed,
            rpc: deps.rpc,
            validator,
            gates: DashMap::new(),
            buy_permits: Semaphore::new(config.engine.max_concurrent_buys),
            block_buy: AtomicBool::new(config.engine.block_buy),
            running: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            tokens: RwLock::new(HashMap::new()),
            insertion: RwLock::new(Vec::new()),
            prices: RwLock::new(HashMap::new()),
            signal_gate: Mutex::new(SignalGate::new()),
            wallet,
            fault: Mutex::new(None),
            config,
        });

        Ok((
            Self {
                inner,
                feed_rx: Mutex::new(Some(feed_rx)),
                supervisor: Mutex::new(None),
            },
            feed_tx,
        ))
    }

    /// Start the engine: restore state, start the bundler, spawn workers.
    /// Idempotent; returns once initialization completes.
    pub async fn start(&self) -> Result<()> {
        if self.inner.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.inner.restore_snapshot().await?;
        self.inner.bundler.start().await;

        let Some(feed_rx) = self.feed_rx.lock().await.take() else {
            return Err(Error::EngineFault("feed receiver already consumed".into()));
        };
        let FeedReceiver {
            mut discovery_rx,
            price_rx,
        } = feed_rx;

        let mut tasks = JoinSet::new();

        // Discovery intake
        {
            let inner = self.inner.clone();
            tasks.spawn(async move {
                loop {
                    tokio::select! {
                        event = discovery_rx.recv() => {
                            match event {
                                Some(event) => inner.on_token_event(event).await,
                                None => break,
                            }
                        }
                        _ = inner.cancel.cancelled() => break,
                    }
                }
            });
        }

        // Price intake with last-write-wins coalescing
        {
            let inner = self.inner.clone();
            let mut price_rx = price_rx;
            tasks.spawn(async move {
                let mut intake = crate::feed::PriceIntake::new();
                loop {
                    tokio::select! {
                        tick = price_rx.recv() => {
                            match tick {
                                Some(tick) => {
                                    intake.absorb(tick);
                                    // Drain whatever queued behind this tick
                                    while let Ok(more) = price_rx.try_recv() {
                                        intake.absorb(more);
                                    }
                                    for tick in intake.drain() {
                                        inner.on_price_update(tick).await;
                                    }
                                }
                                None => break,
                            }
                        }
                        _ = inner.cancel.cancelled() => break,
                    }
                }
            });
        }

        // Position monitor: cleanup sweep, degraded-mint retry, snapshot
        {
            let inner = self.inner.clone();
            tasks.spawn(async move {
                let mut interval =
                    tokio::time::interval(Duration::from_millis(inner.config.engine.monitor_interval_ms));
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            for stale in inner.positions.cleanup().await {
                                warn!("Evicted orphaned position {}", stale.mint);
                                inner.risk.lock().await.clear(&stale.mint);
                            }
                            inner.retry_degraded_sells().await;
                            if let Err(e) = inner.save_snapshot().await {
                                warn!("Snapshot failed: {}", e);
                            }
                        }
                        _ = inner.cancel.cancelled() => break,
                    }
                }
            });
        }

        // Periodic wallet-wide sell sweep
        if self.inner.config.engine.auto_sell_all {
            let inner = self.inner.clone();
            tasks.spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_millis(
                    inner.config.engine.sell_all_interval_ms,
                ));
                interval.tick().await; // skip the immediate first fire
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            if let Err(e) = inner.sell_all_once().await {
                                warn!("Sell-all sweep failed: {}", e);
                            }
                        }
                        _ = inner.cancel.cancelled() => break,
                    }
                }
            });
        }

        // Supervisor: a panicking worker is fatal for the whole engine.
        // The fault is recorded so the host can retrieve it after the halt.
        let inner = self.inner.clone();
        let supervisor = tokio::spawn(async move {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    if e.is_panic() {
                        error!("Engine worker panicked: {}", e);
                        inner.record_fault(format!("worker panicked: {}", e)).await;
                    }
                }
            }
        });
        *self.supervisor.lock().await = Some(supervisor);

        info!("Trading engine started ({})", self.inner.strategy.lock().await.name());
        Ok(())
    }

    /// Stop the engine: cancel workers, drain the bundler, persist state.
    /// Idempotent; returns once all tasks have joined. Runs the full
    /// teardown even after a fault already halted the workers.
    pub async fn stop(&self) {
        self.inner.running.store(false, Ordering::Release);
        self.inner.cancel.cancel();

        let Some(supervisor) = self.supervisor.lock().await.take() else {
            return;
        };
        if let Err(e) = supervisor.await {
            error!("Supervisor join failed: {}", e);
        }

        self.inner.bundler.stop().await;
        if let Err(e) = self.inner.save_snapshot().await {
            warn!("Final snapshot failed: {}", e);
        }
        info!("Trading engine stopped");
    }

    /// Emergency stop: block buys, cancel pending orders, liquidate
    /// everything, then halt.
    pub async fn emergency_stop(&self) {
        warn!("EMERGENCY STOP");
        self.inner.block_buy.store(true, Ordering::Release);
        self.inner.orders.cancel_pending().await;

        for position in self.inner.positions.all().await {
            if !self
                .inner
                .sell_with_priority(&position.mint, OrderPriority::Emergency)
                .await
            {
                warn!("Emergency sell failed for {}", position.mint);
            }
        }
        self.stop().await;
    }

    /// Route a discovery event (exposed for direct driving in tests)
    pub async fn on_token_event(&self, event: TokenEvent) {
        self.inner.on_token_event(event).await;
    }

    /// Route a price tick (exposed for direct driving in tests)
    pub async fn on_price_update(&self, tick: PriceTick) {
        self.inner.on_price_update(tick).await;
    }

    /// Buy a mint through the full execution path
    pub async fn buy(&self, mint: &str) -> bool {
        self.inner.buy(mint).await
    }

    /// Sell a mint through the full execution path
    pub async fn sell(&self, mint: &str) -> bool {
        self.inner
            .sell_with_priority(mint, OrderPriority::High)
            .await
    }

    /// Submit an order idempotently: the same request id never executes twice
    pub async fn submit_order(&self, request: OrderRequest) -> Result<OrderResult> {
        let inner = self.inner.clone();
        let req = request.clone();
        self.inner
            .orders
            .submit(&request, || async move { inner.execute_order(&req).await })
            .await
    }

    /// One pass of the wallet-wide sell sweep
    pub async fn sell_all_once(&self) -> Result<usize> {
        self.inner.sell_all_once().await
    }

    pub async fn token_status(&self, mint: &str) -> Option<TokenStatus> {
        self.inner.tokens.read().await.get(mint).cloned()
    }

    pub async fn position_count(&self) -> usize {
        self.inner.positions.count().await
    }

    pub async fn positions(&self) -> Vec<crate::position::Position> {
        self.inner.positions.all().await
    }

    pub async fn session_stats(&self) -> crate::position::SessionStats {
        self.inner.positions.session_stats().await
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Fatal fault recorded by the supervisor, if a worker panicked
    pub async fn last_fault(&self) -> Option<Error> {
        self.inner
            .fault
            .lock()
            .await
            .as_ref()
            .map(|message| Error::EngineFault(message.clone()))
    }

    /// Consecutive execution failures recorded against a mint
    pub async fn mint_failures(&self, mint: &str) -> u32 {
        let gate = self.inner.gates.get(mint).map(|g| g.clone());
        match gate {
            Some(gate) => gate.lock().await.consecutive_failures,
            None => 0,
        }
    }

    /// One pass of the degraded-mint exit retry (also run by the monitor)
    pub async fn retry_degraded_once(&self) -> usize {
        self.inner.retry_degraded_sells().await
    }

    /// Toggle the buy short-circuit at runtime
    pub fn set_block_buy(&self, blocked: bool) {
        self.inner.block_buy.store(blocked, Ordering::Release);
    }
}

impl EngineInner {
    async fn on_token_event(&self, event: TokenEvent) {
        // Deduplicate: one lifecycle per mint
        if self.tokens.read().await.contains_key(&event.mint) {
            debug!("Duplicate discovery for {}", event.mint);
            return;
        }

        let outcome = self
            .validator
            .validate(&event, event.initial_buy.or(event.market_cap_sol));
        if let crate::validator::ValidationOutcome::Rejected { reason } = outcome {
            info!("Validator rejected {}: {}", event.mint, reason);
            return;
        }

        {
            let mut tokens = self.tokens.write().await;
            tokens.insert(
                event.mint.clone(),
                TokenStatus::discovered(&event.mint, event.source),
            );
            self.insertion.write().await.push(event.mint.clone());
        }
        info!("Discovered {} from {:?}", event.mint, event.source);

        let runtime = EngineRuntime { inner: self };
        self.signal_gate.lock().await.begin_tick();
        self.strategy
            .lock()
            .await
            .on_discovered(&event, &runtime)
            .await;
    }

    async fn on_price_update(&self, tick: PriceTick) {
        self.prices
            .write()
            .await
            .insert(tick.mint.clone(), tick.price_usd);

        {
            let mut risk = self.risk.lock().await;
            risk.record_tick(&tick.mint, tick.price_usd, tick.volume, tick.timestamp);
        }

        // Position update + risk pass; a forced exit preempts the strategy
        let mut forced_exit = false;
        if let Some(position) = self.positions.update(&tick.mint, tick.price_usd).await {
            let evaluation = {
                let mut risk = self.risk.lock().await;
                risk.evaluate(&position, tick.timestamp)
            };

            if let Some(stop) = evaluation.stop_price {
                self.positions.set_trailing_stop(&tick.mint, stop).await;
            }
            if evaluation.arm_breakeven {
                self.positions.arm_breakeven(&tick.mint).await;
            }

            if let Some(verdict) = evaluation.exit {
                forced_exit = true;
                let priority = verdict.reason.priority();
                warn!("Forced exit for {}: {:?}", tick.mint, verdict.reason);
                self.sell_with_priority(&tick.mint, priority).await;
            }
        }

        if !forced_exit {
            let runtime = EngineRuntime { inner: self };
            self.signal_gate.lock().await.begin_tick();
            self.strategy.lock().await.on_tick(&runtime).await;
        }
    }

    async fn buy(&self, mint: &str) -> bool {
        if !self.running.load(Ordering::Acquire) {
            return false;
        }
        if self.block_buy.load(Ordering::Acquire) {
            debug!("Buy blocked for {} (block_buy)", mint);
            return false;
        }

        let gate = self
            .gates
            .entry(mint.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(MintGate::default())))
            .clone();
        let mut gate = gate.lock().await;

        // Health gate: a mint that keeps failing stops getting entries;
        // anything still held falls to the sweep retry.
        if gate.consecutive_failures >= self.config.engine.max_consecutive_failures {
            debug!(
                "Refusing buy of {}: health degraded ({} consecutive failures)",
                mint, gate.consecutive_failures
            );
            return false;
        }

        // Lifecycle check under the per-mint lock: a concurrent duplicate
        // observes TradePending/Swapped here and gets the cached outcome.
        {
            let tokens = self.tokens.read().await;
            match tokens.get(mint).map(|t| t.state) {
                None => drop(tokens), // manual buy of an untracked mint
                Some(TokenState::New) | Some(TokenState::SellFailed) => {}
                Some(_) => return gate.last_buy.unwrap_or(false),
            }
        }

        // Global limits
        if self.positions.count().await >= self.config.engine.max_positions {
            debug!("Max positions reached, refusing buy of {}", mint);
            return false;
        }

        // Chop gate over the mint's recent tick window
        {
            let now_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
            let chop = self.risk.lock().await.entry_state(mint, now_ms);
            if !chop.trading_permitted {
                debug!(
                    "Entry refused for {}: choppiness {:.1}",
                    mint, chop.choppiness
                );
                return false;
            }
        }

        let Ok(_permit) = self.buy_permits.acquire().await else {
            return false;
        };

        // Track manual buys of unseen mints
        {
            let mut tokens = self.tokens.write().await;
            if !tokens.contains_key(mint) {
                tokens.insert(
                    mint.to_string(),
                    TokenStatus::discovered(mint, TokenSource::Manual),
                );
                self.insertion.write().await.push(mint.to_string());
            }
        }

        if !self.transition(mint, TokenState::TradePending).await {
            return false;
        }

        let request = OrderRequest::new(mint, Side::Buy, self.config.engine.sol_amount_per_trade)
            .with_timeout_ms(self.config.engine.order_timeout_ms);
        let inner_req = request.clone();
        let result = self
            .orders
            .submit(&request, || async { self.execute_order(&inner_req).await })
            .await;

        match result {
            Ok(result) if result.is_fill() => {
                let notional = self.config.engine.sol_amount_per_trade;
                let price = result.executed_price;
                {
                    let mut tokens = self.tokens.write().await;
                    if let Some(status) = tokens.get_mut(mint) {
                        if let Err(e) = status.record_fill(price, notional) {
                            error!("Fill bookkeeping failed for {}: {}", mint, e);
                        }
                    }
                }
                self.positions.add(mint, price, notional).await;
                gate.last_buy = Some(true);
                gate.consecutive_failures = 0;
                info!("Bought {} at {:.8}", mint, price);
                true
            }
            Ok(result) => {
                warn!("Buy of {} ended {:?}", mint, result.status);
                self.transition(mint, TokenState::SellFailed).await;
                gate.last_buy = Some(false);
                gate.consecutive_failures += 1;
                false
            }
            Err(e) => {
                warn!("Buy of {} failed: {}", mint, e);
                self.transition(mint, TokenState::SellFailed).await;
                gate.last_buy = Some(false);
                gate.consecutive_failures += 1;
                false
            }
        }
    }

    async fn sell_with_priority(&self, mint: &str, priority: OrderPriority) -> bool {
        let gate = self
            .gates
            .entry(mint.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(MintGate::default())))
            .clone();
        let mut gate = gate.lock().await;

        {
            let tokens = self.tokens.read().await;
            match tokens.get(mint).map(|t| t.state) {
                Some(TokenState::Swapped) => {}
                other => {
                    debug!("Sell of {} refused in state {:?}", mint, other);
                    return false;
                }
            }
        }

        if !self.transition(mint, TokenState::Selling).await {
            return false;
        }

        let amount = self
            .positions
            .get(mint)
            .await
            .map(|p| p.quantity())
            .unwrap_or(0.0);

        let request = OrderRequest::new(mint, Side::Sell, amount)
            .with_priority(priority)
            .with_timeout_ms(self.config.engine.order_timeout_ms);
        let inner_req = request.clone();
        let result = self
            .orders
            .submit(&request, || async { self.execute_order(&inner_req).await })
            .await;

        match result {
            Ok(result) if result.is_fill() => {
                self.transition(mint, TokenState::Sold).await;
                self.positions.remove(mint).await;
                self.risk.lock().await.clear(mint);
                gate.consecutive_failures = 0;
                info!("Sold {} at {:.8}", mint, result.executed_price);
                true
            }
            Ok(result) => {
                warn!("Sell of {} ended {:?}, will retry", mint, result.status);
                self.transition(mint, TokenState::Swapped).await;
                gate.consecutive_failures += 1;
                false
            }
            Err(e) => {
                warn!("Sell of {} failed: {}, will retry", mint, e);
                self.transition(mint, TokenState::Swapped).await;
                gate.consecutive_failures += 1;
                false
            }
        }
    }

    /// Quote, re-sign, and enqueue one order; optimistic fill accounting
    async fn execute_order(&self, request: &OrderRequest) -> Result<OrderResult> {
        let started = std::time::Instant::now();

        let work = async {
            let (input_mint, output_mint) = match request.side {
                Side::Buy => (
                    self.config.engine.swap_mint.clone(),
                    request.mint.clone(),
                ),
                Side::Sell => (
                    request.mint.clone(),
                    self.config.engine.swap_mint.clone(),
                ),
            };

            let quote = self
                .quote
                .quote(&QuoteRequest {
                    input_mint,
                    output_mint,
                    amount_lamports: (request.amount * 1e9) as u64,
                    slippage_bps: request.max_slippage_bps.min(self.config.quote.slippage_bps),
                })
                .await?;

            let signed = self.factory.resign_swap(&quote.swap_transaction)?;

            if self.config.engine.use_relay_bundle {
                self.bundler.enqueue(signed).await?;
            } else {
                debug!("Relay bundling disabled; order {} not broadcast", request.id);
            }

            let price = match self.prices.read().await.get(&request.mint).copied() {
                Some(price) => price,
                None => self.price_feed.spot(&request.mint).await?,
            };

            Ok::<OrderResult, Error>(OrderResult {
                status: OrderStatus::Filled,
                executed_amount: request.amount,
                executed_price: price,
                fees: 0.0,
                slippage: quote.price_impact_pct,
                latency_ms: started.elapsed().as_millis() as u64,
            })
        };

        match tokio::time::timeout(Duration::from_millis(request.timeout_ms), work).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Order {} timed out after {}ms", request.id, request.timeout_ms);
                Ok(OrderResult::timeout(started.elapsed().as_millis() as u64))
            }
        }
    }

    /// Enumerate wallet tokens and queue sells in spaced batches
    async fn sell_all_once(&self) -> Result<usize> {
        let tokens = self.rpc.wallet_tokens(&self.wallet).await?;
        let mut queued = 0usize;

        for batch in tokens
            .iter()
            .filter(|t| t.mint != self.config.engine.swap_mint && t.raw_amount > 0)
            .collect::<Vec<_>>()
            .chunks(self.config.engine.spl_sell_batch)
        {
            for token in batch {
                let ui_amount = token.ui_amount();
                let request = OrderRequest::new(&token.mint, Side::Sell, ui_amount)
                    .with_timeout_ms(self.config.engine.order_timeout_ms);
                let inner_req = request.clone();
                match self
                    .orders
                    .submit(&request, || async { self.execute_order(&inner_req).await })
                    .await
                {
                    Ok(result) if result.is_fill() => {
                        queued += 1;
                        debug!("Sweep sold {:.4} of {}", ui_amount, token.mint);
                    }
                    Ok(result) => warn!("Sweep sell of {} ended {:?}", token.mint, result.status),
                    Err(e) => warn!("Sweep sell of {} failed: {}", token.mint, e),
                }
            }
            if queued < tokens.len() {
                tokio::time::sleep(Duration::from_millis(self.config.engine.sell_wait_ms)).await;
            }
        }

        info!("Sell sweep queued {} sells", queued);
        Ok(queued)
    }

    /// Record a fatal fault and halt the engine
    async fn record_fault(&self, message: String) {
        *self.fault.lock().await = Some(message);
        self.running.store(false, Ordering::Release);
        self.cancel.cancel();
    }

    /// Retry exits for open positions whose mint health has degraded.
    /// Strategy and risk signals stop reaching these mints once entries
    /// are refused, so the sweep owns getting them flat again.
    async fn retry_degraded_sells(&self) -> usize {
        let cap = self.config.engine.max_consecutive_failures;
        let mut retried = 0;

        for position in self.positions.all().await {
            let Some(gate) = self.gates.get(&position.mint).map(|g| g.clone()) else {
                continue;
            };
            let failures = gate.lock().await.consecutive_failures;
            if failures < cap {
                continue;
            }
            warn!(
                "Sweep retrying exit for degraded {} ({} consecutive failures)",
                position.mint, failures
            );
            if self
                .sell_with_priority(&position.mint, OrderPriority::High)
                .await
            {
                retried += 1;
            }
        }
        retried
    }

    /// Apply a lifecycle transition, logging invalid ones
    async fn transition(&self, mint: &str, to: TokenState) -> bool {
        let mut tokens = self.tokens.write().await;
        match tokens.get_mut(mint) {
            Some(status) => match status.transition(to) {
                Ok(()) => true,
                Err(e) => {
                    warn!("{}", e);
                    false
                }
            },
            None => false,
        }
    }

    async fn restore_snapshot(&self) -> Result<()> {
        let Some(path) = self.config.persistence.path.clone() else {
            return Ok(());
        };
        let snapshot = persist::load(&path).await?;
        if snapshot.is_empty() {
            return Ok(());
        }

        {
            let mut tokens = self.tokens.write().await;
            let mut insertion = self.insertion.write().await;
            for (mint, status) in snapshot.tokens {
                insertion.push(mint.clone());
                tokens.insert(mint, status);
            }
        }

        // Revalidate each reloaded position against a fresh price read
        for (mint, mut position) in snapshot.positions {
            match self.price_feed.spot(&mint).await {
                Ok(price) => {
                    position.current_price = price;
                    self.positions.restore(position).await;
                    self.prices.write().await.insert(mint, price);
                }
                Err(e) => {
                    warn!("Dropping stale position {} (no fresh price: {})", mint, e);
                    let mut tokens = self.tokens.write().await;
                    tokens.remove(&mint);
                }
            }
        }
        Ok(())
    }

    async fn save_snapshot(&self) -> Result<()> {
        let Some(path) = self.config.persistence.path.clone() else {
            return Ok(());
        };
        let snapshot = EngineSnapshot {
            tokens: self.tokens.read().await.clone(),
            positions: self
                .positions
                .all()
                .await
                .into_iter()
                .map(|p| (p.mint.clone(), p))
                .collect(),
        };
        persist::save(&path, &snapshot).await
    }
}

/// Capability surface handed to the active strategy
struct EngineRuntime<'a> {
    inner: &'a EngineInner,
}

#[async_trait::async_trait]
impl StrategyRuntime for EngineRuntime<'_> {
    async fn is_new(&self, mint: &str) -> bool {
        match self.inner.tokens.read().await.get(mint) {
            None => true,
            Some(status) => status.state == TokenState::New,
        }
    }

    async fn status(&self, mint: &str) -> Option<TokenStatus> {
        self.inner.tokens.read().await.get(mint).cloned()
    }

    async fn all_tokens(&self) -> Vec<TokenInfo> {
        let tokens = self.inner.tokens.read().await;
        let insertion = self.inner.insertion.read().await;
        insertion
            .iter()
            .filter_map(|mint| tokens.get(mint))
            .map(|status| TokenInfo {
                mint: status.mint.clone(),
                state: status.state,
                entry_price: status.entry_price,
                entry_time_ms: status
                    .entry_time
                    .map(|t| t.timestamp_millis().max(0) as u64)
                    .unwrap_or(0),
                amount_usd: status.amount_usd,
            })
            .collect()
    }

    async fn buy(&self, mint: &str) -> bool {
        let signal = StrategySignal::new(SignalAction::Buy, mint, 1.0);
        if !self.inner.signal_gate.lock().await.admit(&signal) {
            debug!("Buy signal for {} suppressed this tick", mint);
            return false;
        }
        self.inner.buy(mint).await
    }

    async fn sell(&self, mint: &str) -> bool {
        let signal = StrategySignal::new(SignalAction::Sell, mint, 1.0);
        if !self.inner.signal_gate.lock().await.admit(&signal) {
            debug!("Sell signal for {} suppressed this tick", mint);
            return false;
        }
        self.inner
            .sell_with_priority(mint, OrderPriority::Normal)
            .await
    }

    async fn get_token_usd_price(&self, mint: &str) -> Option<f64> {
        if let Some(price) = self.inner.prices.read().await.get(mint).copied() {
            return Some(price);
        }
        self.inner.price_feed.spot(mint).await.ok()
    }

    async fn get_price_history(&self, mint: &str) -> Vec<f64> {
        if let Some(position) = self.inner.positions.get(mint).await {
            return position.price_history.iter().copied().collect();
        }
        self.inner
            .price_feed
            .history(mint)
            .await
            .unwrap_or_default()
    }

    fn now_ms(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}
