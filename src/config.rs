//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

// Re-export component configs so callers build everything from one place
pub use crate::bundler::BundlerConfig;
pub use crate::risk::RiskConfig;
pub use crate::strategy::StrategySettings;
pub use crate::validator::ValidatorConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub quote: QuoteConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub strategy: StrategySettings,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub bundler: BundlerConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub position: PositionConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteConfig {
    #[serde(default = "default_quote_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u32,
}

/// Engine-wide limits and trade sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Hard cap on simultaneously open positions
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
    /// Cap on buys in flight at once
    #[serde(default = "default_max_concurrent_buys")]
    pub max_concurrent_buys: usize,
    /// Short-circuit all buys (dry-run switch)
    #[serde(default)]
    pub block_buy: bool,
    /// Route signed transactions through the bundle relay
    #[serde(default = "default_true")]
    pub use_relay_bundle: bool,
    /// SOL spent per entry
    #[serde(default = "default_sol_amount_per_trade")]
    pub sol_amount_per_trade: f64,
    /// Mint swapped against (the quote currency)
    #[serde(default = "default_swap_mint")]
    pub swap_mint: String,
    /// Enable the periodic wallet-wide sell sweep
    #[serde(default)]
    pub auto_sell_all: bool,
    #[serde(default = "default_sell_all_interval_ms")]
    pub sell_all_interval_ms: u64,
    /// Sell orders per sweep batch
    #[serde(default = "default_spl_sell_batch")]
    pub spl_sell_batch: usize,
    /// Spacing between sweep batches
    #[serde(default = "default_sell_wait_ms")]
    pub sell_wait_ms: u64,
    /// Position monitor tick interval
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
    /// Default order timeout
    #[serde(default = "default_order_timeout_ms")]
    pub order_timeout_ms: u64,
    /// Bounded command/price channel capacity
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Consecutive execution failures before a mint's health degrades:
    /// new entries are refused and exits fall to the sweep
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionConfig {
    /// Trailing samples used for the volatility estimate; the price ring
    /// buffer holds twice this many
    #[serde(default = "default_volatility_lookback")]
    pub volatility_lookback_periods: usize,
    /// Positions older than this are evicted by cleanup()
    #[serde(default = "default_max_position_age_secs")]
    pub max_position_age_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PersistenceConfig {
    /// Snapshot path; persistence is disabled when unset
    #[serde(default)]
    pub path: Option<String>,
}

// Default value functions
fn default_rpc_endpoint() -> String {
    std::env::var("RPC_ENDPOINT").unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".into())
}

fn default_quote_url() -> String {
    std::env::var("QUOTE_BASE_URL").unwrap_or_else(|_| "https://quote-api.jup.ag/v6".into())
}

fn default_timeout_ms() -> u64 {
    30000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    50
}

fn default_slippage_bps() -> u32 {
    2500
}

fn default_max_positions() -> usize {
    5
}

fn default_max_concurrent_buys() -> usize {
    2
}

fn default_sol_amount_per_trade() -> f64 {
    0.05
}

fn default_swap_mint() -> String {
    // wSOL
    "So11111111111111111111111111111111111111112".into()
}

fn default_sell_all_interval_ms() -> u64 {
    300_000
}

fn default_spl_sell_batch() -> usize {
    4
}

fn default_sell_wait_ms() -> u64 {
    2_000
}

fn default_monitor_interval_ms() -> u64 {
    1_000
}

fn default_order_timeout_ms() -> u64 {
    30_000
}

fn default_channel_capacity() -> usize {
    10_000
}

fn default_max_consecutive_failures() -> u32 {
    3
}

fn default_volatility_lookback() -> usize {
    20
}

fn default_max_position_age_secs() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_rpc_endpoint(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_quote_url(),
            timeout_ms: default_timeout_ms(),
            slippage_bps: default_slippage_bps(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_positions: default_max_positions(),
            max_concurrent_buys: default_max_concurrent_buys(),
            block_buy: false,
            use_relay_bundle: true,
            sol_amount_per_trade: default_sol_amount_per_trade(),
            swap_mint: default_swap_mint(),
            auto_sell_all: false,
            sell_all_interval_ms: default_sell_all_interval_ms(),
            spl_sell_batch: default_spl_sell_batch(),
            sell_wait_ms: default_sell_wait_ms(),
            monitor_interval_ms: default_monitor_interval_ms(),
            order_timeout_ms: default_order_timeout_ms(),
            channel_capacity: default_channel_capacity(),
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            volatility_lookback_periods: default_volatility_lookback(),
            max_position_age_secs: default_max_position_age_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            quote: QuoteConfig::default(),
            engine: EngineConfig::default(),
            strategy: StrategySettings::default(),
            risk: RiskConfig::default(),
            bundler: BundlerConfig::default(),
            validator: ValidatorConfig::default(),
            position: PositionConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        dotenvy::dotenv().ok();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix SWAPBOT_)
            .add_source(
                config::Environment::with_prefix("SWAPBOT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.engine.max_positions == 0 {
            anyhow::bail!("max_positions must be positive");
        }

        if self.engine.sol_amount_per_trade <= 0.0 {
            anyhow::bail!("sol_amount_per_trade must be positive");
        }

        if self.quote.slippage_bps > 10000 {
            anyhow::bail!("slippage_bps cannot exceed 10000 (100%)");
        }

        if self.engine.spl_sell_batch == 0 {
            anyhow::bail!("spl_sell_batch must be positive");
        }

        if self.engine.max_consecutive_failures == 0 {
            anyhow::bail!("max_consecutive_failures must be positive");
        }

        // Bundler: need at least one relay and one tip account
        if self.bundler.batch_size == 0 {
            anyhow::bail!("bundler.batch_size must be positive");
        }
        if self.bundler.relay_urls.is_empty() {
            anyhow::bail!("bundler.relay_urls cannot be empty");
        }
        for relay in &self.bundler.relay_urls {
            url::Url::parse(relay)
                .with_context(|| format!("Invalid relay URL: {}", relay))?;
        }
        if self.bundler.tip_accounts.is_empty() {
            anyhow::bail!("bundler.tip_accounts cannot be empty");
        }
        if self.bundler.tip_lamports < self.bundler.min_tip_lamports
            || self.bundler.tip_lamports > self.bundler.max_tip_lamports
        {
            anyhow::bail!(
                "tip_lamports {} outside [{}, {}]",
                self.bundler.tip_lamports,
                self.bundler.min_tip_lamports,
                self.bundler.max_tip_lamports
            );
        }

        // Validator patterns must compile
        for pattern in &self.validator.blacklist_patterns {
            regex::Regex::new(pattern)
                .with_context(|| format!("Invalid blacklist regex: {}", pattern))?;
        }

        // Risk thresholds
        if !(0.0..=1.0).contains(&self.risk.rug.confidence_threshold) {
            anyhow::bail!("rug.confidence_threshold must be in [0, 1]");
        }
        if self.risk.rug.min_ticks == 0 {
            anyhow::bail!("rug.min_ticks must be positive");
        }
        if self.risk.trailing.trailing_pct <= 0.0 || self.risk.trailing.trailing_pct >= 1.0 {
            anyhow::bail!("trailing_pct must be between 0 and 1");
        }

        if self.position.volatility_lookback_periods < 2 {
            anyhow::bail!("volatility_lookback_periods must be at least 2");
        }

        self.strategy.validate()?;

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  RPC:
    endpoint: {}
    timeout: {}ms
  Quote:
    base_url: {}
    slippage: {}bps
  Engine:
    max_positions: {}
    block_buy: {}
    use_relay_bundle: {}
    sol_per_trade: {} SOL
    auto_sell_all: {}
  Strategy:
    type: {:?}
  Bundler:
    batch_size: {}
    flush_interval: {}ms
    relays: {}
    tip: {} lamports
"#,
            mask_url(&self.rpc.endpoint),
            self.rpc.timeout_ms,
            mask_url(&self.quote.base_url),
            self.quote.slippage_bps,
            self.engine.max_positions,
            self.engine.block_buy,
            self.engine.use_relay_bundle,
            self.engine.sol_amount_per_trade,
            self.engine.auto_sell_all,
            self.strategy.kind,
            self.bundler.batch_size,
            self.bundler.flush_interval_ms,
            self.bundler.relay_urls.len(),
            self.bundler.tip_lamports,
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}
