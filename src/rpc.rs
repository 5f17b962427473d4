//! RPC abstraction
//!
//! The engine talks to the chain through a small async trait; transport
//! details stay behind it. Transient failures are retried with exponential
//! backoff, permanent ones surface immediately.

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use solana_sdk::hash::Hash;
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, warn};

use crate::config::RpcConfig;
use crate::error::{Error, Result};

/// A token balance held by the trading wallet
#[derive(Debug, Clone)]
pub struct WalletToken {
    pub mint: String,
    /// Raw on-chain amount (no decimal scaling)
    pub raw_amount: u64,
    /// Mint decimals, used to derive the UI amount
    pub decimals: u8,
}

impl WalletToken {
    /// Convert the raw amount into a UI amount
    pub fn ui_amount(&self) -> f64 {
        self.raw_amount as f64 / 10f64.powi(self.decimals as i32)
    }
}

/// Async request/response surface the engine needs from the chain
#[async_trait]
pub trait RpcApi: Send + Sync {
    /// Latest blockhash for transaction assembly
    async fn latest_blockhash(&self) -> Result<Hash>;

    /// All SPL token balances of the given owner
    async fn wallet_tokens(&self, owner: &str) -> Result<Vec<WalletToken>>;
}

/// Retry an RPC operation with exponential backoff
///
/// Retryable errors are treated as transient up to the configured cap;
/// everything else aborts the retry loop immediately.
pub async fn with_backoff<T, F, Fut>(config: &RpcConfig, op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let backoff = ExponentialBackoff {
        initial_interval: Duration::from_millis(config.retry_base_delay_ms),
        max_interval: Duration::from_millis(config.retry_base_delay_ms * 8),
        max_elapsed_time: Some(Duration::from_millis(
            config.retry_base_delay_ms * 2u64.pow(config.max_retries.max(1)),
        )),
        ..Default::default()
    };

    retry(backoff, || async {
        match op().await {
            Ok(value) => Ok(value),
            Err(e) if e.is_retryable() => {
                warn!("Retryable RPC error: {}", e);
                Err(backoff::Error::transient(e))
            }
            Err(e) => {
                error!("Permanent RPC error: {}", e);
                Err(backoff::Error::permanent(e))
            }
        }
    })
    .await
}

/// `RpcApi` backed by a JSON-RPC node
pub struct SolanaRpc {
    client: solana_client::nonblocking::rpc_client::RpcClient,
    config: RpcConfig,
}

impl SolanaRpc {
    pub fn new(config: RpcConfig) -> Self {
        let client = solana_client::nonblocking::rpc_client::RpcClient::new_with_timeout(
            config.endpoint.clone(),
            Duration::from_millis(config.timeout_ms),
        );
        Self { client, config }
    }
}

#[async_trait]
impl RpcApi for SolanaRpc {
    async fn latest_blockhash(&self) -> Result<Hash> {
        with_backoff(&self.config, || async {
            self.client
                .get_latest_blockhash()
                .await
                .map_err(|e| Error::Rpc(format!("get_latest_blockhash: {}", e)))
        })
        .await
    }

    async fn wallet_tokens(&self, owner: &str) -> Result<Vec<WalletToken>> {
        use solana_account_decoder::UiAccountData;
        use solana_client::rpc_request::TokenAccountsFilter;

        let owner = solana_sdk::pubkey::Pubkey::from_str(owner)
            .map_err(|e| Error::Rpc(format!("bad owner pubkey: {}", e)))?;

        let accounts = with_backoff(&self.config, || async {
            self.client
                .get_token_accounts_by_owner(
                    &owner,
                    TokenAccountsFilter::ProgramId(spl_token::ID),
                )
                .await
                .map_err(|e| Error::Rpc(format!("get_token_accounts_by_owner: {}", e)))
        })
        .await?;

        let mut tokens = Vec::with_capacity(accounts.len());
        for keyed in accounts {
            let UiAccountData::Json(parsed) = keyed.account.data else {
                continue;
            };
            let info = &parsed.parsed["info"];
            let Some(mint) = info["mint"].as_str() else {
                continue;
            };
            let amount = &info["tokenAmount"];
            let raw_amount = amount["amount"]
                .as_str()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(0);
            let decimals = amount["decimals"].as_u64().unwrap_or(0) as u8;
            if raw_amount == 0 {
                continue;
            }
            tokens.push(WalletToken {
                mint: mint.to_string(),
                raw_amount,
                decimals,
            });
        }

        Ok(tokens)
    }
}
