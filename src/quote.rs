//! Quote/swap service client
//!
//! Fetches swap routes and pre-built unsigned transactions from an
//! external aggregator. The engine never inspects the transaction bytes
//! beyond re-signing them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::QuoteConfig;
use crate::error::{Error, Result};

/// Swap quote request
#[derive(Debug, Clone, Serialize)]
pub struct QuoteRequest {
    pub input_mint: String,
    pub output_mint: String,
    pub amount_lamports: u64,
    pub slippage_bps: u32,
}

/// Swap quote response
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteResponse {
    #[serde(default)]
    pub in_amount: u64,
    #[serde(default)]
    pub out_amount: u64,
    #[serde(default)]
    pub price_impact_pct: f64,
    #[serde(default)]
    pub route_plan: Vec<RouteStep>,
    /// Base64-encoded unsigned versioned transaction
    pub swap_transaction: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteStep {
    pub label: String,
    #[serde(default)]
    pub percent: u8,
}

/// Abstract quote service
#[async_trait]
pub trait QuoteApi: Send + Sync {
    /// Fetch a swap route and unsigned transaction
    async fn quote(&self, request: &QuoteRequest) -> Result<QuoteResponse>;
}

/// HTTP quote client
pub struct HttpQuoteClient {
    http: reqwest::Client,
    config: QuoteConfig,
}

impl HttpQuoteClient {
    pub fn new(config: QuoteConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Quote(format!("http client: {}", e)))?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl QuoteApi for HttpQuoteClient {
    async fn quote(&self, request: &QuoteRequest) -> Result<QuoteResponse> {
        let url = format!("{}/swap", self.config.base_url.trim_end_matches('/'));

        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Quote(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Quote(format!(
                "quote service returned {}",
                response.status()
            )));
        }

        let quote: QuoteResponse = response
            .json()
            .await
            .map_err(|e| Error::Quote(format!("bad response body: {}", e)))?;

        if quote.swap_transaction.is_empty() {
            return Err(Error::QuoteNoRoute(request.output_mint.clone()));
        }

        Ok(quote)
    }
}
