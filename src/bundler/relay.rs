//! Bundle relay client
//!
//! Submits bundles over JSON-RPC `sendBundle`. Each relay gets the same
//! payload; responses are logged but a relay failure never fails the
//! flush as a whole.

use async_trait::async_trait;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Derive a short bundle id from the payload
pub fn bundle_id(bundle: &[String]) -> String {
    let mut hasher = Sha256::new();
    for tx in bundle {
        hasher.update(tx.as_bytes());
    }
    let digest = hasher.finalize();
    hex_prefix(&digest, 8)
}

fn hex_prefix(bytes: &[u8], n: usize) -> String {
    bytes.iter().take(n).map(|b| format!("{:02x}", b)).collect()
}

/// One relay submission target
#[async_trait]
pub trait RelaySink: Send + Sync {
    /// POST a bundle of base58 transactions to a relay endpoint.
    /// Returns the raw response body for logging.
    async fn submit(&self, url: &str, bundle: &[String]) -> Result<String>;
}

/// HTTP JSON-RPC relay sink
pub struct HttpRelaySink {
    http: reqwest::Client,
}

impl HttpRelaySink {
    pub fn new(timeout_ms: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| Error::BundleSubmission(format!("http client: {}", e)))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl RelaySink for HttpRelaySink {
    async fn submit(&self, url: &str, bundle: &[String]) -> Result<String> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "sendBundle",
            "params": [bundle],
        });

        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::BundleSubmission(format!("{}: {}", url, e)))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if status.is_server_error() {
            warn!("Relay {} returned {}: {}", url, status, text);
            return Err(Error::BundleSubmission(format!("{}: {}", url, status)));
        }
        if !status.is_success() {
            return Err(Error::BundleRejected(format!("{}: {}", url, status)));
        }

        debug!("Relay {} accepted bundle: {}", url, text);
        Ok(text)
    }
}
