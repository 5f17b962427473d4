//! Error types for the trading engine

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the trading engine
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid signer: {0}")]
    InvalidSigner(String),

    // RPC errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("RPC timeout after {0}ms")]
    RpcTimeout(u64),

    #[error("RPC connection failed: {0}")]
    RpcConnection(String),

    // Quote service errors
    #[error("Quote request failed: {0}")]
    Quote(String),

    #[error("Quote returned no route for {0}")]
    QuoteNoRoute(String),

    // Transaction errors
    #[error("Transaction build failed: {0}")]
    TransactionBuild(String),

    #[error("Transaction decode failed: {0}")]
    TransactionDecode(String),

    #[error("Transaction send failed: {0}")]
    TransactionSend(String),

    #[error("Invalid signature length: expected 64, got {0}")]
    InvalidSignatureLength(usize),

    #[error("Slippage exceeded: expected {expected}, got {actual}")]
    SlippageExceeded { expected: u64, actual: u64 },

    // Bundle relay errors
    #[error("Bundle submission failed: {0}")]
    BundleSubmission(String),

    #[error("Bundle rejected by relay: {0}")]
    BundleRejected(String),

    #[error("Bundler stopped, enqueue refused")]
    BundlerStopped,

    #[error("No tip account configured")]
    TipAccountMissing,

    // Order errors
    #[error("Order timed out after {0}ms")]
    OrderTimeout(u64),

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    // Position / lifecycle errors
    #[error("Position not found: {0}")]
    PositionNotFound(String),

    #[error("Invalid state transition for {mint}: {from:?} -> {to:?}")]
    InvalidTransition {
        mint: String,
        from: crate::token::TokenState,
        to: crate::token::TokenState,
    },

    #[error("Persistence failed: {0}")]
    Persistence(String),

    // Engine lifecycle errors
    #[error("Engine not running")]
    EngineNotRunning,

    #[error("Engine worker failed: {0}")]
    EngineFault(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    // Validation errors
    #[error("Token rejected: {reason}")]
    TokenRejected { reason: String },

    #[error("Invalid regex pattern: {0}")]
    InvalidRegex(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Rpc(_)
                | Error::RpcTimeout(_)
                | Error::RpcConnection(_)
                | Error::TransactionSend(_)
                | Error::BundleSubmission(_)
                | Error::Quote(_)
        )
    }

    /// Check if this error prevents the engine from starting at all
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::MissingEnvVar(_)
                | Error::InvalidSigner(_)
                | Error::EngineFault(_)
        )
    }

    /// Check if this error marks an order as permanently rejected
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::TransactionBuild(_)
                | Error::TransactionDecode(_)
                | Error::InvalidSignatureLength(_)
                | Error::SlippageExceeded { .. }
                | Error::OrderRejected(_)
                | Error::QuoteNoRoute(_)
                | Error::TokenRejected { .. }
        )
    }
}

// Conversion from solana_client errors
impl From<solana_client::client_error::ClientError> for Error {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        Error::Rpc(e.to_string())
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
