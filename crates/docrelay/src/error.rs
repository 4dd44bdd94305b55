//! Error types for the relay process.

use docrelay_store::StoreError;
use docrelay_sync::SyncError;
use thiserror::Error;

/// Errors that stop the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The configuration file is unusable.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A store client could not be built.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// A pair's subscription failed.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// A pair's task ended abnormally.
    #[error("pair {pair} failed: {reason}")]
    PairFailed { pair: String, reason: String },
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
