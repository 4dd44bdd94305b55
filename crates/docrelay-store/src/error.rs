//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
///
/// Missing documents and revision conflicts are not errors; they are
/// reported through `Option`, [`PutResult`](crate::PutResult) and
/// [`WriteOutcome`](crate::WriteOutcome).
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with an unexpected status.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// Body serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The change feed could not be continued.
    #[error("change feed error: {0}")]
    Feed(String),

    /// Invalid input or stored data.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
