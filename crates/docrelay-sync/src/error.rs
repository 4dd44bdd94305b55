//! Error types for the sync module.

use docrelay_core::{CoreError, Direction};
use docrelay_store::StoreError;
use thiserror::Error;

/// Errors that end a pair's subscription or touch the cursor file.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The change feed failed. Escalated to the supervisor.
    #[error("change feed of pair {pair} ({direction}) failed: {source}")]
    Feed {
        pair: String,
        direction: Direction,
        #[source]
        source: StoreError,
    },

    /// The change feed ended. Live feeds never end on their own.
    #[error("change feed of pair {pair} ({direction}) closed")]
    FeedClosed { pair: String, direction: Direction },

    /// Cursor file I/O error.
    #[error("cursor I/O error: {0}")]
    CursorIo(#[from] std::io::Error),

    /// Cursor file encoding error.
    #[error("cursor format error: {0}")]
    CursorFormat(#[from] serde_json::Error),
}

/// Why a single document could not be relayed.
///
/// None of these end the pair; the document waits for its next change event.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Reading from a store failed.
    #[error("fetch failed: {0}")]
    Fetch(#[source] StoreError),

    /// The document id is outside the source prefix.
    #[error("document {id} is outside prefix {prefix:?}")]
    PrefixMismatch { id: String, prefix: String },

    /// The document has no chunk list.
    #[error("document {0} has no chunk list")]
    MalformedDocument(String),

    /// Referenced chunks are absent from the source.
    #[error("document {id} references {} missing chunk(s): {}", missing.len(), missing.join(", "))]
    MissingChunks { id: String, missing: Vec<String> },

    /// Writing chunks to the destination failed for a reason other than a conflict.
    #[error("chunk write failed: {0}")]
    ChunkWrite(String),

    /// Writing the document failed for a reason other than a conflict.
    #[error("document write failed: {0}")]
    DocumentWrite(#[source] StoreError),

    /// Every attempt ended in a retryable failure.
    #[error("gave up after {attempts} attempt(s), last: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

/// A failure that restarts the attempt from the destination fetch.
#[derive(Debug, Error)]
pub enum RetryReason {
    /// The destination document changed under us.
    #[error("revision conflict")]
    Conflict,

    /// A chunk could not be decrypted or re-encrypted.
    #[error("chunk {chunk}: {source}")]
    Crypto {
        chunk: String,
        #[source]
        source: CoreError,
    },
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
