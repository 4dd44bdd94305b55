//! Error types for docrelay core.

use thiserror::Error;

/// Errors raised by the chunk cipher.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("decryption error: {0}")]
    Decryption(String),

    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
