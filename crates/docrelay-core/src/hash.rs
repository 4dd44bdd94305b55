//! Non-cryptographic hashing and content-addressed chunk ids.

use xxhash_rust::xxh32::xxh32;

use crate::crypto::Passphrase;

/// Prefix of chunk ids stored in plaintext.
pub const PLAIN_CHUNK_PREFIX: &str = "h:";

/// Prefix of chunk ids whose payload is encrypted.
pub const ENCRYPTED_CHUNK_PREFIX: &str = "h:+";

/// 32-bit xxHash of `bytes`.
pub fn hash32(bytes: &[u8], seed: u32) -> u32 {
    xxh32(bytes, seed)
}

/// [`hash32`] with seed 0 as lowercase hex, no zero padding.
pub fn hash32_hex(bytes: &[u8]) -> String {
    format!("{:x}", hash32(bytes, 0))
}

/// Chunk id derivation for one destination passphrase.
///
/// The passphrase hash is computed once per transfer.
#[derive(Debug, Clone, Copy)]
pub enum ChunkIdScheme {
    Plain,
    Keyed { key_hash: u32 },
}

impl ChunkIdScheme {
    pub fn for_passphrase(passphrase: &Passphrase) -> Self {
        if passphrase.is_empty() {
            ChunkIdScheme::Plain
        } else {
            ChunkIdScheme::Keyed {
                key_hash: hash32(passphrase.expose().as_bytes(), 0),
            }
        }
    }

    /// The destination id of a chunk with the given plaintext.
    pub fn chunk_id(&self, plaintext: &str) -> String {
        match self {
            ChunkIdScheme::Plain => format!("{PLAIN_CHUNK_PREFIX}{}", hash32_hex(plaintext.as_bytes())),
            ChunkIdScheme::Keyed { key_hash } => format!(
                "{ENCRYPTED_CHUNK_PREFIX}{:x}",
                hash32(plaintext.as_bytes(), 0) ^ key_hash
            ),
        }
    }
}
