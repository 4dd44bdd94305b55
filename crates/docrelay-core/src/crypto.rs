//! Passphrase-based chunk encryption.
//!
//! A side's passphrase is stretched into a 256-bit ChaCha20-Poly1305 key with
//! BLAKE3 key derivation. Every encryption draws a fresh 96-bit nonce; the
//! stored payload is `base64(nonce || ciphertext)`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use std::fmt;

use crate::error::{CoreError, Result};

const KEY_CONTEXT: &str = "docrelay-v1 chunk encryption";
const NONCE_LEN: usize = 12;

/// A side's symmetric passphrase. Empty means the side stores plaintext.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Passphrase(String);

impl Passphrase {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self(passphrase.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The raw passphrase. Only hashing and key derivation should need this.
    pub fn expose(&self) -> &str {
        &self.0
    }

    fn cipher(&self) -> Result<ChaCha20Poly1305> {
        let mut hasher = blake3::Hasher::new_derive_key(KEY_CONTEXT);
        hasher.update(self.0.as_bytes());
        let key = hasher.finalize();
        ChaCha20Poly1305::new_from_slice(key.as_bytes())
            .map_err(|e| CoreError::Encryption(e.to_string()))
    }

    /// Encrypt a chunk payload.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher()?
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| CoreError::Encryption(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    /// Decrypt a chunk payload produced by [`Passphrase::encrypt`].
    pub fn decrypt(&self, payload: &str) -> Result<String> {
        let sealed = STANDARD
            .decode(payload)
            .map_err(|e| CoreError::MalformedCiphertext(e.to_string()))?;
        if sealed.len() < NONCE_LEN {
            return Err(CoreError::MalformedCiphertext(format!(
                "payload too short: {} bytes",
                sealed.len()
            )));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);

        let plaintext = self
            .cipher()?
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| CoreError::Decryption(e.to_string()))?;

        String::from_utf8(plaintext).map_err(|e| CoreError::Decryption(e.to_string()))
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("Passphrase(<none>)")
        } else {
            f.write_str("Passphrase(<redacted>)")
        }
    }
}

impl From<&str> for Passphrase {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Passphrase {
    fn from(s: String) -> Self {
        Self(s)
    }
}
