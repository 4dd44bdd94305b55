//! # docrelay Core
//!
//! Pure primitives for docrelay: the document and chunk model shared by both
//! stores of a sync pair, the rules for re-homing a document id between path
//! prefixes, content-addressed chunk identity, and the passphrase cipher.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Document`] - A multi-version document as held by a store
//! - [`Chunk`] - A content unit referenced from a document's `children`
//! - [`Direction`] - Which way a change is relayed within a pair
//! - [`Passphrase`] - A side's symmetric passphrase (empty = plaintext side)
//! - [`ChunkIdScheme`] - Derives destination chunk ids for one passphrase
//!
//! ## Chunk Identity
//!
//! Chunk ids are content-addressed. For a plaintext destination the id is
//! `"h:" + hex(xxh32(plaintext))`; for an encrypted destination it is
//! `"h:+" + hex(xxh32(plaintext) ^ xxh32(passphrase))`. Equal plaintext under
//! the same destination key always yields the same id.

pub mod crypto;
pub mod document;
pub mod error;
pub mod hash;
pub mod ids;
pub mod types;

pub use crypto::Passphrase;
pub use document::{Chunk, Document, DocumentShape};
pub use error::{CoreError, Result};
pub use hash::{hash32, hash32_hex, ChunkIdScheme, ENCRYPTED_CHUNK_PREFIX, PLAIN_CHUNK_PREFIX};
pub use ids::{is_eligible, rehome, VERSION_DOC_ID};
pub use types::Direction;
