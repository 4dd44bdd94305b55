//! # docrelay Testkit
//!
//! Testing utilities for docrelay.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a private and a shared [`MemoryStore`](docrelay_store::MemoryStore)
//!   wired into a sync pair, with helpers to write and read notes the way an
//!   editor client would
//! - **Generators**: Proptest strategies for note ids, chunk text and passphrases
//!
//! ## Test Fixtures
//!
//! ```rust
//! use docrelay_testkit::{RelayFixture, Vault};
//!
//! # async fn example() {
//! let fixture = RelayFixture::with_keys("private-key", "");
//! fixture.write_note(Vault::Private, "private/a.md", &["hello"]).await;
//! let pair = fixture.pair("classroom");
//! # }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{RelayFixture, Vault};
pub use generators::{chunk_text, note_id, note_path, passphrase, plain_note};
