//! # docrelay
//!
//! Relays note documents between a private and a shared CouchDB-compatible
//! store, each with its own encryption passphrase, so that two parties can
//! share a subtree of a vault without ever sharing keys.
//!
//! ## Overview
//!
//! - **Sync pairs**: a private and a shared endpoint, each with a path
//!   prefix. Documents under one prefix are mirrored under the other.
//! - **Re-encryption**: chunks are decrypted with the source passphrase and
//!   encrypted with the destination's, under content-addressed ids.
//! - **Loop suppression**: the relay's own writes are not relayed back.
//! - **Resumable**: feed positions are saved to a cursor file.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use docrelay::{RelayConfig, RelaySettings, Supervisor};
//!
//! async fn example() -> docrelay::Result<()> {
//!     let config = RelayConfig::load("./dat/config.json")?;
//!     let supervisor = Supervisor::from_config(&config, RelaySettings::default())?;
//!     supervisor.sanity_check().await;
//!     let summary = supervisor.run().await?;
//!     println!("{} pair(s) failed", summary.failed.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `docrelay::core` - Documents, ids, hashing and the passphrase cipher
//! - `docrelay::store` - The store boundary, CouchDB client and memory store
//! - `docrelay::sync` - Transfer engine, pair scheduler and cursors

pub mod config;
pub mod error;
pub mod supervisor;

// Re-export component crates
pub use docrelay_core as core;
pub use docrelay_store as store;
pub use docrelay_sync as sync;

pub use config::{AuthConfig, PairConfig, RelayConfig, SideConfig, DEFAULT_PAIR};
pub use error::{RelayError, Result};
pub use supervisor::{FailedPair, RelaySettings, RunSummary, Supervisor};
