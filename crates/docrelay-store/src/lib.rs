//! # docrelay Store
//!
//! Storage abstraction for docrelay. Each side of a sync pair is reached
//! through the [`DocStore`] trait, so the transfer engine never knows
//! whether it is talking to a remote CouchDB or to an in-process store.
//!
//! ## Key Types
//!
//! - [`DocStore`] - The async trait for all store operations
//! - [`CouchStore`] - HTTP client for a CouchDB-compatible database
//! - [`MemoryStore`] - In-memory store for tests
//! - [`ChangeFeed`] - A live, restartable stream of document changes
//! - [`PutResult`] / [`WriteOutcome`] - Write results, conflicts included
//!
//! ## Design Notes
//!
//! - **Expected outcomes are values**: a missing document is `None`, a stale
//!   revision is `PutResult::Conflict`, an existing chunk id is
//!   `WriteOutcome::Conflict`. Only transport and protocol failures are
//!   [`StoreError`]s.
//! - **Opaque positions**: feed positions are carried as strings and only
//!   ever handed back to the store that produced them.

pub mod couch;
pub mod error;
pub mod memory;
pub mod traits;

pub use couch::{CouchConfig, CouchStore};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use traits::{Change, ChangeFeed, DocStore, PutResult, StoreInfo, WriteOutcome, SINCE_NOW};
