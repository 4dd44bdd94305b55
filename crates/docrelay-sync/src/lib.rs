//! # docrelay Sync
//!
//! Relays note documents between the private and shared store of a sync
//! pair, in both directions, re-encrypting content on the way.
//!
//! ## Overview
//!
//! Each pair runs a [`PairScheduler`] that follows the change feeds of both
//! stores. Every admitted change is handed to the [`TransferEngine`], which
//! copies the document and its chunks into the counterpart store under the
//! counterpart's prefix and passphrase.
//!
//! ## Key Properties
//!
//! - **Idempotent**: relaying the same revision twice writes nothing new
//! - **Loop-free**: the relay's own writes are remembered in a bounded
//!   window and not relayed back
//! - **Serialized per pair**: transfers of one pair never overlap
//! - **Resumable**: feed positions are persisted by the [`CursorStore`]
//!
//! ## Flow
//!
//! ```text
//! private store                                shared store
//!   |--- change (private/a.md) --> engine --> put shared/a.md --->|
//!   |                                                             |
//!   |<-- (suppressed) <---------- engine <--- change (shared/a.md)|
//! ```

pub mod context;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod loop_guard;
pub mod pair;
pub mod scheduler;

pub use context::SyncContext;
pub use cursor::{CursorPolicy, CursorStore, PairCursors};
pub use engine::{TransferConfig, TransferEngine, TransferOutcome, TransferRequest};
pub use error::{Result, RetryReason, SyncError, TransferError};
pub use loop_guard::{LoopSuppressionCache, SuppressionEntry, SUPPRESSION_CAPACITY};
pub use pair::{Side, SyncPair};
pub use scheduler::PairScheduler;
