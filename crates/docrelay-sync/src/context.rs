//! Process-wide shared sync state.
//!
//! Owned by the supervisor and handed to every pair scheduler and transfer
//! engine, so nothing lives in globals and a pair can be tested alone.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::loop_guard::{LoopSuppressionCache, SuppressionEntry, SUPPRESSION_CAPACITY};

/// Shared state: the loop-suppression window and the per-pair transfer locks.
#[derive(Debug)]
pub struct SyncContext {
    suppression: Mutex<LoopSuppressionCache>,
    pair_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SyncContext {
    pub fn new() -> Self {
        Self::with_suppression_capacity(SUPPRESSION_CAPACITY)
    }

    pub fn with_suppression_capacity(capacity: usize) -> Self {
        Self {
            suppression: Mutex::new(LoopSuppressionCache::new(capacity)),
            pair_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The lock that serializes transfers of one pair.
    pub fn pair_lock(&self, pair: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.pair_locks.lock().unwrap();
        Arc::clone(locks.entry(pair.to_string()).or_default())
    }

    /// Remember a document revision the relay itself wrote.
    pub fn record_self_write(&self, entry: SuppressionEntry) {
        self.suppression.lock().unwrap().record(entry);
    }

    /// Whether a change event is the echo of one of our own writes.
    pub fn is_self_write(&self, entry: &SuppressionEntry) -> bool {
        self.suppression.lock().unwrap().contains(entry)
    }
}

impl Default for SyncContext {
    fn default() -> Self {
        Self::new()
    }
}
