//! Loop suppression: a bounded record of documents the relay wrote itself.
//!
//! When the engine writes a document into a store, that store's own change
//! feed reports the write a moment later. Recording `(pair, direction, id,
//! rev)` for the reverse direction lets that echo be recognised and dropped.
//! The window is the most recent [`SUPPRESSION_CAPACITY`] writes.

use docrelay_core::Direction;

/// How many self-written entries are remembered process-wide.
pub const SUPPRESSION_CAPACITY: usize = 50;

/// One self-written document revision, keyed by the direction that will see it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SuppressionEntry {
    pub pair: String,
    pub direction: Direction,
    pub id: String,
    pub rev: String,
}

impl SuppressionEntry {
    pub fn new(
        pair: impl Into<String>,
        direction: Direction,
        id: impl Into<String>,
        rev: impl Into<String>,
    ) -> Self {
        Self {
            pair: pair.into(),
            direction,
            id: id.into(),
            rev: rev.into(),
        }
    }
}

/// Fixed-capacity ring buffer; the oldest entry is overwritten first.
#[derive(Debug)]
pub struct LoopSuppressionCache {
    slots: Vec<SuppressionEntry>,
    next: usize,
    capacity: usize,
}

impl LoopSuppressionCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            next: 0,
            capacity,
        }
    }

    pub fn record(&mut self, entry: SuppressionEntry) {
        if self.slots.len() < self.capacity {
            self.slots.push(entry);
        } else {
            self.slots[self.next] = entry;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    pub fn contains(&self, entry: &SuppressionEntry) -> bool {
        self.slots.iter().any(|e| e == entry)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for LoopSuppressionCache {
    fn default() -> Self {
        Self::new(SUPPRESSION_CAPACITY)
    }
}
