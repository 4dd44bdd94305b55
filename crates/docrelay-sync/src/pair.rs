//! Runtime view of a configured sync pair.

use std::fmt;
use std::sync::Arc;

use docrelay_core::{Direction, Passphrase};
use docrelay_store::DocStore;

/// One side of a pair: its store, path prefix and passphrase.
#[derive(Clone)]
pub struct Side {
    pub store: Arc<dyn DocStore>,
    pub prefix: String,
    pub passphrase: Passphrase,
}

impl Side {
    pub fn new(store: Arc<dyn DocStore>, prefix: impl Into<String>, passphrase: Passphrase) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            passphrase,
        }
    }
}

impl fmt::Debug for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Side")
            .field("prefix", &self.prefix)
            .field("passphrase", &self.passphrase)
            .finish_non_exhaustive()
    }
}

/// A private and a shared store relayed into each other.
#[derive(Debug, Clone)]
pub struct SyncPair {
    pub key: String,
    pub private: Side,
    pub shared: Side,
}

impl SyncPair {
    pub fn new(key: impl Into<String>, private: Side, shared: Side) -> Self {
        Self {
            key: key.into(),
            private,
            shared,
        }
    }

    /// `(source, destination)` for a direction.
    pub fn endpoints(&self, direction: Direction) -> (&Side, &Side) {
        match direction {
            Direction::PrivateToShared => (&self.private, &self.shared),
            Direction::SharedToPrivate => (&self.shared, &self.private),
        }
    }
}
