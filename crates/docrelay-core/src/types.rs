//! Small shared types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The direction a change travels within a sync pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// From the private store into the shared store.
    PrivateToShared,
    /// From the shared store back into the private store.
    SharedToPrivate,
}

impl Direction {
    /// Both directions, in the order the scheduler starts them.
    pub const ALL: [Direction; 2] = [Direction::PrivateToShared, Direction::SharedToPrivate];

    /// The opposite direction.
    ///
    /// A document written by a `PrivateToShared` transfer shows up on the
    /// shared store's feed, which is read by `SharedToPrivate`.
    pub const fn counter(self) -> Self {
        match self {
            Direction::PrivateToShared => Direction::SharedToPrivate,
            Direction::SharedToPrivate => Direction::PrivateToShared,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::PrivateToShared => f.write_str("-->"),
            Direction::SharedToPrivate => f.write_str("<--"),
        }
    }
}
