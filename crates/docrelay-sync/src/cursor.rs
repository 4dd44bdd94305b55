//! Change-feed cursors, persisted with debounced writes.
//!
//! The file is a JSON object keyed by pair:
//!
//! ```json
//! { "classroom": { "private_to_shared": "12-g1AA", "shared_to_private": "now" } }
//! ```
//!
//! A cursor moves in memory on every relayed event. The file is rewritten
//! [`CursorPolicy::flush_delay`] after the first unflushed move, or at once
//! when [`CursorPolicy::flush_threshold`] moves have piled up.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use docrelay_core::Direction;
use docrelay_store::SINCE_NOW;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::Result;

/// Both cursors of one pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairCursors {
    #[serde(default = "since_now")]
    pub private_to_shared: String,
    #[serde(default = "since_now")]
    pub shared_to_private: String,
}

impl PairCursors {
    pub fn get(&self, direction: Direction) -> &str {
        match direction {
            Direction::PrivateToShared => &self.private_to_shared,
            Direction::SharedToPrivate => &self.shared_to_private,
        }
    }

    fn set(&mut self, direction: Direction, position: String) {
        match direction {
            Direction::PrivateToShared => self.private_to_shared = position,
            Direction::SharedToPrivate => self.shared_to_private = position,
        }
    }
}

impl Default for PairCursors {
    fn default() -> Self {
        Self {
            private_to_shared: since_now(),
            shared_to_private: since_now(),
        }
    }
}

fn since_now() -> String {
    SINCE_NOW.to_string()
}

/// Debounce settings.
#[derive(Debug, Clone)]
pub struct CursorPolicy {
    pub flush_delay: Duration,
    pub flush_threshold: usize,
}

impl Default for CursorPolicy {
    fn default() -> Self {
        Self {
            flush_delay: Duration::from_millis(500),
            flush_threshold: 25,
        }
    }
}

/// In-memory cursors backed by a JSON file.
pub struct CursorStore {
    path: PathBuf,
    policy: CursorPolicy,
    inner: Mutex<CursorInner>,
    /// Serializes file writes so an older snapshot never lands last.
    write_lock: tokio::sync::Mutex<()>,
}

struct CursorInner {
    state: BTreeMap<String, PairCursors>,
    pending: usize,
    timer: Option<JoinHandle<()>>,
}

impl CursorStore {
    /// Load persisted cursors.
    ///
    /// A missing or unreadable file starts every direction of every pair
    /// from "now". Pairs in the file but not in `pairs` are kept.
    pub fn load<'a>(
        path: impl Into<PathBuf>,
        pairs: impl IntoIterator<Item = &'a str>,
        policy: CursorPolicy,
    ) -> Arc<Self> {
        let path = path.into();
        let mut state = read_state(&path);
        for pair in pairs {
            state.entry(pair.to_string()).or_default();
        }

        Arc::new(Self {
            path,
            policy,
            inner: Mutex::new(CursorInner {
                state,
                pending: 0,
                timer: None,
            }),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where a direction's feed should resume.
    pub fn position(&self, pair: &str, direction: Direction) -> String {
        let inner = self.inner.lock().unwrap();
        inner
            .state
            .get(pair)
            .map(|c| c.get(direction).to_string())
            .unwrap_or_else(since_now)
    }

    /// Snapshot of every cursor.
    pub fn snapshot(&self) -> BTreeMap<String, PairCursors> {
        self.inner.lock().unwrap().state.clone()
    }

    /// Move a cursor and schedule persistence.
    pub async fn advance(self: &Arc<Self>, pair: &str, direction: Direction, position: &str) -> Result<()> {
        let flush_now = {
            let mut inner = self.inner.lock().unwrap();
            inner
                .state
                .entry(pair.to_string())
                .or_default()
                .set(direction, position.to_string());
            inner.pending += 1;

            if inner.pending >= self.policy.flush_threshold {
                true
            } else {
                if inner.timer.is_none() {
                    let this = Arc::clone(self);
                    inner.timer = Some(tokio::spawn(async move {
                        tokio::time::sleep(this.policy.flush_delay).await;
                        if let Err(e) = this.write(true).await {
                            warn!(path = %this.path.display(), error = %e, "could not save sync cursors");
                        }
                    }));
                }
                false
            }
        };

        if flush_now {
            self.flush().await?;
        }
        Ok(())
    }

    /// Write the current cursors now, cancelling any scheduled write.
    pub async fn flush(&self) -> Result<()> {
        self.write(false).await
    }

    async fn write(&self, from_timer: bool) -> Result<()> {
        let _serialized = self.write_lock.lock().await;

        let snapshot = {
            let mut inner = self.inner.lock().unwrap();
            inner.pending = 0;
            let timer = inner.timer.take();
            // The timer task must not abort itself mid-write.
            if !from_timer {
                if let Some(timer) = timer {
                    timer.abort();
                }
            }
            inner.state.clone()
        };

        let body = serde_json::to_vec_pretty(&snapshot)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

fn read_state(path: &Path) -> BTreeMap<String, PairCursors> {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) => {
            info!(path = %path.display(), error = %e, "no previous sync cursors, starting from now");
            return BTreeMap::new();
        }
    };
    match serde_json::from_slice(&raw) {
        Ok(state) => state,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not parse sync cursors, starting from now");
            BTreeMap::new()
        }
    }
}
