//! In-memory implementation of the DocStore trait.
//!
//! This is primarily for testing. It follows CouchDB semantics closely
//! enough for the relay: compare-and-swap writes keyed on revision tokens,
//! deleted documents that read as missing, per-chunk conflicts on existing
//! ids, and a live change feed that replays a backlog before going live.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use docrelay_core::{Chunk, Document};
use tokio::sync::broadcast;

use crate::error::{Result, StoreError};
use crate::traits::{Change, ChangeFeed, DocStore, PutResult, StoreInfo, WriteOutcome, SINCE_NOW};

const FEED_BUFFER: usize = 256;
const EVENT_CAPACITY: usize = 1024;

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    name: String,
    inner: RwLock<MemoryStoreInner>,
    events: broadcast::Sender<(u64, Document)>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Last assigned sequence number.
    seq: u64,

    /// Documents by id, including deleted ones.
    docs: HashMap<String, Document>,

    /// Chunks by id.
    chunks: HashMap<String, Chunk>,

    /// Feed log: (seq, document snapshot).
    log: Vec<(u64, Document)>,

    /// Latest seq per document id.
    latest: HashMap<String, u64>,

    /// Test hooks.
    injected_conflicts: usize,
    fail_chunk_writes: bool,
    fail_gets: bool,
    fail_puts: bool,
    put_attempts: usize,
    chunk_writes: usize,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new(name: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            name: name.into(),
            inner: RwLock::new(MemoryStoreInner::default()),
            events,
        }
    }

    /// Store a chunk directly, bypassing conflict checks.
    pub fn insert_chunk(&self, chunk: Chunk) {
        let mut inner = self.inner.write().unwrap();
        inner.chunks.insert(chunk.id.clone(), chunk);
    }

    /// Read a chunk directly.
    pub fn chunk(&self, id: &str) -> Option<Chunk> {
        self.inner.read().unwrap().chunks.get(id).cloned()
    }

    /// Number of stored chunks.
    pub fn chunk_count(&self) -> usize {
        self.inner.read().unwrap().chunks.len()
    }

    /// Read a document directly, including deleted ones.
    pub fn raw_document(&self, id: &str) -> Option<Document> {
        self.inner.read().unwrap().docs.get(id).cloned()
    }

    /// Make the next `n` calls to [`DocStore::put`] report a conflict.
    pub fn inject_put_conflicts(&self, n: usize) {
        self.inner.write().unwrap().injected_conflicts = n;
    }

    /// Make every chunk write fail with a non-conflict error.
    pub fn fail_chunk_writes(&self, fail: bool) {
        self.inner.write().unwrap().fail_chunk_writes = fail;
    }

    /// Make every [`DocStore::get`] fail with a server error.
    pub fn fail_gets(&self, fail: bool) {
        self.inner.write().unwrap().fail_gets = fail;
    }

    /// Make every [`DocStore::put`] fail with a server error.
    pub fn fail_puts(&self, fail: bool) {
        self.inner.write().unwrap().fail_puts = fail;
    }

    /// Number of [`DocStore::put`] calls so far.
    pub fn put_attempts(&self) -> usize {
        self.inner.read().unwrap().put_attempts
    }

    /// Number of chunks actually written through [`DocStore::bulk_write_chunks`].
    pub fn chunk_writes(&self) -> usize {
        self.inner.read().unwrap().chunk_writes
    }
}

impl MemoryStoreInner {
    fn commit(&mut self, mut doc: Document) -> (u64, Document) {
        let generation = self
            .docs
            .get(&doc.id)
            .and_then(|d| d.rev.as_deref())
            .and_then(rev_generation)
            .unwrap_or(0)
            + 1;

        doc.rev = None;
        let body = serde_json::to_vec(&doc).unwrap_or_default();
        let mut hasher = blake3::Hasher::new();
        hasher.update(&generation.to_le_bytes());
        hasher.update(&body);
        let digest = hasher.finalize();
        doc.rev = Some(format!(
            "{}-{}",
            generation,
            hex::encode(&digest.as_bytes()[..8])
        ));

        self.seq += 1;
        let seq = self.seq;
        self.docs.insert(doc.id.clone(), doc.clone());
        self.log.push((seq, doc.clone()));
        self.latest.insert(doc.id.clone(), seq);
        (seq, doc)
    }
}

fn injected_failure() -> StoreError {
    StoreError::Status {
        status: 500,
        body: "injected failure".into(),
    }
}

fn rev_generation(rev: &str) -> Option<u64> {
    rev.split_once('-').and_then(|(g, _)| g.parse().ok())
}

#[async_trait]
impl DocStore for MemoryStore {
    async fn info(&self) -> Result<StoreInfo> {
        let inner = self.inner.read().unwrap();
        Ok(StoreInfo {
            db_name: self.name.clone(),
            doc_count: inner.docs.values().filter(|d| !d.deleted).count() as u64
                + inner.chunks.len() as u64,
            update_seq: inner.seq.to_string(),
        })
    }

    async fn changes(&self, since: &str, prefix: &str) -> Result<ChangeFeed> {
        // Subscribe while holding the lock so no commit falls between the
        // backlog snapshot and the live stream.
        let (backlog, mut events, mut last) = {
            let inner = self.inner.read().unwrap();
            let since = if since == SINCE_NOW {
                inner.seq
            } else {
                since
                    .parse::<u64>()
                    .map_err(|_| StoreError::InvalidData(format!("bad feed position: {since}")))?
            };

            let backlog: Vec<(u64, Document)> = inner
                .log
                .iter()
                .filter(|(seq, doc)| {
                    *seq > since
                        && inner.latest.get(&doc.id) == Some(seq)
                        && doc.id.starts_with(prefix)
                })
                .cloned()
                .collect();

            (backlog, self.events.subscribe(), inner.seq)
        };

        let prefix = prefix.to_string();
        let (tx, feed) = ChangeFeed::channel(FEED_BUFFER);
        let task = tokio::spawn(async move {
            for (seq, doc) in backlog {
                let change = Change {
                    position: seq.to_string(),
                    doc,
                };
                if tx.send(Ok(change)).await.is_err() {
                    return;
                }
            }

            loop {
                match events.recv().await {
                    Ok((seq, doc)) => {
                        if seq <= last || !doc.id.starts_with(&prefix) {
                            continue;
                        }
                        last = seq;
                        let change = Change {
                            position: seq.to_string(),
                            doc,
                        };
                        if tx.send(Ok(change)).await.is_err() {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        let _ = tx
                            .send(Err(StoreError::Feed(format!(
                                "subscriber lagged by {skipped} events"
                            ))))
                            .await;
                        return;
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });

        Ok(feed.with_task(task))
    }

    async fn get(&self, id: &str) -> Result<Option<Document>> {
        let inner = self.inner.read().unwrap();
        if inner.fail_gets {
            return Err(injected_failure());
        }
        Ok(inner.docs.get(id).filter(|d| !d.deleted).cloned())
    }

    async fn get_chunks(&self, ids: &[String]) -> Result<Vec<Option<Chunk>>> {
        let inner = self.inner.read().unwrap();
        Ok(ids.iter().map(|id| inner.chunks.get(id).cloned()).collect())
    }

    async fn bulk_write_chunks(&self, chunks: &[Chunk]) -> Result<Vec<WriteOutcome>> {
        let mut inner = self.inner.write().unwrap();

        let mut outcomes = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            if inner.fail_chunk_writes {
                outcomes.push(WriteOutcome::Failed("injected failure".into()));
                continue;
            }
            if inner.chunks.contains_key(&chunk.id) {
                outcomes.push(WriteOutcome::Conflict);
                continue;
            }
            let mut stored = chunk.clone();
            stored.rev = Some("1-0".into());
            inner.chunks.insert(stored.id.clone(), stored);
            inner.chunk_writes += 1;
            outcomes.push(WriteOutcome::Written);
        }

        Ok(outcomes)
    }

    async fn put(&self, doc: &Document) -> Result<PutResult> {
        let committed = {
            let mut inner = self.inner.write().unwrap();
            inner.put_attempts += 1;

            if inner.fail_puts {
                return Err(injected_failure());
            }

            if inner.injected_conflicts > 0 {
                inner.injected_conflicts -= 1;
                return Ok(PutResult::Conflict);
            }

            let current = inner.docs.get(&doc.id);
            let baseline_ok = match (current, &doc.rev) {
                (Some(existing), rev) if existing.deleted => {
                    rev.is_none() || rev == &existing.rev
                }
                (Some(existing), Some(rev)) => existing.rev.as_ref() == Some(rev),
                (Some(_), None) => false,
                (None, rev) => rev.is_none(),
            };
            if !baseline_ok {
                return Ok(PutResult::Conflict);
            }

            inner.commit(doc.clone())
        };

        let (seq, stored) = committed;
        let _ = self.events.send((seq, stored.clone()));

        Ok(PutResult::Written {
            id: stored.id,
            rev: stored.rev.unwrap_or_default(),
        })
    }
}
