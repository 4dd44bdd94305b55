//! DocStore trait: the interface of one side of a sync pair.
//!
//! Implementations include a CouchDB-compatible HTTP client and an
//! in-memory store for tests.

use async_trait::async_trait;
use docrelay_core::{Chunk, Document};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;

/// Change-feed position meaning "only changes made from now on".
pub const SINCE_NOW: &str = "now";

/// Summary returned by [`DocStore::info`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreInfo {
    pub db_name: String,
    pub doc_count: u64,
    /// Opaque current feed position.
    pub update_seq: String,
}

/// One change-feed event.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// Opaque position token; passing it back as `since` resumes after this event.
    pub position: String,
    /// The document as of this change.
    pub doc: Document,
}

/// Per-item result of [`DocStore::bulk_write_chunks`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Chunk was written.
    Written,
    /// A chunk with this id already exists. Expected for content-addressed ids.
    Conflict,
    /// Any other per-item failure.
    Failed(String),
}

/// Result of [`DocStore::put`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutResult {
    /// Document was written with a new revision.
    Written { id: String, rev: String },
    /// The baseline revision is stale.
    Conflict,
}

/// A live change feed.
///
/// Events arrive in feed order. An `Err` item means the feed broke; no
/// further items follow it. The producer task is stopped when the feed is
/// dropped.
pub struct ChangeFeed {
    receiver: mpsc::Receiver<Result<Change>>,
    task: Option<JoinHandle<()>>,
}

impl ChangeFeed {
    /// Create a sender/feed pair.
    pub fn channel(buffer: usize) -> (mpsc::Sender<Result<Change>>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            tx,
            Self {
                receiver: rx,
                task: None,
            },
        )
    }

    /// Attach the task producing this feed so it is aborted with it.
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    /// Wait for the next event. `None` means the producer went away.
    pub async fn next(&mut self) -> Option<Result<Change>> {
        self.receiver.recv().await
    }
}

impl Drop for ChangeFeed {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// One document store.
///
/// Documents and chunks live in the same id space; chunk ids contain `:`.
#[async_trait]
pub trait DocStore: Send + Sync {
    /// Basic database information.
    async fn info(&self) -> Result<StoreInfo>;

    /// Subscribe to changes after `since` for documents whose id starts
    /// with `prefix`. `since` is a previously seen position or [`SINCE_NOW`].
    async fn changes(&self, since: &str, prefix: &str) -> Result<ChangeFeed>;

    /// Fetch a live document. Deleted or unknown ids yield `None`.
    async fn get(&self, id: &str) -> Result<Option<Document>>;

    /// Fetch chunks by id, in request order. Unknown ids yield `None`.
    async fn get_chunks(&self, ids: &[String]) -> Result<Vec<Option<Chunk>>>;

    /// Write new chunks. One outcome per input, in order.
    async fn bulk_write_chunks(&self, chunks: &[Chunk]) -> Result<Vec<WriteOutcome>>;

    /// Write a document using `doc.rev` as the compare-and-swap baseline.
    async fn put(&self, doc: &Document) -> Result<PutResult>;
}
