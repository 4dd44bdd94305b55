//! The transfer engine: relays one changed document into the counterpart store.
//!
//! For a document seen on the source feed the engine
//!
//! 1. drops it if it is the echo of one of our own writes,
//! 2. re-homes its id under the destination prefix,
//! 3. reads the destination's current copy for its revision and chunk ids,
//! 4. fetches the source chunks, decrypts them with the source passphrase and
//!    re-encrypts them for the destination, recomputing content-addressed ids,
//! 5. writes only chunks the destination copy does not already list,
//! 6. skips the document write when the destination is already converged,
//!    and otherwise writes it with the destination revision as baseline.
//!
//! Revision conflicts and chunk cipher failures restart from step 3 after a
//! fixed delay, up to [`TransferConfig::max_attempts`] attempts. Every other
//! failure drops the event; a later change to the same document retries it.
//! Transfers of one pair never overlap.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use docrelay_core::{rehome, Chunk, ChunkIdScheme, CoreError, Direction, Document, Passphrase};
use docrelay_store::{DocStore, PutResult, WriteOutcome};
use tracing::{debug, info, warn};

use crate::context::SyncContext;
use crate::error::{RetryReason, TransferError};
use crate::loop_guard::SuppressionEntry;

/// Retry policy for a single transfer.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Pause before each retry.
    pub retry_delay: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            retry_delay: Duration::from_millis(1500),
        }
    }
}

/// Everything needed to relay one document.
#[derive(Clone, Copy)]
pub struct TransferRequest<'a> {
    pub pair: &'a str,
    pub direction: Direction,
    pub source: &'a dyn DocStore,
    pub source_doc: &'a Document,
    pub source_prefix: &'a str,
    pub dest: &'a dyn DocStore,
    pub dest_prefix: &'a str,
    pub decrypt_key: &'a Passphrase,
    pub encrypt_key: &'a Passphrase,
}

/// How a successful transfer ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The event was the echo of our own write.
    Suppressed,
    /// Deleted at the source and absent at the destination.
    AlreadyDeleted,
    /// The destination already held the same content.
    Converged { chunks_written: usize },
    /// The document was written to the destination.
    Written {
        id: String,
        rev: String,
        chunks_written: usize,
    },
}

enum Attempt {
    Done(TransferOutcome),
    Retry(RetryReason),
}

/// Relays documents between the two stores of a pair.
pub struct TransferEngine {
    context: Arc<SyncContext>,
    config: TransferConfig,
}

impl TransferEngine {
    pub fn new(context: Arc<SyncContext>, config: TransferConfig) -> Self {
        Self { context, config }
    }

    /// Relay one document. Failures are logged and reported as `false`.
    pub async fn transfer(&self, req: &TransferRequest<'_>) -> bool {
        match self.try_transfer(req).await {
            Ok(TransferOutcome::Written {
                id,
                rev,
                chunks_written,
            }) => {
                info!(
                    pair = req.pair,
                    direction = %req.direction,
                    doc = %req.source_doc.id,
                    dest = %id,
                    rev = %rev,
                    chunks = chunks_written,
                    "transferred"
                );
                true
            }
            Ok(outcome) => {
                debug!(
                    pair = req.pair,
                    direction = %req.direction,
                    doc = %req.source_doc.id,
                    ?outcome,
                    "nothing to write"
                );
                true
            }
            Err(e) => {
                warn!(
                    pair = req.pair,
                    direction = %req.direction,
                    doc = %req.source_doc.id,
                    rev = req.source_doc.rev.as_deref().unwrap_or(""),
                    error = %e,
                    "transfer failed"
                );
                false
            }
        }
    }

    /// Relay one document, reporting exactly how it went.
    pub async fn try_transfer(
        &self,
        req: &TransferRequest<'_>,
    ) -> Result<TransferOutcome, TransferError> {
        let lock = self.context.pair_lock(req.pair);
        let _guard = lock.lock().await;

        if let Some(rev) = &req.source_doc.rev {
            let echo = SuppressionEntry::new(req.pair, req.direction, &req.source_doc.id, rev);
            if self.context.is_self_write(&echo) {
                return Ok(TransferOutcome::Suppressed);
            }
        }

        let dest_id = rehome(&req.source_doc.id, req.source_prefix, req.dest_prefix).ok_or_else(
            || TransferError::PrefixMismatch {
                id: req.source_doc.id.clone(),
                prefix: req.source_prefix.to_string(),
            },
        )?;
        let scheme = ChunkIdScheme::for_passphrase(req.encrypt_key);

        let max_attempts = self.config.max_attempts.max(1);
        let mut last = None;
        for attempt in 1..=max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.config.retry_delay).await;
            }
            match self.attempt(req, &dest_id, scheme).await? {
                Attempt::Done(outcome) => return Ok(outcome),
                Attempt::Retry(reason) => {
                    warn!(
                        pair = req.pair,
                        direction = %req.direction,
                        doc = %req.source_doc.id,
                        attempt,
                        reason = %reason,
                        "retrying transfer"
                    );
                    last = Some(reason);
                }
            }
        }

        Err(TransferError::RetriesExhausted {
            attempts: max_attempts,
            last: last.map(|r| r.to_string()).unwrap_or_default(),
        })
    }

    async fn attempt(
        &self,
        req: &TransferRequest<'_>,
        dest_id: &str,
        scheme: ChunkIdScheme,
    ) -> Result<Attempt, TransferError> {
        let existing = req.dest.get(dest_id).await.map_err(TransferError::Fetch)?;
        if existing.is_none() && req.source_doc.deleted {
            return Ok(Attempt::Done(TransferOutcome::AlreadyDeleted));
        }

        let children = req
            .source_doc
            .children
            .as_ref()
            .ok_or_else(|| TransferError::MalformedDocument(req.source_doc.id.clone()))?;

        let fetched = req
            .source
            .get_chunks(children)
            .await
            .map_err(TransferError::Fetch)?;
        let missing: Vec<String> = children
            .iter()
            .zip(&fetched)
            .filter(|(_, chunk)| chunk.is_none())
            .map(|(id, _)| id.clone())
            .collect();
        if !missing.is_empty() || fetched.len() != children.len() {
            return Err(TransferError::MissingChunks {
                id: req.source_doc.id.clone(),
                missing,
            });
        }

        let mut rehomed = Vec::with_capacity(fetched.len());
        for chunk in fetched.into_iter().flatten() {
            let source_id = chunk.id.clone();
            match rehome_chunk(chunk, req.decrypt_key, req.encrypt_key, scheme) {
                Ok(chunk) => rehomed.push(chunk),
                Err(source) => {
                    return Ok(Attempt::Retry(RetryReason::Crypto {
                        chunk: source_id,
                        source,
                    }))
                }
            }
        }

        let mut doc = req.source_doc.clone();
        doc.id = dest_id.to_string();
        doc.rev = existing.as_ref().and_then(|d| d.rev.clone());
        doc.children = Some(rehomed.iter().map(|c| c.id.clone()).collect());

        let present: HashSet<&str> = existing
            .as_ref()
            .and_then(|d| d.children.as_ref())
            .map(|ids| ids.iter().map(String::as_str).collect())
            .unwrap_or_default();
        let mut queued = HashSet::new();
        let to_write: Vec<Chunk> = rehomed
            .into_iter()
            .filter(|c| !present.contains(c.id.as_str()) && queued.insert(c.id.clone()))
            .collect();

        let chunks_written = if to_write.is_empty() {
            0
        } else {
            debug!(
                pair = req.pair,
                direction = %req.direction,
                doc = %req.source_doc.id,
                chunks = to_write.len(),
                "writing chunks"
            );
            write_chunks(req.dest, &to_write).await?
        };

        if let Some(existing) = &existing {
            if existing.shape() == doc.shape() {
                return Ok(Attempt::Done(TransferOutcome::Converged { chunks_written }));
            }
        }

        match req.dest.put(&doc).await.map_err(TransferError::DocumentWrite)? {
            PutResult::Written { id, rev } => {
                self.context.record_self_write(SuppressionEntry::new(
                    req.pair,
                    req.direction.counter(),
                    &id,
                    &rev,
                ));
                Ok(Attempt::Done(TransferOutcome::Written {
                    id,
                    rev,
                    chunks_written,
                }))
            }
            PutResult::Conflict => Ok(Attempt::Retry(RetryReason::Conflict)),
        }
    }
}

/// Write chunks, treating existing ids as success. Returns how many were new.
async fn write_chunks(dest: &dyn DocStore, chunks: &[Chunk]) -> Result<usize, TransferError> {
    let outcomes = dest
        .bulk_write_chunks(chunks)
        .await
        .map_err(|e| TransferError::ChunkWrite(e.to_string()))?;

    let failures: Vec<String> = chunks
        .iter()
        .zip(&outcomes)
        .filter_map(|(chunk, outcome)| match outcome {
            WriteOutcome::Failed(reason) => Some(format!("{}: {}", chunk.id, reason)),
            _ => None,
        })
        .collect();
    if !failures.is_empty() {
        return Err(TransferError::ChunkWrite(failures.join("; ")));
    }

    Ok(outcomes
        .iter()
        .filter(|o| matches!(o, WriteOutcome::Written))
        .count())
}

/// Decrypt a source chunk and re-encrypt it under the destination scheme.
fn rehome_chunk(
    mut chunk: Chunk,
    decrypt_key: &Passphrase,
    encrypt_key: &Passphrase,
    scheme: ChunkIdScheme,
) -> Result<Chunk, CoreError> {
    let payload = std::mem::take(&mut chunk.data);
    let plaintext = if decrypt_key.is_empty() {
        payload
    } else {
        decrypt_key.decrypt(&payload)?
    };

    chunk.id = scheme.chunk_id(&plaintext);
    chunk.data = if encrypt_key.is_empty() {
        plaintext
    } else {
        encrypt_key.encrypt(&plaintext)?
    };
    chunk.rev = None;
    Ok(chunk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrelay_core::hash32_hex;
    use docrelay_store::MemoryStore;

    struct Harness {
        engine: TransferEngine,
        source: MemoryStore,
        dest: MemoryStore,
        decrypt_key: Passphrase,
        encrypt_key: Passphrase,
    }

    impl Harness {
        fn new(decrypt_key: &str, encrypt_key: &str, config: TransferConfig) -> Self {
            Self {
                engine: TransferEngine::new(Arc::new(SyncContext::new()), config),
                source: MemoryStore::new("private"),
                dest: MemoryStore::new("shared"),
                decrypt_key: Passphrase::new(decrypt_key),
                encrypt_key: Passphrase::new(encrypt_key),
            }
        }

        fn plain() -> Self {
            Self::new("", "", TransferConfig::default())
        }

        fn request<'a>(&'a self, doc: &'a Document) -> TransferRequest<'a> {
            TransferRequest {
                pair: "pair",
                direction: Direction::PrivateToShared,
                source: &self.source,
                source_doc: doc,
                source_prefix: "private/",
                dest: &self.dest,
                dest_prefix: "shared/",
                decrypt_key: &self.decrypt_key,
                encrypt_key: &self.encrypt_key,
            }
        }

        async fn seed(&self, id: &str, chunks: &[(&str, &str)]) -> Document {
            for (chunk_id, data) in chunks {
                let data = if self.decrypt_key.is_empty() {
                    data.to_string()
                } else {
                    self.decrypt_key.encrypt(data).unwrap()
                };
                self.source.insert_chunk(Chunk::new(*chunk_id, data));
            }
            let doc = Document::new(id)
                .with_children(chunks.iter().map(|(c, _)| *c))
                .with_mtime(1000);
            self.source.put(&doc).await.unwrap();
            self.source.get(id).await.unwrap().unwrap()
        }
    }

    #[tokio::test]
    async fn test_plain_create() {
        let h = Harness::plain();
        let doc = h.seed("private/note1", &[("c1", "hello")]).await;

        let outcome = h.engine.try_transfer(&h.request(&doc)).await.unwrap();
        assert!(matches!(outcome, TransferOutcome::Written { chunks_written: 1, .. }));

        let expected = format!("h:{}", hash32_hex(b"hello"));
        let written = h.dest.get("shared/note1").await.unwrap().unwrap();
        assert_eq!(written.children, Some(vec![expected.clone()]));
        assert!(written.rev.as_deref().unwrap().starts_with("1-"));
        assert_eq!(h.dest.chunk(&expected).unwrap().data, "hello");
    }

    #[tokio::test]
    async fn test_second_transfer_is_noop() {
        let h = Harness::plain();
        let doc = h.seed("private/note1", &[("c1", "hello"), ("c2", "world")]).await;

        assert!(h.engine.transfer(&h.request(&doc)).await);
        let writes = h.dest.chunk_writes();
        let puts = h.dest.put_attempts();

        let outcome = h.engine.try_transfer(&h.request(&doc)).await.unwrap();
        assert_eq!(outcome, TransferOutcome::Converged { chunks_written: 0 });
        assert_eq!(h.dest.chunk_writes(), writes);
        assert_eq!(h.dest.put_attempts(), puts);
    }

    #[tokio::test]
    async fn test_encrypt_into_keyed_destination() {
        let h = Harness::new("", "shared-key", TransferConfig::default());
        let doc = h.seed("private/note1", &[("c1", "hello")]).await;

        assert!(h.engine.transfer(&h.request(&doc)).await);

        let written = h.dest.get("shared/note1").await.unwrap().unwrap();
        let chunk_id = &written.children.unwrap()[0];
        assert!(chunk_id.starts_with("h:+"));
        assert_eq!(chunk_id, &ChunkIdScheme::for_passphrase(&h.encrypt_key).chunk_id("hello"));

        let stored = h.dest.chunk(chunk_id).unwrap();
        assert_ne!(stored.data, "hello");
        assert_eq!(h.encrypt_key.decrypt(&stored.data).unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_decrypt_from_keyed_source() {
        let h = Harness::new("private-key", "", TransferConfig::default());
        let doc = h.seed("private/note1", &[("h:+abc", "hello")]).await;

        assert!(h.engine.transfer(&h.request(&doc)).await);

        let expected = format!("h:{}", hash32_hex(b"hello"));
        assert_eq!(h.dest.chunk(&expected).unwrap().data, "hello");
    }

    #[tokio::test]
    async fn test_deleted_without_destination_is_skipped() {
        let h = Harness::plain();
        let doc = Document::new("private/gone").deleted();

        let outcome = h.engine.try_transfer(&h.request(&doc)).await.unwrap();
        assert_eq!(outcome, TransferOutcome::AlreadyDeleted);
        assert_eq!(h.dest.put_attempts(), 0);
        assert_eq!(h.dest.chunk_writes(), 0);
    }

    #[tokio::test]
    async fn test_deletion_is_relayed_to_existing_destination() {
        let h = Harness::plain();
        let doc = h.seed("private/note1", &[("c1", "hello")]).await;
        assert!(h.engine.transfer(&h.request(&doc)).await);

        let mut deleted = doc.clone();
        deleted.deleted = true;
        assert!(h.engine.transfer(&h.request(&deleted)).await);

        assert!(h.dest.get("shared/note1").await.unwrap().is_none());
        assert!(h.dest.raw_document("shared/note1").unwrap().deleted);
    }

    #[tokio::test]
    async fn test_missing_children_is_malformed() {
        let h = Harness::plain();
        let mut doc = Document::new("private/odd");
        doc.children = None;

        let err = h.engine.try_transfer(&h.request(&doc)).await.unwrap_err();
        assert!(matches!(err, TransferError::MalformedDocument(_)));
    }

    #[tokio::test]
    async fn test_missing_chunk_drops_event() {
        let h = Harness::plain();
        let doc = Document::new("private/note1").with_children(["c1", "absent"]);
        h.source.insert_chunk(Chunk::new("c1", "hello"));

        let err = h.engine.try_transfer(&h.request(&doc)).await.unwrap_err();
        match err {
            TransferError::MissingChunks { missing, .. } => assert_eq!(missing, vec!["absent"]),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(h.dest.put_attempts(), 0);
    }

    #[tokio::test]
    async fn test_chunk_write_failure_is_not_retried() {
        let h = Harness::plain();
        let doc = h.seed("private/note1", &[("c1", "hello")]).await;
        h.dest.fail_chunk_writes(true);

        let err = h.engine.try_transfer(&h.request(&doc)).await.unwrap_err();
        assert!(matches!(err, TransferError::ChunkWrite(_)));
        assert_eq!(h.dest.put_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destination_read_error_is_not_retried() {
        let h = Harness::plain();
        let doc = h.seed("private/note1", &[("c1", "hello")]).await;
        h.dest.fail_gets(true);

        let started = tokio::time::Instant::now();
        let err = h.engine.try_transfer(&h.request(&doc)).await.unwrap_err();
        assert!(matches!(err, TransferError::Fetch(_)));
        assert_eq!(h.dest.put_attempts(), 0);
        assert_eq!(h.dest.chunk_writes(), 0);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_document_write_error_is_not_retried() {
        let h = Harness::plain();
        let doc = h.seed("private/note1", &[("c1", "hello")]).await;
        h.dest.fail_puts(true);

        let started = tokio::time::Instant::now();
        let err = h.engine.try_transfer(&h.request(&doc)).await.unwrap_err();
        assert!(matches!(err, TransferError::DocumentWrite(_)));
        assert_eq!(h.dest.put_attempts(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(!h.engine.transfer(&h.request(&doc)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflict_retries_then_succeeds() {
        let h = Harness::plain();
        let doc = h.seed("private/note1", &[("c1", "hello")]).await;
        h.dest.inject_put_conflicts(2);

        let started = tokio::time::Instant::now();
        assert!(h.engine.transfer(&h.request(&doc)).await);
        assert_eq!(h.dest.put_attempts(), 3);
        assert!(started.elapsed() >= Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflict_retry_budget() {
        let config = TransferConfig {
            max_attempts: 3,
            retry_delay: Duration::from_millis(1500),
        };
        let h = Harness::new("", "", config);
        let doc = h.seed("private/note1", &[("c1", "hello")]).await;
        h.dest.inject_put_conflicts(usize::MAX);

        let started = tokio::time::Instant::now();
        let err = h.engine.try_transfer(&h.request(&doc)).await.unwrap_err();
        assert!(matches!(err, TransferError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(h.dest.put_attempts(), 3);
        assert!(started.elapsed() >= Duration::from_millis(3000));
        assert!(started.elapsed() < Duration::from_millis(4500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_undecryptable_chunk_exhausts_retries() {
        let config = TransferConfig {
            max_attempts: 2,
            retry_delay: Duration::from_millis(10),
        };
        let h = Harness::new("private-key", "", config);
        h.source.insert_chunk(Chunk::new("c1", "not ciphertext"));
        let doc = Document::new("private/note1").with_children(["c1"]);

        let err = h.engine.try_transfer(&h.request(&doc)).await.unwrap_err();
        match err {
            TransferError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(last.contains("c1"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(h.dest.chunk_writes(), 0);
        assert_eq!(h.dest.put_attempts(), 0);
    }

    #[tokio::test]
    async fn test_own_write_is_suppressed_in_reverse() {
        let h = Harness::plain();
        let doc = h.seed("private/note1", &[("c1", "hello")]).await;

        let (id, rev) = match h.engine.try_transfer(&h.request(&doc)).await.unwrap() {
            TransferOutcome::Written { id, rev, .. } => (id, rev),
            other => panic!("unexpected {other:?}"),
        };

        let echo = h.dest.get(&id).await.unwrap().unwrap();
        assert_eq!(echo.rev.as_deref(), Some(rev.as_str()));

        let puts = h.source.put_attempts();
        let reverse = TransferRequest {
            pair: "pair",
            direction: Direction::SharedToPrivate,
            source: &h.dest,
            source_doc: &echo,
            source_prefix: "shared/",
            dest: &h.source,
            dest_prefix: "private/",
            decrypt_key: &h.encrypt_key,
            encrypt_key: &h.decrypt_key,
        };
        let outcome = h.engine.try_transfer(&reverse).await.unwrap();
        assert_eq!(outcome, TransferOutcome::Suppressed);
        assert_eq!(h.source.put_attempts(), puts);
    }

    #[tokio::test]
    async fn test_identical_content_shares_chunk() {
        let h = Harness::new("", "k", TransferConfig::default());
        let a = h.seed("private/a", &[("c1", "same text")]).await;
        let b = h.seed("private/b", &[("c2", "same text")]).await;

        assert!(h.engine.transfer(&h.request(&a)).await);
        let first = h.dest.get("shared/a").await.unwrap().unwrap().children.unwrap();

        let outcome = h.engine.try_transfer(&h.request(&b)).await.unwrap();
        let second = h.dest.get("shared/b").await.unwrap().unwrap().children.unwrap();

        assert_eq!(first, second);
        assert!(matches!(outcome, TransferOutcome::Written { chunks_written: 0, .. }));
        assert_eq!(h.dest.chunk_count(), 1);
    }
}
