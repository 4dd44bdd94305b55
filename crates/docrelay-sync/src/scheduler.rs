//! Pair scheduler: drives both directions of one sync pair.

use std::sync::Arc;

use docrelay_core::{is_eligible, Direction};
use tracing::{debug, info, warn};

use crate::cursor::CursorStore;
use crate::engine::{TransferEngine, TransferRequest};
use crate::error::{Result, SyncError};
use crate::pair::SyncPair;

/// Watches both change feeds of a pair and relays admitted documents.
pub struct PairScheduler {
    pair: Arc<SyncPair>,
    engine: Arc<TransferEngine>,
    cursors: Arc<CursorStore>,
}

impl PairScheduler {
    pub fn new(pair: Arc<SyncPair>, engine: Arc<TransferEngine>, cursors: Arc<CursorStore>) -> Self {
        Self {
            pair,
            engine,
            cursors,
        }
    }

    pub fn pair(&self) -> &SyncPair {
        &self.pair
    }

    /// Whether a change on a side with `prefix` should be relayed.
    pub fn admits(id: &str, prefix: &str) -> bool {
        id.starts_with(prefix) && is_eligible(id)
    }

    /// Run both directions until one of their feeds fails.
    ///
    /// Never returns `Ok`: live feeds do not end by themselves.
    pub async fn run(&self) -> Result<()> {
        tokio::try_join!(
            self.run_direction(Direction::PrivateToShared),
            self.run_direction(Direction::SharedToPrivate),
        )?;
        Ok(())
    }

    /// Follow one direction's feed.
    pub async fn run_direction(&self, direction: Direction) -> Result<()> {
        let pair = &self.pair.key;
        let (source, dest) = self.pair.endpoints(direction);
        let since = self.cursors.position(pair, direction);

        info!(pair = %pair, %direction, since = %since, prefix = %source.prefix, "watching changes");
        let mut feed = source
            .store
            .changes(&since, &source.prefix)
            .await
            .map_err(|e| self.feed_error(direction, e))?;

        while let Some(item) = feed.next().await {
            let change = item.map_err(|e| self.feed_error(direction, e))?;
            if !Self::admits(&change.doc.id, &source.prefix) {
                debug!(pair = %pair, %direction, doc = %change.doc.id, "not admitted");
                continue;
            }

            let request = TransferRequest {
                pair,
                direction,
                source: source.store.as_ref(),
                source_doc: &change.doc,
                source_prefix: &source.prefix,
                dest: dest.store.as_ref(),
                dest_prefix: &dest.prefix,
                decrypt_key: &source.passphrase,
                encrypt_key: &dest.passphrase,
            };
            if self.engine.transfer(&request).await {
                if let Err(e) = self.cursors.advance(pair, direction, &change.position).await {
                    warn!(pair = %pair, %direction, error = %e, "could not save sync cursors");
                }
            }
        }

        Err(SyncError::FeedClosed {
            pair: pair.clone(),
            direction,
        })
    }

    fn feed_error(&self, direction: Direction, source: docrelay_store::StoreError) -> SyncError {
        SyncError::Feed {
            pair: self.pair.key.clone(),
            direction,
            source,
        }
    }
}
