//! Process supervisor: owns the shared sync state and runs every pair.

use std::path::PathBuf;
use std::sync::Arc;

use docrelay_core::Passphrase;
use docrelay_store::{CouchConfig, CouchStore, DocStore};
use docrelay_sync::{
    CursorPolicy, CursorStore, PairScheduler, Side, SyncContext, SyncPair, TransferConfig,
    TransferEngine,
};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::{RelayConfig, SideConfig};
use crate::error::{RelayError, Result};

/// Process-level settings.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Cursor file.
    pub state_path: PathBuf,
    /// Record a failed pair and keep the others running instead of stopping.
    pub keep_going: bool,
    pub transfer: TransferConfig,
    pub cursors: CursorPolicy,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("./dat/stat.json"),
            keep_going: false,
            transfer: TransferConfig::default(),
            cursors: CursorPolicy::default(),
        }
    }
}

/// A pair whose subscription ended with an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedPair {
    pub pair: String,
    pub reason: String,
}

/// How a supervised run ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub failed: Vec<FailedPair>,
}

/// Runs one [`PairScheduler`] per configured pair.
pub struct Supervisor {
    pairs: Vec<Arc<SyncPair>>,
    settings: RelaySettings,
    engine: Arc<TransferEngine>,
    cursors: Arc<CursorStore>,
}

impl Supervisor {
    /// Build a supervisor over already-constructed pairs.
    pub fn new(pairs: Vec<SyncPair>, settings: RelaySettings) -> Self {
        let engine = Arc::new(TransferEngine::new(
            Arc::new(SyncContext::new()),
            settings.transfer.clone(),
        ));
        let cursors = CursorStore::load(
            &settings.state_path,
            pairs.iter().map(|p| p.key.as_str()),
            settings.cursors.clone(),
        );

        Self {
            pairs: pairs.into_iter().map(Arc::new).collect(),
            settings,
            engine,
            cursors,
        }
    }

    /// Build a supervisor with an HTTP store client per configured side.
    pub fn from_config(config: &RelayConfig, settings: RelaySettings) -> Result<Self> {
        let mut pairs = Vec::with_capacity(config.pairs.len());
        for (key, pair) in &config.pairs {
            pairs.push(SyncPair::new(
                key.clone(),
                couch_side(&pair.private)?,
                couch_side(&pair.shared)?,
            ));
        }
        Ok(Self::new(pairs, settings))
    }

    pub fn pairs(&self) -> &[Arc<SyncPair>] {
        &self.pairs
    }

    pub fn cursors(&self) -> &Arc<CursorStore> {
        &self.cursors
    }

    /// Log what every store reports about itself.
    ///
    /// Failures are logged only; an unreachable store surfaces again as a
    /// feed failure once the pair starts.
    pub async fn sanity_check(&self) {
        for pair in &self.pairs {
            for (name, side) in [("private", &pair.private), ("shared", &pair.shared)] {
                match side.store.info().await {
                    Ok(info) => info!(
                        pair = %pair.key,
                        side = name,
                        db = %info.db_name,
                        docs = info.doc_count,
                        update_seq = %info.update_seq,
                        "store reachable"
                    ),
                    Err(e) => warn!(pair = %pair.key, side = name, error = %e, "store check failed"),
                }
            }
        }
    }

    /// Run every pair until it fails.
    ///
    /// Without `keep_going` the first failure stops all pairs and is
    /// returned. With it, failures are collected and the summary is returned
    /// once no pair is left running. Cursors are flushed either way.
    pub async fn run(&self) -> Result<RunSummary> {
        let mut tasks = JoinSet::new();
        for pair in &self.pairs {
            let scheduler = PairScheduler::new(
                Arc::clone(pair),
                Arc::clone(&self.engine),
                Arc::clone(&self.cursors),
            );
            tasks.spawn(async move {
                let result = scheduler.run().await;
                (scheduler.pair().key.clone(), result)
            });
        }
        info!(pairs = self.pairs.len(), "relay started");

        let mut summary = RunSummary::default();
        while let Some(joined) = tasks.join_next().await {
            let failure = match joined {
                Ok((_, Ok(()))) => continue,
                Ok((pair, Err(e))) => {
                    error!(pair = %pair, error = %e, "pair stopped");
                    if !self.settings.keep_going {
                        tasks.abort_all();
                        self.flush_cursors().await;
                        return Err(RelayError::Sync(e));
                    }
                    FailedPair {
                        pair,
                        reason: e.to_string(),
                    }
                }
                Err(e) if e.is_cancelled() => continue,
                Err(e) => {
                    error!(error = %e, "pair task panicked");
                    let failure = FailedPair {
                        pair: "<unknown>".into(),
                        reason: e.to_string(),
                    };
                    if !self.settings.keep_going {
                        tasks.abort_all();
                        self.flush_cursors().await;
                        return Err(RelayError::PairFailed {
                            pair: failure.pair,
                            reason: failure.reason,
                        });
                    }
                    failure
                }
            };
            summary.failed.push(failure);
        }

        self.flush_cursors().await;
        Ok(summary)
    }

    /// Persist cursors now. Failures are logged.
    pub async fn flush_cursors(&self) {
        match self.cursors.flush().await {
            Ok(()) => info!(path = %self.cursors.path().display(), "sync cursors saved"),
            Err(e) => warn!(path = %self.cursors.path().display(), error = %e, "could not save sync cursors"),
        }
    }
}

fn couch_side(config: &SideConfig) -> Result<Side> {
    let store = CouchStore::new(CouchConfig::new(
        config.uri.clone(),
        config.auth.username.clone(),
        config.auth.password.clone(),
    ))?;
    let store: Arc<dyn DocStore> = Arc::new(store);
    Ok(Side::new(
        store,
        config.path.clone(),
        Passphrase::new(config.auth.passphrase.clone()),
    ))
}
