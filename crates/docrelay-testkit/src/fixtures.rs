//! Test fixtures and helpers.
//!
//! Common setup code for relay tests: two memory stores wired into a pair.

use std::sync::Arc;
use std::time::Duration;

use docrelay_core::{Chunk, ChunkIdScheme, Document, Passphrase};
use docrelay_store::{DocStore, MemoryStore, PutResult};
use docrelay_sync::{Side, SyncPair};

/// Which store of the fixture to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vault {
    Private,
    Shared,
}

/// A private and a shared memory store with their prefixes and passphrases.
pub struct RelayFixture {
    pub private: Arc<MemoryStore>,
    pub shared: Arc<MemoryStore>,
    pub private_prefix: String,
    pub shared_prefix: String,
    pub private_key: Passphrase,
    pub shared_key: Passphrase,
}

impl RelayFixture {
    /// Plaintext on both sides, prefixes `private/` and `shared/`.
    pub fn new() -> Self {
        Self::with_keys("", "")
    }

    /// Use the given passphrases; empty means plaintext.
    pub fn with_keys(private_key: &str, shared_key: &str) -> Self {
        Self {
            private: Arc::new(MemoryStore::new("private")),
            shared: Arc::new(MemoryStore::new("shared")),
            private_prefix: "private/".into(),
            shared_prefix: "shared/".into(),
            private_key: Passphrase::new(private_key),
            shared_key: Passphrase::new(shared_key),
        }
    }

    /// Replace both prefixes.
    pub fn prefixes(mut self, private: &str, shared: &str) -> Self {
        self.private_prefix = private.into();
        self.shared_prefix = shared.into();
        self
    }

    pub fn store(&self, vault: Vault) -> &Arc<MemoryStore> {
        match vault {
            Vault::Private => &self.private,
            Vault::Shared => &self.shared,
        }
    }

    pub fn key(&self, vault: Vault) -> &Passphrase {
        match vault {
            Vault::Private => &self.private_key,
            Vault::Shared => &self.shared_key,
        }
    }

    /// A runtime pair over the fixture's stores.
    pub fn pair(&self, key: &str) -> SyncPair {
        let private: Arc<dyn DocStore> = self.private.clone();
        let shared: Arc<dyn DocStore> = self.shared.clone();
        SyncPair::new(
            key,
            Side::new(private, self.private_prefix.clone(), self.private_key.clone()),
            Side::new(shared, self.shared_prefix.clone(), self.shared_key.clone()),
        )
    }

    /// Write a note made of `pieces` the way an editor client would: one
    /// content-addressed chunk per piece, encrypted with the vault's key.
    ///
    /// Creates the note or updates its current revision. Returns the stored
    /// document.
    pub async fn write_note(&self, vault: Vault, id: &str, pieces: &[&str]) -> Document {
        let store = self.store(vault);
        let key = self.key(vault);
        let scheme = ChunkIdScheme::for_passphrase(key);

        let mut children = Vec::with_capacity(pieces.len());
        for piece in pieces {
            let chunk_id = scheme.chunk_id(piece);
            let data = if key.is_empty() {
                piece.to_string()
            } else {
                key.encrypt(piece).expect("encrypt test chunk")
            };
            store.insert_chunk(Chunk::new(chunk_id.clone(), data));
            children.push(chunk_id);
        }

        let mut doc = Document::new(id).with_children(children).with_mtime(now_millis());
        doc.rev = store.raw_document(id).and_then(|d| d.rev);
        match store.put(&doc).await.expect("put test note") {
            PutResult::Written { .. } => {}
            PutResult::Conflict => panic!("conflict writing test note {id}"),
        }
        store.raw_document(id).expect("note just written")
    }

    /// Delete a note, keeping its chunk list.
    pub async fn delete_note(&self, vault: Vault, id: &str) -> Document {
        let store = self.store(vault);
        let mut doc = store.get(id).await.expect("get test note").expect("note exists");
        doc.deleted = true;
        match store.put(&doc).await.expect("put test note") {
            PutResult::Written { .. } => {}
            PutResult::Conflict => panic!("conflict deleting test note {id}"),
        }
        store.raw_document(id).expect("note just deleted")
    }

    /// The decrypted pieces of a live note, or `None` if it is absent or
    /// deleted.
    pub async fn read_note(&self, vault: Vault, id: &str) -> Option<Vec<String>> {
        let store = self.store(vault);
        let key = self.key(vault);
        let doc = store.get(id).await.expect("get test note")?;
        let mut pieces = Vec::new();
        for chunk_id in doc.children.unwrap_or_default() {
            let chunk = store.chunk(&chunk_id).expect("chunk present");
            let piece = if key.is_empty() {
                chunk.data
            } else {
                key.decrypt(&chunk.data).expect("decrypt test chunk")
            };
            pieces.push(piece);
        }
        Some(pieces)
    }

    /// Poll until `id` reads back as `expected` (`None` for absent) or time
    /// runs out.
    pub async fn wait_for_note(&self, vault: Vault, id: &str, expected: Option<&[&str]>) -> bool {
        let expected: Option<Vec<String>> = expected.map(|p| p.iter().map(|s| s.to_string()).collect());
        for _ in 0..300 {
            if self.read_note(vault, id).await == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

impl Default for RelayFixture {
    fn default() -> Self {
        Self::new()
    }
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
