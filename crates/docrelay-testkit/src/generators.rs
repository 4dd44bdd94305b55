//! Proptest generators for property-based testing.

use proptest::prelude::*;

use docrelay_core::{Chunk, Document};

/// A relative note path such as `notes/abc.md`.
pub fn note_path() -> impl Strategy<Value = String> {
    "[a-z]{1,8}(/[a-z0-9]{1,8}){0,2}\\.md"
}

/// Note ids under `prefix`.
pub fn note_id(prefix: &'static str) -> impl Strategy<Value = String> {
    note_path().prop_map(move |path| format!("{prefix}{path}"))
}

/// Chunk plaintext, unicode included.
pub fn chunk_text(max_len: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(any::<char>(), 0..=max_len).prop_map(|chars| chars.into_iter().collect())
}

/// A passphrase; empty means plaintext.
pub fn passphrase() -> impl Strategy<Value = String> {
    prop_oneof![Just(String::new()), "[ -~]{1,24}"]
}

/// Plaintext chunks with arbitrary ids and the note that lists them.
pub fn plain_note(prefix: &'static str) -> impl Strategy<Value = (Document, Vec<Chunk>)> {
    (note_id(prefix), prop::collection::vec(chunk_text(64), 0..6), 0i64..=i64::MAX / 2).prop_map(
        |(id, pieces, mtime)| {
            let chunks: Vec<Chunk> = pieces
                .into_iter()
                .enumerate()
                .map(|(i, text)| Chunk::new(format!("src{i}"), text))
                .collect();
            let doc = Document::new(id)
                .with_children(chunks.iter().map(|c| c.id.clone()))
                .with_mtime(mtime);
            (doc, chunks)
        },
    )
}
