//! End-to-end relay tests over memory stores.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use docrelay::core::{hash32_hex, Chunk, Direction, Document, Passphrase};
use docrelay::store::DocStore;
use docrelay::sync::{
    SyncContext, SyncError, TransferConfig, TransferEngine, TransferOutcome, TransferRequest,
};
use docrelay::{RelayError, RelaySettings, Supervisor};
use docrelay_testkit::{passphrase, plain_note, RelayFixture, Vault};
use proptest::prelude::*;
use tempfile::TempDir;
use tokio::task::JoinHandle;

fn settings(state: &Path) -> RelaySettings {
    RelaySettings {
        state_path: state.to_path_buf(),
        ..RelaySettings::default()
    }
}

/// Start the supervisor and give every feed time to subscribe.
async fn start(supervisor: &Arc<Supervisor>) -> JoinHandle<docrelay::Result<docrelay::RunSummary>> {
    let running = Arc::clone(supervisor);
    let handle = tokio::spawn(async move { running.run().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle
}

#[tokio::test]
async fn test_new_note_creates_plain_destination() {
    let fixture = RelayFixture::new();
    fixture.private.insert_chunk(Chunk::new("c1", "hello"));
    let doc = Document::new("private/note1").with_children(["c1"]);

    let engine = TransferEngine::new(Arc::new(SyncContext::new()), TransferConfig::default());
    let empty = Passphrase::default();
    let request = TransferRequest {
        pair: "p",
        direction: Direction::PrivateToShared,
        source: &*fixture.private,
        source_doc: &doc,
        source_prefix: "private/",
        dest: &*fixture.shared,
        dest_prefix: "shared/",
        decrypt_key: &empty,
        encrypt_key: &empty,
    };
    let outcome = engine.try_transfer(&request).await.unwrap();

    let expected = format!("h:{}", hash32_hex(b"hello"));
    match outcome {
        TransferOutcome::Written { id, rev, chunks_written } => {
            assert_eq!(id, "shared/note1");
            assert!(rev.starts_with("1-"));
            assert_eq!(chunks_written, 1);
        }
        other => panic!("unexpected {other:?}"),
    }
    let written = fixture.shared.get("shared/note1").await.unwrap().unwrap();
    assert_eq!(written.children, Some(vec![expected.clone()]));
    assert_eq!(fixture.shared.chunk(&expected).unwrap().data, "hello");
}

#[tokio::test]
async fn test_relays_both_ways_across_keys() {
    let dir = TempDir::new().unwrap();
    let fixture = RelayFixture::with_keys("private-key", "shared-key");
    let supervisor = Arc::new(Supervisor::new(
        vec![fixture.pair("classroom")],
        settings(&dir.path().join("stat.json")),
    ));
    let handle = start(&supervisor).await;

    fixture
        .write_note(Vault::Private, "private/lesson.md", &["intro", "body"])
        .await;
    assert!(
        fixture
            .wait_for_note(Vault::Shared, "shared/lesson.md", Some(&["intro", "body"]))
            .await
    );

    fixture
        .write_note(Vault::Shared, "shared/answer.md", &["42"])
        .await;
    assert!(
        fixture
            .wait_for_note(Vault::Private, "private/answer.md", Some(&["42"]))
            .await
    );

    // Each side holds its own ciphertext.
    let shared_doc = fixture.shared.get("shared/lesson.md").await.unwrap().unwrap();
    let stored = fixture.shared.chunk(&shared_doc.children.unwrap()[0]).unwrap();
    assert!(Passphrase::new("private-key").decrypt(&stored.data).is_err());

    handle.abort();
}

#[tokio::test]
async fn test_own_writes_are_not_echoed() {
    let dir = TempDir::new().unwrap();
    let fixture = RelayFixture::new();
    let supervisor = Arc::new(Supervisor::new(
        vec![fixture.pair("classroom")],
        settings(&dir.path().join("stat.json")),
    ));
    let handle = start(&supervisor).await;

    fixture.write_note(Vault::Private, "private/a.md", &["x"]).await;
    assert!(fixture.wait_for_note(Vault::Shared, "shared/a.md", Some(&["x"])).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(fixture.private.put_attempts(), 1);
    assert_eq!(fixture.shared.put_attempts(), 1);
    assert_eq!(
        supervisor.cursors().position("classroom", Direction::SharedToPrivate),
        "1"
    );

    handle.abort();
}

#[tokio::test]
async fn test_deletion_and_prefix_isolation() {
    let dir = TempDir::new().unwrap();
    let fixture = RelayFixture::new().prefixes("class/", "");
    let supervisor = Arc::new(Supervisor::new(
        vec![fixture.pair("classroom")],
        settings(&dir.path().join("stat.json")),
    ));
    let handle = start(&supervisor).await;

    fixture.write_note(Vault::Private, "diary/secret.md", &["mine"]).await;
    fixture.write_note(Vault::Private, "class/notes.md", &["ours"]).await;
    assert!(fixture.wait_for_note(Vault::Shared, "notes.md", Some(&["ours"])).await);
    assert!(fixture.shared.raw_document("secret.md").is_none());
    assert!(fixture.shared.raw_document("diary/secret.md").is_none());

    fixture.delete_note(Vault::Private, "class/notes.md").await;
    assert!(fixture.wait_for_note(Vault::Shared, "notes.md", None).await);
    assert!(fixture.shared.raw_document("notes.md").unwrap().deleted);

    handle.abort();
}

#[tokio::test]
async fn test_restart_resumes_from_saved_cursor() {
    let dir = TempDir::new().unwrap();
    let state = dir.path().join("stat.json");
    let fixture = RelayFixture::new();

    let first = Arc::new(Supervisor::new(vec![fixture.pair("classroom")], settings(&state)));
    let handle = start(&first).await;
    fixture.write_note(Vault::Private, "private/a.md", &["1"]).await;
    assert!(fixture.wait_for_note(Vault::Shared, "shared/a.md", Some(&["1"])).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    first.flush_cursors().await;
    handle.abort();
    let _ = handle.await;

    // Written while the relay is down.
    fixture.write_note(Vault::Private, "private/b.md", &["2"]).await;

    let second = Arc::new(Supervisor::new(vec![fixture.pair("classroom")], settings(&state)));
    assert_eq!(
        second.cursors().position("classroom", Direction::PrivateToShared),
        "1"
    );
    let handle = start(&second).await;
    assert!(fixture.wait_for_note(Vault::Shared, "shared/b.md", Some(&["2"])).await);
    handle.abort();
}

fn bogus_cursors(state: &Path, pairs: &[&str]) {
    let body: serde_json::Map<String, serde_json::Value> = pairs
        .iter()
        .map(|p| {
            (
                p.to_string(),
                serde_json::json!({"private_to_shared": "bogus", "shared_to_private": "bogus"}),
            )
        })
        .collect();
    std::fs::write(state, serde_json::Value::Object(body).to_string()).unwrap();
}

#[tokio::test]
async fn test_feed_failure_stops_relay_by_default() {
    let dir = TempDir::new().unwrap();
    let state = dir.path().join("stat.json");
    bogus_cursors(&state, &["broken"]);

    let healthy = RelayFixture::new();
    let broken = RelayFixture::new();
    let supervisor = Supervisor::new(
        vec![healthy.pair("healthy"), broken.pair("broken")],
        settings(&state),
    );

    let err = tokio::time::timeout(Duration::from_secs(5), supervisor.run())
        .await
        .expect("relay should stop")
        .unwrap_err();
    match err {
        RelayError::Sync(SyncError::Feed { pair, .. }) => assert_eq!(pair, "broken"),
        other => panic!("unexpected {other:?}"),
    }

    // Cursors were flushed on the way out, the healthy pair included.
    let saved: serde_json::Value = serde_json::from_slice(&std::fs::read(&state).unwrap()).unwrap();
    assert_eq!(saved["healthy"]["private_to_shared"], "now");
}

#[tokio::test]
async fn test_keep_going_records_failed_pairs() {
    let dir = TempDir::new().unwrap();
    let state = dir.path().join("stat.json");
    bogus_cursors(&state, &["a", "b"]);

    let a = RelayFixture::new();
    let b = RelayFixture::new();
    let supervisor = Supervisor::new(
        vec![a.pair("a"), b.pair("b")],
        RelaySettings {
            keep_going: true,
            ..settings(&state)
        },
    );

    let summary = tokio::time::timeout(Duration::from_secs(5), supervisor.run())
        .await
        .expect("every pair fails")
        .unwrap();
    let mut failed: Vec<&str> = summary.failed.iter().map(|f| f.pair.as_str()).collect();
    failed.sort();
    assert_eq!(failed, vec!["a", "b"]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_relay_preserves_content_across_keys((doc, chunks) in plain_note("private/"), key in passphrase()) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let fixture = RelayFixture::with_keys("", &key);
            for chunk in &chunks {
                fixture.private.insert_chunk(chunk.clone());
            }
            let engine = TransferEngine::new(Arc::new(SyncContext::new()), TransferConfig::default());
            let request = TransferRequest {
                pair: "p",
                direction: Direction::PrivateToShared,
                source: &*fixture.private,
                source_doc: &doc,
                source_prefix: "private/",
                dest: &*fixture.shared,
                dest_prefix: "shared/",
                decrypt_key: &fixture.private_key,
                encrypt_key: &fixture.shared_key,
            };
            assert!(engine.transfer(&request).await);

            let dest_id = doc.id.replacen("private/", "shared/", 1);
            let expected: Vec<String> = chunks.iter().map(|c| c.data.clone()).collect();
            assert_eq!(fixture.read_note(Vault::Shared, &dest_id).await, Some(expected));

            // A second pass finds nothing to do.
            let writes = fixture.shared.chunk_writes();
            assert!(matches!(
                engine.try_transfer(&request).await.unwrap(),
                TransferOutcome::Converged { chunks_written: 0 }
            ));
            assert_eq!(fixture.shared.chunk_writes(), writes);
        });
    }
}
