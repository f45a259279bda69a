//! Hybrid store invariants
//!
//! Covers the consistency contract: chunk/vector bijection, empty
//! key-phrase rejection, per-file transactional writes, cascade deletes,
//! exclusive locking, schema refusal, and the distinction between an
//! authoritative zero and an unavailable store.

use std::path::Path;
use std::sync::Arc;

use fcd_domain::Error;
use fcd_domain::constants::store::LATEST_SCHEMA_VERSION;
use fcd_domain::entities::{ChunkDraft, FileRecord, FileState, Fingerprint, SemanticMetadata};
use fcd_domain::ids::FolderId;
use fcd_domain::ports::{FolderStore, ProcessedFile, StoreFactory};
use fcd_providers::store::SqliteStoreFactory;

fn folder_id(path: &Path) -> FolderId {
    FolderId::from_canonical(&std::fs::canonicalize(path).expect("canonicalize"))
}

async fn open(path: &Path) -> Arc<dyn FolderStore> {
    SqliteStoreFactory::new()
        .open(&folder_id(path), LATEST_SCHEMA_VERSION)
        .await
        .expect("open store")
}

fn unit_vector(dims: usize, seed: u32) -> Vec<f32> {
    let mut v: Vec<f32> = (0..dims)
        .map(|i| ((i as f32 + seed as f32).sin()))
        .collect();
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    for x in &mut v {
        *x /= norm;
    }
    v
}

fn semantic(phrases: &[&str]) -> SemanticMetadata {
    SemanticMetadata {
        key_phrases: phrases.iter().map(|p| (*p).to_owned()).collect(),
        topics: vec!["topic".to_owned()],
        readability: 0.5,
    }
}

fn processed(rel_path: &str, chunk_texts: &[&str], dims: usize) -> ProcessedFile {
    let chunks = chunk_texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            (
                ChunkDraft {
                    chunk_index: i as u32,
                    start_offset: i * 100,
                    end_offset: i * 100 + text.len(),
                    token_estimate: 10,
                    text: (*text).to_owned(),
                },
                semantic(&["alpha phrase", "beta"]),
            )
        })
        .collect::<Vec<_>>();
    let vectors = (0..chunk_texts.len())
        .map(|i| unit_vector(dims, i as u32 + rel_path.len() as u32))
        .collect();
    ProcessedFile {
        rel_path: rel_path.to_owned(),
        fingerprint: Fingerprint(format!("sha256:{rel_path}")),
        size: 100,
        text: chunk_texts.join("\n\n"),
        pages: Vec::new(),
        language_hint: None,
        chunks,
        vectors,
        model_id: "all-minilm-l6-v2".to_owned(),
    }
}

async fn seed_file(store: &Arc<dyn FolderStore>, rel_path: &str) {
    store
        .upsert_file(&FileRecord {
            rel_path: rel_path.to_owned(),
            fingerprint: Fingerprint(format!("sha256:{rel_path}")),
            size: 100,
            discovered_at: chrono::Utc::now(),
            last_processed_at: None,
            state: FileState::Pending,
            failure: None,
        })
        .await
        .expect("seed file");
}

#[tokio::test(flavor = "multi_thread")]
async fn chunks_and_vectors_stay_bijective() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open(dir.path()).await;

    for name in ["a.txt", "b.txt"] {
        seed_file(&store, name).await;
        store
            .write_processed(&processed(name, &["one chunk", "two chunk", "three"], 8))
            .await
            .expect("write");
    }

    assert_eq!(store.embedding_count().await.expect("count"), 6);
    assert_eq!(store.document_count().await.expect("docs"), 2);
    assert_eq!(store.vector_dims().await.expect("dims"), Some(8));

    // Every ANN hit resolves back to a stored chunk
    let hits = store.ann_search(&unit_vector(8, 1), 6).await.expect("search");
    assert!(!hits.is_empty());
    for hit in hits {
        let chunk = store.chunk(hit.key).await.expect("chunk resolves");
        assert_eq!(chunk.key, hit.key);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_key_phrases_are_rejected_at_the_write() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open(dir.path()).await;
    seed_file(&store, "a.txt").await;

    let mut outcome = processed("a.txt", &["text"], 8);
    outcome.chunks[0].1.key_phrases.clear();

    let err = store
        .write_processed(&outcome)
        .await
        .expect_err("empty phrases must be rejected");
    assert!(err.to_string().contains("key-phrase"));

    // The rejected write must not leave partial state
    assert_eq!(store.embedding_count().await.expect("count"), 0);
    assert_eq!(store.document_count().await.expect("docs"), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn chunk_vector_count_mismatch_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open(dir.path()).await;
    seed_file(&store, "a.txt").await;

    let mut outcome = processed("a.txt", &["one", "two"], 8);
    outcome.vectors.pop();
    assert!(store.write_processed(&outcome).await.is_err());
    assert_eq!(store.embedding_count().await.expect("count"), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn removing_a_file_cascades_to_chunks_and_vectors() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open(dir.path()).await;
    seed_file(&store, "a.txt").await;
    seed_file(&store, "b.txt").await;
    store
        .write_processed(&processed("a.txt", &["aaa", "bbb"], 8))
        .await
        .expect("write a");
    store
        .write_processed(&processed("b.txt", &["ccc"], 8))
        .await
        .expect("write b");

    store.remove_file("a.txt").await.expect("remove");

    assert_eq!(store.embedding_count().await.expect("count"), 1);
    assert_eq!(store.document_count().await.expect("docs"), 1);
    let hits = store.ann_search(&unit_vector(8, 0), 8).await.expect("search");
    for hit in hits {
        let chunk = store.chunk(hit.key).await.expect("chunk");
        assert_eq!(chunk.text, "ccc");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn reprocessing_replaces_chunks_atomically() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open(dir.path()).await;
    seed_file(&store, "a.txt").await;
    store
        .write_processed(&processed("a.txt", &["old one", "old two", "old three"], 8))
        .await
        .expect("first write");

    store
        .write_processed(&processed("a.txt", &["new only"], 8))
        .await
        .expect("second write");

    assert_eq!(store.embedding_count().await.expect("count"), 1);
    let document = store.document_by_path("a.txt").await.expect("document");
    let chunks = store
        .chunks_for_document(document.id, None)
        .await
        .expect("chunks");
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "new only");
}

#[tokio::test(flavor = "multi_thread")]
async fn rename_preserves_chunks_without_rewriting() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open(dir.path()).await;
    seed_file(&store, "old.txt").await;
    store
        .write_processed(&processed("old.txt", &["stable content"], 8))
        .await
        .expect("write");

    store.rename_file("old.txt", "new.txt").await.expect("rename");

    assert_eq!(store.embedding_count().await.expect("count"), 1);
    let document = store.document_by_path("new.txt").await.expect("document follows rename");
    assert_eq!(document.rel_path, "new.txt");
    assert!(store.document_by_path("old.txt").await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn second_opener_sees_already_open() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open(dir.path()).await;

    let second = SqliteStoreFactory::new()
        .open(&folder_id(dir.path()), LATEST_SCHEMA_VERSION)
        .await;
    assert!(matches!(second, Err(Error::AlreadyOpen { .. })));

    // Closing releases the lock for the next opener
    store.close().await.expect("close");
    let third = SqliteStoreFactory::new()
        .open(&folder_id(dir.path()), LATEST_SCHEMA_VERSION)
        .await;
    assert!(third.is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn closed_store_answers_not_open_instead_of_zero() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open(dir.path()).await;
    seed_file(&store, "a.txt").await;
    store
        .write_processed(&processed("a.txt", &["content"], 8))
        .await
        .expect("write");

    // Open store, zero rows elsewhere: authoritative zero is fine
    assert_eq!(store.embedding_count().await.expect("count"), 1);

    store.close().await.expect("close");
    let err = store
        .embedding_count()
        .await
        .expect_err("closed store must not answer zero");
    assert!(matches!(err, Error::StoreNotOpen { .. }));
    assert!(err.is_transient(), "not-open must be retryable");
}

#[tokio::test(flavor = "multi_thread")]
async fn newer_schema_is_refused() {
    let dir = tempfile::tempdir().expect("tempdir");
    // Create at the latest version, then pretend the binary only knows v1
    let store = open(dir.path()).await;
    store.close().await.expect("close");

    let outcome = SqliteStoreFactory::new()
        .open(&folder_id(dir.path()), 1)
        .await;
    match outcome {
        Err(Error::SchemaMismatch { stored, expected }) => {
            assert_eq!(stored, LATEST_SCHEMA_VERSION);
            assert_eq!(expected, 1);
        }
        other => panic!("expected SchemaMismatch, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn corrupted_file_reports_corruption_and_is_preserved() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data_dir = dir.path().join(".fcd");
    std::fs::create_dir_all(&data_dir).expect("mkdir");
    let db_path = data_dir.join("index.db");
    std::fs::write(&db_path, b"garbage that is not a sqlite file at all").expect("write");

    let outcome = SqliteStoreFactory::new()
        .open(&folder_id(dir.path()), LATEST_SCHEMA_VERSION)
        .await;
    assert!(
        matches!(outcome, Err(Error::Corruption { .. })),
        "damaged file must classify as corruption: {outcome:?}"
    );
    // The factory itself never renames; that is recovery policy
    assert!(db_path.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn ann_graph_is_rebuilt_from_sqlite_on_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open(dir.path()).await;
    store.set_model_id("all-minilm-l6-v2").await.expect("model");
    seed_file(&store, "a.txt").await;
    store
        .write_processed(&processed("a.txt", &["persistent vector"], 8))
        .await
        .expect("write");
    store.close().await.expect("close");

    let reopened = open(dir.path()).await;
    let hits = reopened
        .ann_search(&unit_vector(8, "a.txt".len() as u32), 1)
        .await
        .expect("search");
    assert_eq!(hits.len(), 1);
    let chunk = reopened.chunk(hits[0].key).await.expect("chunk");
    assert_eq!(chunk.text, "persistent vector");
}

#[tokio::test(flavor = "multi_thread")]
async fn list_documents_paginates_with_cursor() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open(dir.path()).await;
    for i in 0..5 {
        let name = format!("doc{i}.txt");
        seed_file(&store, &name).await;
        store
            .write_processed(&processed(&name, &["text"], 8))
            .await
            .expect("write");
    }

    let first = store.list_documents(None, None, 2).await.expect("page 1");
    assert_eq!(first.documents.len(), 2);
    let cursor = first.next_cursor.expect("more pages");

    let second = store
        .list_documents(None, Some(&cursor), 2)
        .await
        .expect("page 2");
    assert_eq!(second.documents.len(), 2);
    assert!(second.documents[0].id > first.documents[1].id);

    let third = store
        .list_documents(None, second.next_cursor.as_deref(), 2)
        .await
        .expect("page 3");
    assert_eq!(third.documents.len(), 1);
    assert!(third.next_cursor.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn mixed_dimensionality_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open(dir.path()).await;
    seed_file(&store, "a.txt").await;
    store
        .write_processed(&processed("a.txt", &["eight dims"], 8))
        .await
        .expect("write");

    seed_file(&store, "b.txt").await;
    let err = store
        .write_processed(&processed("b.txt", &["sixteen dims"], 16))
        .await
        .expect_err("dimensionality change without model swap must fail");
    assert!(err.to_string().contains("dims"));
}
