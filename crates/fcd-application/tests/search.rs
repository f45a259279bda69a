//! Search engine behavior over a real indexed folder

mod support;

use std::sync::Arc;
use std::time::Duration;

use fcd_application::search::{SearchEngine, SearchParams, SearchRequest};
use fcd_domain::constants::store::LATEST_SCHEMA_VERSION;
use fcd_domain::entities::FolderStatus;
use fcd_domain::ports::{EmbeddingProvider, StoreFactory};
use fcd_providers::embed::HashEmbeddingProvider;
use fcd_providers::store::SqliteStoreFactory;

use support::{FailingProvider, folder_id, prose, settings, spawn_event_sink, test_deps,
    wait_for_status};

const WAIT: Duration = Duration::from_secs(30);

/// Index a folder and return both the store lease and the engine handle;
/// dropping the handle would shut the engine (and the store) down.
async fn indexed_folder(
    dir: &std::path::Path,
) -> (
    fcd_application::lifecycle::FolderHandle,
    Arc<dyn fcd_domain::ports::FolderStore>,
) {
    let deps = test_deps(Arc::new(SqliteStoreFactory::new()));
    let (events, _log) = spawn_event_sink();
    let handle = fcd_application::lifecycle::spawn_folder_engine(
        folder_id(dir),
        settings("all-minilm-l6-v2"),
        deps,
        events,
    );
    wait_for_status(&handle, FolderStatus::Active, WAIT).await;
    let store = handle.read_lease().expect("lease");
    (handle, store)
}

fn hash_provider() -> Arc<dyn EmbeddingProvider> {
    Arc::new(HashEmbeddingProvider::new("all-minilm-l6-v2", 384))
}

#[tokio::test(flavor = "multi_thread")]
async fn results_never_exceed_the_chunk_budget() {
    let dir = tempfile::tempdir().expect("tempdir");
    for i in 0..6 {
        std::fs::write(dir.path().join(format!("doc{i}.txt")), prose(200)).expect("write");
    }
    let (_handle, store) = indexed_folder(dir.path()).await;

    let total = store.embedding_count().await.expect("count");
    assert!(total > 3, "fixture too small to exercise the budget");

    let engine = SearchEngine::new(SearchParams {
        chunk_budget: 3,
        ..SearchParams::default()
    });
    let response = engine
        .search(
            &store,
            &hash_provider(),
            &SearchRequest {
                query: "ledger harbor signal".to_owned(),
                top_k: Some(total as usize),
                ..SearchRequest::default()
            },
        )
        .await
        .expect("search");

    assert!(response.hits.len() <= 3);
    assert!(response.truncated, "cutting candidates must set the flag");
    assert!(!response.fallback);
    // Scores descend
    for pair in response.hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn token_budget_truncates_independently() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("a.txt"), prose(400)).expect("write");
    let (_handle, store) = indexed_folder(dir.path()).await;

    let engine = SearchEngine::new(SearchParams {
        chunk_budget: 100,
        token_budget: 100,
        ..SearchParams::default()
    });
    let response = engine
        .search(
            &store,
            &hash_provider(),
            &SearchRequest {
                query: "copper lantern".to_owned(),
                ..SearchRequest::default()
            },
        )
        .await
        .expect("search");

    assert!(response.truncated);
    assert!(
        response.hits.len() <= 1,
        "a 100-token budget fits at most one ~64-token-target chunk"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn embedding_failure_degrades_to_marked_substring_fallback() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        dir.path().join("notes.txt"),
        format!("{}\nthe xylophone incident\n\n{}", prose(30), prose(30)),
    )
    .expect("write");
    let (_handle, store) = indexed_folder(dir.path()).await;

    let engine = SearchEngine::new(SearchParams::default());
    let response = engine
        .search(
            &store,
            &(Arc::new(FailingProvider) as Arc<dyn EmbeddingProvider>),
            &SearchRequest {
                query: "xylophone".to_owned(),
                ..SearchRequest::default()
            },
        )
        .await
        .expect("fallback must not error");

    assert!(response.fallback, "fallback flag missing");
    assert!(
        response.reason.as_deref().is_some_and(|r| r.contains("embedding failed")),
        "reason must say why: {:?}",
        response.reason
    );
    assert!(!response.hits.is_empty(), "substring match expected");
    assert!(response.hits[0].text.contains("xylophone"));
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_index_returns_diagnostic_reason() {
    let dir = tempfile::tempdir().expect("tempdir");
    let factory = SqliteStoreFactory::new();
    let store = factory
        .open(&folder_id(dir.path()), LATEST_SCHEMA_VERSION)
        .await
        .expect("open");

    let engine = SearchEngine::new(SearchParams::default());
    let response = engine
        .search(
            &store,
            &hash_provider(),
            &SearchRequest {
                query: "anything".to_owned(),
                ..SearchRequest::default()
            },
        )
        .await
        .expect("search");

    assert!(response.hits.is_empty());
    assert!(
        response.reason.as_deref().is_some_and(|r| r.contains("empty")),
        "missing diagnostic reason: {:?}",
        response.reason
    );
    store.close().await.expect("close");
}

#[tokio::test(flavor = "multi_thread")]
async fn extension_filter_restricts_results() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("a.txt"), prose(60)).expect("write");
    std::fs::write(dir.path().join("b.md"), format!("# Heading\n\n{}", prose(60))).expect("write");
    let (_handle, store) = indexed_folder(dir.path()).await;

    let engine = SearchEngine::new(SearchParams::default());
    let response = engine
        .search(
            &store,
            &hash_provider(),
            &SearchRequest {
                query: "ledger harbor".to_owned(),
                extension: Some("md".to_owned()),
                ..SearchRequest::default()
            },
        )
        .await
        .expect("search");

    assert!(!response.hits.is_empty());
    assert!(response.hits.iter().all(|h| h.path.ends_with(".md")));
}
