//! Orchestrator behavior: FMDM publication, progress monotonicity,
//! folder registry persistence, add/remove round trips

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fcd_application::lifecycle::EngineDeps;
use fcd_application::pool::{EmbeddingPool, PoolLimits};
use fcd_application::search::{SearchEngine, SearchParams, SearchRequest};
use fcd_domain::entities::FolderStatus;
use fcd_domain::error::Result;
use fcd_domain::ports::{CapabilityProbe, EmbeddingProvider, EmbeddingProviderFactory};
use fcd_domain::registry::ModelDescriptor;
use fcd_infrastructure::probe::SysinfoProbe;
use fcd_providers::embed::HashEmbeddingProvider;
use fcd_providers::extract::CompositeExtractor;
use fcd_providers::scan::WalkScanner;
use fcd_providers::store::SqliteStoreFactory;
use fcd_providers::watch::NotifyChangeWatcher;
use fcd_providers::{FrequencySemanticExtractor, ParagraphChunker};
use fcd_server::orchestrator::Orchestrator;
use fcd_server::registry_file;

const WAIT: Duration = Duration::from_secs(30);

struct HashFactory;

impl EmbeddingProviderFactory for HashFactory {
    fn create(&self, model: &ModelDescriptor) -> Result<Arc<dyn EmbeddingProvider>> {
        Ok(Arc::new(HashEmbeddingProvider::new(model.id, model.dims)))
    }
}

fn orchestrator(registry_path: &Path) -> Arc<Orchestrator> {
    let extractor = Arc::new(CompositeExtractor::with_defaults());
    let pool = Arc::new(EmbeddingPool::start(&PoolLimits {
        workers: 2,
        queue_capacity: 32,
        folder_inflight_fraction: 1.0,
    }));
    let deps = Arc::new(EngineDeps {
        store_factory: Arc::new(SqliteStoreFactory::new()),
        scanner: Arc::new(WalkScanner::new(Arc::clone(&extractor) as _, 1024 * 1024)),
        watcher: Arc::new(NotifyChangeWatcher::new(Duration::from_millis(150))),
        extractor: Arc::clone(&extractor) as _,
        chunker: Arc::new(ParagraphChunker::new(64, 8)),
        semantic: Arc::new(FrequencySemanticExtractor::new()),
        provider_factory: Arc::new(HashFactory),
        pool: Arc::clone(&pool),
    });
    Orchestrator::new(
        deps,
        pool,
        Arc::new(SysinfoProbe::new()) as Arc<dyn CapabilityProbe>,
        SearchEngine::new(SearchParams::default()),
        fcd_domain::constants::store::LATEST_SCHEMA_VERSION,
        8,
        64 * 1024,
        registry_path.to_path_buf(),
    )
}

fn fill_corpus(dir: &Path, files: usize) {
    for i in 0..files {
        let text: String = (0..60)
            .map(|w| format!("signal{} quartz{} harbor ", w, i))
            .collect();
        std::fs::write(dir.join(format!("doc{i}.txt")), text).expect("write");
    }
}

async fn wait_until_active(orchestrator: &Arc<Orchestrator>, path: &Path) {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        if let Some((status, error, _)) = orchestrator.folder_status(path) {
            if status == FolderStatus::Active {
                return;
            }
            assert!(
                status != FolderStatus::Error,
                "folder errored unexpectedly: {error:?}"
            );
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "folder never became active"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn add_folder_indexes_and_persists_registry() {
    let corpus = tempfile::tempdir().expect("tempdir");
    let state = tempfile::tempdir().expect("tempdir");
    fill_corpus(corpus.path(), 3);

    let registry_path = state.path().join("folders.json");
    let orchestrator = orchestrator(&registry_path);

    orchestrator
        .add_folder(corpus.path(), None)
        .await
        .expect("add");
    wait_until_active(&orchestrator, corpus.path()).await;

    let registry = registry_file::load(&registry_path).expect("registry");
    assert_eq!(registry.folders.len(), 1);
    assert_eq!(registry.folders[0].model, "all-minilm-l6-v2");

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.folders.len(), 1);
    assert_eq!(snapshot.folders[0].status, FolderStatus::Active);

    orchestrator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_add_is_rejected() {
    let corpus = tempfile::tempdir().expect("tempdir");
    let state = tempfile::tempdir().expect("tempdir");
    fill_corpus(corpus.path(), 1);

    let orchestrator = orchestrator(&state.path().join("folders.json"));
    orchestrator.add_folder(corpus.path(), None).await.expect("add");
    let err = orchestrator
        .add_folder(corpus.path(), None)
        .await
        .expect_err("duplicate must fail");
    assert!(err.to_string().contains("already configured"));
    orchestrator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn progress_counters_are_monotone_within_a_generation() {
    let corpus = tempfile::tempdir().expect("tempdir");
    let state = tempfile::tempdir().expect("tempdir");
    fill_corpus(corpus.path(), 8);

    let orchestrator = orchestrator(&state.path().join("folders.json"));
    let mut updates = orchestrator.subscribe();

    orchestrator.add_folder(corpus.path(), None).await.expect("add");

    let mut last: std::collections::HashMap<u64, (u64, u64)> = std::collections::HashMap::new();
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let snapshot = tokio::select! {
            update = updates.recv() => match update {
                Ok(snapshot) => snapshot,
                Err(_) => continue,
            },
            () = tokio::time::sleep_until(deadline) => panic!("never reached active"),
        };
        let Some(view) = snapshot.folders.first() else { continue };

        let entry = last.entry(view.generation.0).or_insert((0, 0));
        assert!(
            view.progress.files_done >= entry.0,
            "files_done regressed within generation {}",
            view.generation
        );
        assert!(
            view.progress.chunks_done >= entry.1,
            "chunks_done regressed within generation {}",
            view.generation
        );
        assert!(view.progress.files_done <= view.progress.files_total);
        *entry = (view.progress.files_done, view.progress.chunks_done);

        if view.status == FolderStatus::Active {
            break;
        }
    }
    orchestrator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn remove_folder_drops_it_from_snapshot_and_registry() {
    let corpus = tempfile::tempdir().expect("tempdir");
    let state = tempfile::tempdir().expect("tempdir");
    fill_corpus(corpus.path(), 2);

    let registry_path = state.path().join("folders.json");
    let orchestrator = orchestrator(&registry_path);
    orchestrator.add_folder(corpus.path(), None).await.expect("add");
    wait_until_active(&orchestrator, corpus.path()).await;

    orchestrator
        .remove_folder(corpus.path())
        .await
        .expect("remove");

    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        if orchestrator.snapshot().folders.is_empty() {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "folder never left the snapshot");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert!(registry_file::load(&registry_path).expect("registry").folders.is_empty());

    // The store lock must be released so the folder can be re-added
    orchestrator.add_folder(corpus.path(), None).await.expect("re-add");
    wait_until_active(&orchestrator, corpus.path()).await;
    orchestrator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn search_spans_all_folders_when_no_folder_given() {
    let corpus_a = tempfile::tempdir().expect("tempdir");
    let corpus_b = tempfile::tempdir().expect("tempdir");
    let state = tempfile::tempdir().expect("tempdir");
    std::fs::write(corpus_a.path().join("a.txt"), "emerald archive ledger entry one")
        .expect("write");
    std::fs::write(corpus_b.path().join("b.txt"), "emerald archive ledger entry two")
        .expect("write");

    let orchestrator = orchestrator(&state.path().join("folders.json"));
    orchestrator.add_folder(corpus_a.path(), None).await.expect("add a");
    orchestrator.add_folder(corpus_b.path(), None).await.expect("add b");
    wait_until_active(&orchestrator, corpus_a.path()).await;
    wait_until_active(&orchestrator, corpus_b.path()).await;

    let response = orchestrator
        .search(
            None,
            &SearchRequest {
                query: "emerald archive".to_owned(),
                ..SearchRequest::default()
            },
        )
        .await
        .expect("search");

    let paths: std::collections::HashSet<&str> =
        response.hits.iter().map(|h| h.path.as_str()).collect();
    assert!(paths.contains("a.txt") && paths.contains("b.txt"));
    orchestrator.shutdown().await;
}
