//! Control-surface HTTP round trips against a live router

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use fcd_application::lifecycle::EngineDeps;
use fcd_application::pool::{EmbeddingPool, PoolLimits};
use fcd_application::search::{SearchEngine, SearchParams};
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
use fcd_server::control::{ControlState, router};
use fcd_server::orchestrator::Orchestrator;

struct HashFactory;

impl EmbeddingProviderFactory for HashFactory {
    fn create(&self, model: &ModelDescriptor) -> Result<Arc<dyn EmbeddingProvider>> {
        Ok(Arc::new(HashEmbeddingProvider::new(model.id, model.dims)))
    }
}

struct Harness {
    base: String,
    orchestrator: Arc<Orchestrator>,
    shutdown: CancellationToken,
    _state_dir: tempfile::TempDir,
}

async fn start_harness() -> Harness {
    let state_dir = tempfile::tempdir().expect("tempdir");
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
    let orchestrator = Orchestrator::new(
        deps,
        pool,
        Arc::new(SysinfoProbe::new()) as Arc<dyn CapabilityProbe>,
        SearchEngine::new(SearchParams::default()),
        fcd_domain::constants::store::LATEST_SCHEMA_VERSION,
        8,
        64 * 1024,
        state_dir.path().join("folders.json"),
    );

    let shutdown = CancellationToken::new();
    let state = Arc::new(ControlState {
        orchestrator: Arc::clone(&orchestrator),
        shutdown: shutdown.clone(),
        model_cache_dir: state_dir.path().join("models"),
        expected_schema: fcd_domain::constants::store::LATEST_SCHEMA_VERSION,
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = router(state);
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await;
    });

    Harness {
        base: format!("http://{addr}"),
        orchestrator,
        shutdown,
        _state_dir: state_dir,
    }
}

async fn wait_active(harness: &Harness, path: &Path) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    loop {
        if let Some((status, _, _)) = harness.orchestrator.folder_status(path)
            && status == fcd_domain::entities::FolderStatus::Active
        {
            return;
        }
        assert!(tokio::time::Instant::now() < deadline, "folder never became active");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn add_list_and_diagnostics_round_trip() {
    let corpus = tempfile::tempdir().expect("tempdir");
    std::fs::write(corpus.path().join("a.txt"), "quartz ledger harbor entry").expect("write");

    let harness = start_harness().await;
    let client = reqwest::Client::new();

    // folders.add
    let response = client
        .post(format!("{}/api/folders/add", harness.base))
        .json(&serde_json::json!({ "path": corpus.path().display().to_string() }))
        .send()
        .await
        .expect("add request");
    assert!(response.status().is_success());
    wait_active(&harness, corpus.path()).await;

    // fmdm snapshot
    let snapshot: serde_json::Value = client
        .get(format!("{}/api/fmdm", harness.base))
        .send()
        .await
        .expect("fmdm request")
        .json()
        .await
        .expect("fmdm json");
    let folders = snapshot["folders"].as_array().expect("folders array");
    assert_eq!(folders.len(), 1);
    assert_eq!(folders[0]["status"], "active");

    // diagnostics.get
    let diagnostics: serde_json::Value = client
        .get(format!("{}/api/diagnostics", harness.base))
        .send()
        .await
        .expect("diagnostics request")
        .json()
        .await
        .expect("diagnostics json");
    assert!(diagnostics["hardware"]["cpu_cores"].as_u64().is_some_and(|c| c >= 1));
    assert_eq!(diagnostics["folders"].as_array().map(Vec::len), Some(1));

    harness.orchestrator.shutdown().await;
    harness.shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn bad_add_reports_client_error() {
    let harness = start_harness().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/folders/add", harness.base))
        .json(&serde_json::json!({ "path": "/definitely/not/a/real/dir" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["ok"], false);

    harness.shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_endpoint_cancels_the_daemon_token() {
    let harness = start_harness().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/shutdown", harness.base))
        .send()
        .await
        .expect("request");
    assert!(response.status().is_success());
    tokio::time::timeout(Duration::from_secs(5), harness.shutdown.cancelled())
        .await
        .expect("token must cancel");
}
