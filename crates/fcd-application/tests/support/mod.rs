//! Shared fixtures for lifecycle and search integration tests

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use fcd_application::lifecycle::{EngineDeps, FolderHandle, FolderSettings, LifecycleEvent};
use fcd_application::pool::{EmbeddingPool, PoolLimits};
use fcd_domain::entities::{ExecutionBackend, FolderStatus};
use fcd_domain::error::Result;
use fcd_domain::ids::FolderId;
use fcd_domain::ports::{
    EmbeddingProvider, EmbeddingProviderFactory, FolderStore, StoreFactory,
};
use fcd_domain::registry::ModelDescriptor;
use fcd_providers::embed::HashEmbeddingProvider;
use fcd_providers::extract::CompositeExtractor;
use fcd_providers::scan::WalkScanner;
use fcd_providers::store::SqliteStoreFactory;
use fcd_providers::watch::NotifyChangeWatcher;
use fcd_providers::{FrequencySemanticExtractor, ParagraphChunker};

/// Hash-provider factory honoring each model's registry dims
pub struct HashFactory;

impl EmbeddingProviderFactory for HashFactory {
    fn create(&self, model: &ModelDescriptor) -> Result<Arc<dyn EmbeddingProvider>> {
        Ok(Arc::new(HashEmbeddingProvider::new(model.id, model.dims)))
    }
}

/// Hash-provider factory with an artificial per-batch delay, for tests
/// that need to observe a run mid-flight
pub struct SlowHashFactory {
    pub delay: Duration,
}

struct SlowProvider {
    inner: HashEmbeddingProvider,
    delay: Duration,
}

#[async_trait]
impl EmbeddingProvider for SlowProvider {
    async fn ensure_ready(&self) -> Result<()> {
        self.inner.ensure_ready().await
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        tokio::time::sleep(self.delay).await;
        self.inner.embed(texts).await
    }
    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
    fn active_backend(&self) -> ExecutionBackend {
        self.inner.active_backend()
    }
    fn is_cached(&self) -> bool {
        true
    }
}

impl EmbeddingProviderFactory for SlowHashFactory {
    fn create(&self, model: &ModelDescriptor) -> Result<Arc<dyn EmbeddingProvider>> {
        Ok(Arc::new(SlowProvider {
            inner: HashEmbeddingProvider::new(model.id, model.dims),
            delay: self.delay,
        }))
    }
}

/// Provider that fails every embed call (search fallback tests)
pub struct FailingProvider;

#[async_trait]
impl EmbeddingProvider for FailingProvider {
    async fn ensure_ready(&self) -> Result<()> {
        Ok(())
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(fcd_domain::Error::inference("synthetic inference failure"))
    }
    fn dimensions(&self) -> usize {
        384
    }
    fn model_id(&self) -> &str {
        "failing"
    }
    fn active_backend(&self) -> ExecutionBackend {
        ExecutionBackend::Cpu
    }
    fn is_cached(&self) -> bool {
        true
    }
}

/// Store factory that simulates an environment failure until "repaired"
pub struct EnvFailingFactory {
    inner: SqliteStoreFactory,
    broken: AtomicBool,
    pub attempts: AtomicUsize,
}

impl EnvFailingFactory {
    pub fn new() -> Self {
        Self {
            inner: SqliteStoreFactory::new(),
            broken: AtomicBool::new(true),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn repair(&self) {
        self.broken.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl StoreFactory for EnvFailingFactory {
    async fn open(
        &self,
        folder: &FolderId,
        expected_schema: i32,
    ) -> Result<Arc<dyn FolderStore>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.broken.load(Ordering::SeqCst) {
            return Err(fcd_domain::Error::database(
                "dlopen failed: cannot open shared object file libonnxruntime.so.1",
            ));
        }
        self.inner.open(folder, expected_schema).await
    }
}

/// Engine dependency bundle with a small chunk target so short fixtures
/// still produce several chunks
pub fn test_deps(store_factory: Arc<dyn StoreFactory>) -> Arc<EngineDeps> {
    test_deps_with_provider(store_factory, Arc::new(HashFactory))
}

/// Same bundle with a custom embedding factory
pub fn test_deps_with_provider(
    store_factory: Arc<dyn StoreFactory>,
    provider_factory: Arc<dyn EmbeddingProviderFactory>,
) -> Arc<EngineDeps> {
    test_deps_full(
        store_factory,
        provider_factory,
        Arc::new(FrequencySemanticExtractor::new()),
    )
}

/// Fully parameterized bundle
pub fn test_deps_full(
    store_factory: Arc<dyn StoreFactory>,
    provider_factory: Arc<dyn EmbeddingProviderFactory>,
    semantic: Arc<dyn fcd_domain::ports::SemanticExtractor>,
) -> Arc<EngineDeps> {
    let extractor = Arc::new(CompositeExtractor::with_defaults());
    Arc::new(EngineDeps {
        store_factory,
        scanner: Arc::new(WalkScanner::new(Arc::clone(&extractor) as _, 1024 * 1024)),
        watcher: Arc::new(NotifyChangeWatcher::new(Duration::from_millis(150))),
        extractor: Arc::clone(&extractor) as _,
        chunker: Arc::new(ParagraphChunker::new(64, 8)),
        semantic,
        provider_factory,
        pool: Arc::new(EmbeddingPool::start(&PoolLimits {
            workers: 2,
            queue_capacity: 32,
            folder_inflight_fraction: 1.0,
        })),
    })
}

/// Primary extractor that always reports no phrases; exercises the
/// frequency fallback path end to end
pub struct EmptyPhraseExtractor {
    fallback: FrequencySemanticExtractor,
}

impl EmptyPhraseExtractor {
    pub fn new() -> Self {
        Self {
            fallback: FrequencySemanticExtractor::new(),
        }
    }
}

impl fcd_domain::ports::SemanticExtractor for EmptyPhraseExtractor {
    fn extract(&self, _text: &str) -> Result<fcd_domain::entities::SemanticMetadata> {
        Ok(fcd_domain::entities::SemanticMetadata {
            key_phrases: Vec::new(),
            topics: Vec::new(),
            readability: 0.4,
        })
    }

    fn fallback_phrases(&self, text: &str) -> Vec<String> {
        self.fallback.fallback_phrases(text)
    }
}

pub fn settings(model: &str) -> FolderSettings {
    FolderSettings {
        model_id: model.to_owned(),
        expected_schema: fcd_domain::constants::store::LATEST_SCHEMA_VERSION,
        max_batch_chunks: 8,
        max_batch_bytes: 64 * 1024,
        priority: 10,
    }
}

pub fn folder_id(path: &Path) -> FolderId {
    FolderId::from_canonical(&std::fs::canonicalize(path).expect("canonicalize"))
}

/// Poll a handle until it reaches `target` (panics after the timeout)
pub async fn wait_for_status(handle: &FolderHandle, target: FolderStatus, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let (status, error) = handle.status();
        if status == target {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "folder never reached {target}; stuck at {status} (error: {error:?})"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

/// Drain lifecycle events without blocking the engine
pub fn spawn_event_sink() -> (
    tokio::sync::mpsc::UnboundedSender<LifecycleEvent>,
    Arc<std::sync::Mutex<Vec<LifecycleEvent>>>,
) {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let log = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Ok(mut guard) = sink.lock() {
                guard.push(event);
            }
        }
    });
    (tx, log)
}

/// Words fixture: `n` distinct words of filler prose
pub fn prose(words: usize) -> String {
    const VOCAB: &[&str] = &[
        "ledger", "harbor", "signal", "quartz", "meadow", "copper", "lantern", "orchard",
        "timber", "anchor", "cinder", "willow", "granite", "saffron", "ember", "marble",
    ];
    let mut out = String::new();
    for i in 0..words {
        out.push_str(VOCAB[i % VOCAB.len()]);
        if i % 13 == 12 {
            out.push_str(".\n\n");
        } else {
            out.push(' ');
        }
    }
    out
}
