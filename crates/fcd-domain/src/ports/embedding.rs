//! Embedding provider port

use std::sync::Arc;

use async_trait::async_trait;

use crate::entities::ExecutionBackend;
use crate::error::Result;
use crate::registry::ModelDescriptor;

/// A loaded (or loadable) embedding model.
///
/// Implementations are thread-safe; one instance is shared across the
/// embedding worker pool, which enforces the effective parallelism.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Ensure model files are cached and an inference session exists.
    ///
    /// Idempotent. Downloads on cache miss (resumable; partial files land
    /// in temp paths and are atomically renamed) and walks the backend
    /// list on session-creation failure.
    ///
    /// # Errors
    ///
    /// [`crate::Error::ModelDownload`] when fetching fails (retryable),
    /// [`crate::Error::AllBackendsFailed`] when no backend produced a
    /// session.
    async fn ensure_ready(&self) -> Result<()>;

    /// Embed a batch of texts. One L2-normalized vector per input, order
    /// preserved, truncated to the model's max sequence internally.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Inference`] on per-batch failure; the caller may
    /// retry once before marking the batch failed.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Declared dimensionality of produced vectors
    fn dimensions(&self) -> usize;

    /// Model id from the registry
    fn model_id(&self) -> &str;

    /// Backend the current session runs on (`Cpu` until a session exists)
    fn active_backend(&self) -> ExecutionBackend;

    /// Whether the model files are already present in the local cache.
    ///
    /// Drives the `DownloadingModel` lifecycle state: a cached model skips
    /// it entirely.
    fn is_cached(&self) -> bool;
}

/// Creates providers for registry models.
///
/// Creation is cheap and never performs I/O; the expensive work happens in
/// [`EmbeddingProvider::ensure_ready`].
pub trait EmbeddingProviderFactory: Send + Sync {
    /// Build a provider for the given curated model.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Config`] when the model cannot be mapped onto the
    /// runtime.
    fn create(&self, model: &ModelDescriptor) -> Result<Arc<dyn EmbeddingProvider>>;
}
