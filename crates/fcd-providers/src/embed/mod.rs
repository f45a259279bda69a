//! Embedding providers
//!
//! The fastembed runner does real local inference with backend fallback;
//! the hash provider produces deterministic unit vectors for tests and
//! offline runs. Both sit behind the [`EmbeddingProvider`] port and are
//! created through [`DefaultEmbeddingFactory`].

mod fastembed_provider;
mod hash;

use std::path::PathBuf;
use std::sync::Arc;

use fcd_domain::error::Result;
use fcd_domain::ports::{BackendSelector, CapabilityProbe, EmbeddingProvider,
    EmbeddingProviderFactory};
use fcd_domain::registry::ModelDescriptor;

pub use fastembed_provider::FastembedProvider;
pub use hash::HashEmbeddingProvider;

/// Which provider family the factory builds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProviderKind {
    /// Real ONNX inference through fastembed
    Fastembed,
    /// Deterministic hash vectors (offline / tests)
    Hash,
}

impl EmbeddingProviderKind {
    /// Parse the config string form
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "fastembed" => Some(Self::Fastembed),
            "hash" => Some(Self::Hash),
            _ => None,
        }
    }
}

/// Factory wiring probe + selector + cache dir into providers
pub struct DefaultEmbeddingFactory {
    kind: EmbeddingProviderKind,
    cache_dir: PathBuf,
    probe: Arc<dyn CapabilityProbe>,
    selector: Arc<dyn BackendSelector>,
}

impl DefaultEmbeddingFactory {
    /// Construct the factory
    #[must_use]
    pub fn new(
        kind: EmbeddingProviderKind,
        cache_dir: PathBuf,
        probe: Arc<dyn CapabilityProbe>,
        selector: Arc<dyn BackendSelector>,
    ) -> Self {
        Self {
            kind,
            cache_dir,
            probe,
            selector,
        }
    }
}

impl EmbeddingProviderFactory for DefaultEmbeddingFactory {
    fn create(&self, model: &ModelDescriptor) -> Result<Arc<dyn EmbeddingProvider>> {
        match self.kind {
            EmbeddingProviderKind::Fastembed => Ok(Arc::new(FastembedProvider::new(
                model,
                self.cache_dir.clone(),
                Arc::clone(&self.probe),
                Arc::clone(&self.selector),
            )?)),
            EmbeddingProviderKind::Hash => {
                Ok(Arc::new(HashEmbeddingProvider::new(model.id, model.dims)))
            }
        }
    }
}
