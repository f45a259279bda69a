//! Deterministic hash embedder
//!
//! Unit vectors derived from a sha256 stream over the input text. No
//! semantic content, but stable across runs and platforms, which is what
//! the lifecycle, store and search tests need. Also selectable through
//! `embedding.provider = "hash"` for fully offline operation.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use fcd_domain::entities::ExecutionBackend;
use fcd_domain::error::Result;
use fcd_domain::ports::EmbeddingProvider;

/// Deterministic offline embedding provider
pub struct HashEmbeddingProvider {
    model_id: String,
    dims: usize,
}

impl HashEmbeddingProvider {
    /// Provider reporting `model_id` and producing `dims`-length vectors
    #[must_use]
    pub fn new(model_id: &str, dims: usize) -> Self {
        Self {
            model_id: model_id.to_owned(),
            dims,
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.dims);
        let mut counter = 0u32;
        while out.len() < self.dims {
            let mut hasher = Sha256::new();
            hasher.update(counter.to_le_bytes());
            hasher.update(text.as_bytes());
            let digest = hasher.finalize();
            for pair in digest.chunks_exact(2) {
                if out.len() == self.dims {
                    break;
                }
                let raw = i16::from_le_bytes([pair[0], pair[1]]);
                out.push(f32::from(raw) / f32::from(i16::MAX));
            }
            counter += 1;
        }
        let norm = out.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut out {
                *v /= norm;
            }
        }
        out
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn ensure_ready(&self) -> Result<()> {
        Ok(())
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn active_backend(&self) -> ExecutionBackend {
        ExecutionBackend::Cpu
    }

    fn is_cached(&self) -> bool {
        true
    }
}
