//! fastembed model runner
//!
//! # Overview
//! Maps curated registry models onto fastembed's ONNX models, keeps the
//! model files in a content-addressed hf-hub cache, and creates the
//! inference session by walking the selector's backend list: first
//! backend that produces a session wins, CPU is the guaranteed last
//! resort. Download failures are reported as retryable; a backend that
//! fails session creation is skipped and not retried.
//!
//! GPU execution providers are compiled in only under the `cuda`,
//! `coreml` and `directml` cargo features; without them every non-CPU
//! backend fails its lightweight probe and the walk ends on CPU.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::{info, warn};

use fcd_domain::Error;
use fcd_domain::entities::{BackendConfig, ExecutionBackend};
use fcd_domain::error::Result;
use fcd_domain::ports::{BackendSelector, CapabilityProbe, EmbeddingProvider};
use fcd_domain::registry::ModelDescriptor;

/// Internal inference batch size
const EMBED_BATCH: usize = 32;

fn runtime_model(id: &str) -> Option<EmbeddingModel> {
    match id {
        "all-minilm-l6-v2" => Some(EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Some(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Some(EmbeddingModel::BGEBaseENV15),
        "multilingual-e5-small" => Some(EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-large" => Some(EmbeddingModel::MultilingualE5Large),
        "mxbai-embed-large-v1" => Some(EmbeddingModel::MxbaiEmbedLargeV1),
        _ => None,
    }
}

fn is_download_failure(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["download", "request", "connect", "network", "http", "hf-hub", "timed out"]
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Real local inference through fastembed
pub struct FastembedProvider {
    descriptor: ModelDescriptor,
    runtime: EmbeddingModel,
    cache_dir: PathBuf,
    probe: Arc<dyn CapabilityProbe>,
    selector: Arc<dyn BackendSelector>,
    session: Arc<Mutex<Option<TextEmbedding>>>,
    active: Mutex<ExecutionBackend>,
}

impl FastembedProvider {
    /// Build a provider for a curated model.
    ///
    /// # Errors
    ///
    /// `Config` when the model id has no fastembed mapping.
    pub fn new(
        descriptor: &ModelDescriptor,
        cache_dir: PathBuf,
        probe: Arc<dyn CapabilityProbe>,
        selector: Arc<dyn BackendSelector>,
    ) -> Result<Self> {
        let runtime = runtime_model(descriptor.id).ok_or_else(|| {
            Error::config(format!("model '{}' has no runtime mapping", descriptor.id))
        })?;
        Ok(Self {
            descriptor: descriptor.clone(),
            runtime,
            cache_dir,
            probe,
            selector,
            session: Arc::new(Mutex::new(None)),
            active: Mutex::new(ExecutionBackend::Cpu),
        })
    }

    fn cache_marker(&self) -> Option<PathBuf> {
        let info = TextEmbedding::list_supported_models()
            .into_iter()
            .find(|m| m.model == self.runtime)?;
        Some(
            self.cache_dir
                .join(format!("models--{}", info.model_code.replace('/', "--"))),
        )
    }

    fn create_session(
        runtime: &EmbeddingModel,
        cache_dir: &Path,
        max_length: usize,
        backend: ExecutionBackend,
        config: &BackendConfig,
    ) -> Result<TextEmbedding> {
        let mut options = InitOptions::new(runtime.clone())
            .with_cache_dir(cache_dir.to_path_buf())
            .with_show_download_progress(false)
            .with_max_length(max_length);

        if backend != ExecutionBackend::Cpu {
            options = apply_gpu_backend(options, backend, config)?;
        }

        TextEmbedding::try_new(options).map_err(|e| {
            let message = e.to_string();
            if is_download_failure(&message) {
                Error::model_download(message)
            } else {
                Error::embedding(format!("session creation on {backend} failed: {message}"))
            }
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FastembedProvider {
    async fn ensure_ready(&self) -> Result<()> {
        if self
            .session
            .lock()
            .map_err(|_| Error::internal("session lock poisoned"))?
            .is_some()
        {
            return Ok(());
        }

        let profile = self.probe.profile().await;
        let backends = self.selector.select(&profile, &self.descriptor);

        let runtime = self.runtime.clone();
        let cache_dir = self.cache_dir.clone();
        let max_length = self.descriptor.max_sequence;
        let model_id = self.descriptor.id.to_owned();

        let outcome = tokio::task::spawn_blocking(move || {
            for (backend, config) in backends {
                match Self::create_session(&runtime, &cache_dir, max_length, backend, &config) {
                    Ok(session) => return Ok((session, backend)),
                    Err(e @ Error::ModelDownload { .. }) => {
                        // Network failure is not a backend property; bail
                        // out so the caller can retry with backoff
                        return Err(e);
                    }
                    Err(e) => {
                        warn!(model = %model_id, backend = %backend, error = %e, "backend unavailable");
                    }
                }
            }
            Err(Error::AllBackendsFailed { model: model_id })
        })
        .await
        .map_err(|e| Error::internal(format!("model load task panicked: {e}")))??;

        let (session, backend) = outcome;
        if let Ok(mut guard) = self.session.lock() {
            *guard = Some(session);
        }
        if let Ok(mut active) = self.active.lock() {
            *active = backend;
        }
        info!(model = self.descriptor.id, backend = %backend, "embedding session ready");
        Ok(())
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.ensure_ready().await?;

        let session = Arc::clone(&self.session);
        let owned: Vec<String> = texts.to_vec();
        let dims = self.descriptor.dims;

        let vectors = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
            let mut guard = session
                .lock()
                .map_err(|_| Error::internal("session lock poisoned"))?;
            let model = guard
                .as_mut()
                .ok_or_else(|| Error::embedding("session vanished before inference"))?;
            model
                .embed(owned, Some(EMBED_BATCH))
                .map_err(|e| Error::inference(e.to_string()))
        })
        .await
        .map_err(|e| Error::internal(format!("inference task panicked: {e}")))??;

        if vectors.len() != texts.len() {
            return Err(Error::inference(format!(
                "expected {} vectors, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        let mut out = Vec::with_capacity(vectors.len());
        for mut vector in vectors {
            if vector.len() != dims {
                return Err(Error::inference(format!(
                    "model produced {} dims, registry declares {dims}",
                    vector.len()
                )));
            }
            let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm > 0.0 {
                for v in &mut vector {
                    *v /= norm;
                }
            }
            out.push(vector);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.descriptor.dims
    }

    fn model_id(&self) -> &str {
        self.descriptor.id
    }

    fn active_backend(&self) -> ExecutionBackend {
        self.active
            .lock()
            .map(|b| *b)
            .unwrap_or(ExecutionBackend::Cpu)
    }

    fn is_cached(&self) -> bool {
        self.cache_marker().is_some_and(|marker| marker.is_dir())
    }
}

/// Attach the execution provider for a GPU backend. Each provider family
/// is compiled in only under its cargo feature; an unselected feature
/// makes the backend fail its lightweight probe here, which the caller
/// treats as "unavailable", not an error.
fn apply_gpu_backend(
    options: InitOptions,
    backend: ExecutionBackend,
    config: &BackendConfig,
) -> Result<InitOptions> {
    #[cfg(feature = "cuda")]
    if backend == ExecutionBackend::NvidiaCuda {
        use ort::execution_providers::CUDAExecutionProvider;
        let mut provider = CUDAExecutionProvider::default().with_device_id(config.device_id as i32);
        if let Some(budget_mb) = config.vram_budget_mb {
            provider = provider.with_memory_limit((budget_mb * 1024 * 1024) as usize);
        }
        return Ok(options.with_execution_providers(vec![provider.build()]));
    }

    #[cfg(feature = "coreml")]
    if backend == ExecutionBackend::AppleCoreMl {
        use ort::execution_providers::CoreMLExecutionProvider;
        return Ok(options.with_execution_providers(vec![CoreMLExecutionProvider::default().build()]));
    }

    #[cfg(feature = "directml")]
    if backend == ExecutionBackend::DirectMlCompute {
        use ort::execution_providers::DirectMLExecutionProvider;
        return Ok(options.with_execution_providers(vec![
            DirectMLExecutionProvider::default()
                .with_device_id(config.device_id as i32)
                .build(),
        ]));
    }

    let _ = (&options, config);
    Err(Error::embedding(format!(
        "{backend} support not compiled into this build"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fcd_domain::registry;

    #[test]
    fn every_curated_model_has_a_runtime_mapping() {
        for model in registry::all() {
            assert!(
                runtime_model(model.id).is_some(),
                "no fastembed mapping for {}",
                model.id
            );
        }
    }

    #[test]
    fn download_failures_are_recognized() {
        assert!(is_download_failure("request to huggingface failed"));
        assert!(is_download_failure("Connection reset during download"));
        assert!(!is_download_failure("invalid model graph"));
    }

    #[test]
    fn gpu_backends_unavailable_without_features() {
        #[cfg(not(any(feature = "cuda", feature = "coreml", feature = "directml")))]
        {
            let config = BackendConfig::cpu(4);
            let options = InitOptions::new(EmbeddingModel::AllMiniLML6V2);
            let err = apply_gpu_backend(options, ExecutionBackend::NvidiaCuda, &config)
                .expect_err("cuda must be unavailable");
            assert!(err.to_string().contains("not compiled"));
        }
    }
}
