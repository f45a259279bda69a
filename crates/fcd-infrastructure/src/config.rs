//! Configuration loading
//!
//! # Overview
//! `FcdConfig` is assembled from three figment layers: compiled defaults,
//! an optional TOML file, and `FCD_*` environment variables (highest
//! priority). A validation pass runs after merging so a bad value fails
//! fast at startup instead of deep inside the pipeline.
//!
//! File resolution order: explicit path → `$FCD_CONFIG` →
//! `~/.config/fcd/config.toml` → `./fcd.toml`.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use fcd_domain::constants::{indexing, search, time};
use fcd_domain::error::{Error, Result};
use fcd_domain::registry;

/// Daemon-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address of the control surface
    pub bind_addr: String,
    /// Model cache root; defaults to the platform data dir under `fcd/models`
    pub model_cache_dir: Option<PathBuf>,
    /// Daemon log file; stderr only when unset
    pub log_file: Option<PathBuf>,
    /// Default embedding model for new folders
    pub default_model: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5877".to_owned(),
            model_cache_dir: None,
            log_file: None,
            default_model: registry::default_model().id.to_owned(),
        }
    }
}

/// Indexing pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Embedding worker count
    pub workers: usize,
    /// Queue capacity in batches; producers block when full
    pub queue_capacity: usize,
    /// Batch ceiling by chunk count
    pub max_batch_chunks: usize,
    /// Batch ceiling by total text bytes
    pub max_batch_bytes: usize,
    /// Fraction of in-flight slots one folder may occupy while others
    /// have pending work
    pub folder_inflight_fraction: f32,
    /// Target chunk size in estimated tokens
    pub chunk_target_tokens: u32,
    /// Chunk overlap in estimated tokens
    pub chunk_overlap_tokens: u32,
    /// Full-content hashing budget in bytes
    pub fingerprint_budget_bytes: u64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 64,
            max_batch_chunks: indexing::MAX_BATCH_CHUNKS,
            max_batch_bytes: indexing::MAX_BATCH_BYTES,
            folder_inflight_fraction: 0.75,
            chunk_target_tokens: indexing::CHUNK_TARGET_TOKENS,
            chunk_overlap_tokens: indexing::CHUNK_OVERLAP_TOKENS,
            fingerprint_budget_bytes: indexing::FINGERPRINT_FULL_HASH_BUDGET,
        }
    }
}

/// Search and re-ranking settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// ANN candidate count before re-ranking
    pub top_k: usize,
    /// Response budget by chunk count
    pub result_chunk_budget: usize,
    /// Response budget by aggregate token estimate
    pub result_token_budget: u32,
    /// Weight of the recency factor in the composite score
    pub recency_weight: f32,
    /// Recency half-life in days
    pub recency_half_life_days: f32,
    /// Readability floor; chunks below it are slightly penalized
    pub readability_floor: f32,
    /// Soft deadline per search request, milliseconds
    pub deadline_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: search::DEFAULT_TOP_K,
            result_chunk_budget: search::DEFAULT_RESULT_CHUNK_BUDGET,
            result_token_budget: search::DEFAULT_RESULT_TOKEN_BUDGET,
            recency_weight: search::DEFAULT_RECENCY_WEIGHT,
            recency_half_life_days: search::DEFAULT_RECENCY_HALF_LIFE_DAYS,
            readability_floor: search::READABILITY_FLOOR,
            deadline_ms: time::SEARCH_DEADLINE_MS,
        }
    }
}

/// Watcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Debounce window in milliseconds
    pub debounce_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: time::WATCH_DEBOUNCE_MS,
        }
    }
}

/// Embedding runtime settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider kind: `fastembed` (default) or `hash` (deterministic,
    /// offline; used by tests)
    pub provider: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "fastembed".to_owned(),
        }
    }
}

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FcdConfig {
    /// Daemon-level settings
    pub daemon: DaemonConfig,
    /// Indexing pipeline settings
    pub indexing: IndexingConfig,
    /// Search settings
    pub search: SearchConfig,
    /// Watcher settings
    pub watcher: WatcherConfig,
    /// Embedding runtime settings
    pub embedding: EmbeddingConfig,
}

impl FcdConfig {
    /// Load configuration: defaults → TOML file → `FCD_*` env.
    ///
    /// # Errors
    ///
    /// Returns an error when a layer fails to parse or validation detects
    /// an invalid value.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = Self::resolve_config_path(explicit_path) {
            figment = figment.merge(Toml::file(path));
        }

        let config: Self = figment
            .merge(Env::prefixed("FCD_").split("__"))
            .extract()
            .map_err(|e| Error::config(format!("failed to load configuration: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Ok(env_path) = std::env::var("FCD_CONFIG") {
            return Some(PathBuf::from(env_path));
        }
        if let Some(config_dir) = dirs::config_dir() {
            let candidate = config_dir.join("fcd").join("config.toml");
            if candidate.exists() {
                return Some(candidate);
            }
        }
        let local = PathBuf::from("fcd.toml");
        local.exists().then_some(local)
    }

    /// Resolved model cache directory
    #[must_use]
    pub fn model_cache_dir(&self) -> PathBuf {
        self.daemon.model_cache_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("fcd")
                .join("models")
        })
    }

    /// Validate merged configuration values
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` naming the offending key.
    pub fn validate(&self) -> Result<()> {
        validate_daemon_config(self)?;
        validate_indexing_config(self)?;
        validate_search_config(self)?;
        Ok(())
    }
}

fn validate_daemon_config(config: &FcdConfig) -> Result<()> {
    if config.daemon.bind_addr.parse::<std::net::SocketAddr>().is_err() {
        return Err(Error::ConfigInvalid {
            key: "daemon.bind_addr".to_owned(),
            message: format!("'{}' is not a socket address", config.daemon.bind_addr),
        });
    }
    if registry::get(&config.daemon.default_model).is_none() {
        return Err(Error::ConfigInvalid {
            key: "daemon.default_model".to_owned(),
            message: format!(
                "unknown model '{}'; known models: {}",
                config.daemon.default_model,
                registry::all()
                    .iter()
                    .map(|m| m.id)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        });
    }
    Ok(())
}

fn validate_indexing_config(config: &FcdConfig) -> Result<()> {
    if config.indexing.workers == 0 {
        return Err(Error::ConfigInvalid {
            key: "indexing.workers".to_owned(),
            message: "worker count cannot be 0".to_owned(),
        });
    }
    if config.indexing.queue_capacity == 0 {
        return Err(Error::ConfigInvalid {
            key: "indexing.queue_capacity".to_owned(),
            message: "queue capacity cannot be 0".to_owned(),
        });
    }
    if !(0.0..=1.0).contains(&config.indexing.folder_inflight_fraction)
        || config.indexing.folder_inflight_fraction == 0.0
    {
        return Err(Error::ConfigInvalid {
            key: "indexing.folder_inflight_fraction".to_owned(),
            message: "must be in (0, 1]".to_owned(),
        });
    }
    if config.indexing.chunk_overlap_tokens >= config.indexing.chunk_target_tokens {
        return Err(Error::ConfigInvalid {
            key: "indexing.chunk_overlap_tokens".to_owned(),
            message: "overlap must be smaller than the chunk target".to_owned(),
        });
    }
    Ok(())
}

fn validate_search_config(config: &FcdConfig) -> Result<()> {
    if config.search.top_k == 0 {
        return Err(Error::ConfigInvalid {
            key: "search.top_k".to_owned(),
            message: "top_k cannot be 0".to_owned(),
        });
    }
    if config.search.result_chunk_budget == 0 {
        return Err(Error::ConfigInvalid {
            key: "search.result_chunk_budget".to_owned(),
            message: "chunk budget cannot be 0".to_owned(),
        });
    }
    if config.search.recency_half_life_days <= 0.0 {
        return Err(Error::ConfigInvalid {
            key: "search.recency_half_life_days".to_owned(),
            message: "half-life must be positive".to_owned(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        FcdConfig::default().validate().expect("defaults are valid");
    }

    #[test]
    fn rejects_zero_workers() {
        let mut config = FcdConfig::default();
        config.indexing.workers = 0;
        let err = config.validate().expect_err("zero workers must fail");
        assert!(err.to_string().contains("indexing.workers"));
    }

    #[test]
    fn rejects_unknown_model() {
        let mut config = FcdConfig::default();
        config.daemon.default_model = "no-such-model".to_owned();
        let err = config.validate().expect_err("unknown model must fail");
        assert!(err.to_string().contains("no-such-model"));
    }

    #[test]
    fn rejects_overlap_at_or_above_target() {
        let mut config = FcdConfig::default();
        config.indexing.chunk_overlap_tokens = config.indexing.chunk_target_tokens;
        assert!(config.validate().is_err());
    }
}
