//! Curated embedding-model catalog
//!
//! # Overview
//! Pure data + lookup. Every model a folder may be configured with is
//! listed here with its dimensionality, footprint and language coverage;
//! an unknown id is a configuration error, caught before any lifecycle
//! work starts. The provider layer maps these ids onto concrete runtime
//! models.

use serde::Serialize;

/// Relative retrieval quality of a model for its covered languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    /// Small, fast, acceptable quality
    Fast,
    /// Balanced default
    Balanced,
    /// Largest footprint, best retrieval quality
    Best,
}

/// Static descriptor of a curated embedding model
#[derive(Debug, Clone, Serialize)]
pub struct ModelDescriptor {
    /// Stable model id used in configuration and folder metadata
    pub id: &'static str,
    /// Vector dimensionality
    pub dims: usize,
    /// Whether the distributed weights are quantized
    pub quantized: bool,
    /// Approximate download size in megabytes
    pub size_mb: u32,
    /// Maximum input sequence length in tokens
    pub max_sequence: usize,
    /// ISO 639-1 codes of covered languages; `["*"]` means multilingual
    pub languages: &'static [&'static str],
    /// Quality tier for the covered languages
    pub quality: QualityTier,
    /// Whether GPU acceleration is worth selecting for this model size
    pub prefers_gpu: bool,
}

/// Curated catalog. Order is presentation order; the first entry is the
/// daemon default.
pub const MODELS: &[ModelDescriptor] = &[
    ModelDescriptor {
        id: "all-minilm-l6-v2",
        dims: 384,
        quantized: false,
        size_mb: 90,
        max_sequence: 256,
        languages: &["en"],
        quality: QualityTier::Fast,
        prefers_gpu: false,
    },
    ModelDescriptor {
        id: "bge-small-en-v1.5",
        dims: 384,
        quantized: false,
        size_mb: 133,
        max_sequence: 512,
        languages: &["en"],
        quality: QualityTier::Fast,
        prefers_gpu: false,
    },
    ModelDescriptor {
        id: "bge-base-en-v1.5",
        dims: 768,
        quantized: false,
        size_mb: 436,
        max_sequence: 512,
        languages: &["en"],
        quality: QualityTier::Balanced,
        prefers_gpu: true,
    },
    ModelDescriptor {
        id: "multilingual-e5-small",
        dims: 384,
        quantized: false,
        size_mb: 471,
        max_sequence: 512,
        languages: &["*"],
        quality: QualityTier::Fast,
        prefers_gpu: false,
    },
    ModelDescriptor {
        id: "multilingual-e5-large",
        dims: 1024,
        quantized: false,
        size_mb: 2240,
        max_sequence: 512,
        languages: &["*"],
        quality: QualityTier::Best,
        prefers_gpu: true,
    },
    ModelDescriptor {
        id: "mxbai-embed-large-v1",
        dims: 1024,
        quantized: false,
        size_mb: 1340,
        max_sequence: 512,
        languages: &["en"],
        quality: QualityTier::Best,
        prefers_gpu: true,
    },
];

/// Look up a model descriptor by id
#[must_use]
pub fn get(id: &str) -> Option<&'static ModelDescriptor> {
    MODELS.iter().find(|m| m.id == id)
}

/// The daemon default model
#[must_use]
pub fn default_model() -> &'static ModelDescriptor {
    &MODELS[0]
}

/// All curated models
#[must_use]
pub fn all() -> &'static [ModelDescriptor] {
    MODELS
}
