//! Chunk records and derived semantic metadata
//!
//! # Overview
//! A chunk is a contiguous slice of document text with a stable ordinal
//! id. Every persisted chunk carries derived semantic metadata; the store
//! rejects a chunk whose key-phrase list is empty, so the pipeline must
//! synthesize fallback phrases before writing.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::ChunkKey;

/// Derived semantic metadata for one chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SemanticMetadata {
    /// Key phrases, 1..=10 entries. Never empty in a persisted chunk.
    pub key_phrases: Vec<String>,
    /// Topic tags, at most 5
    pub topics: Vec<String>,
    /// Readability score in `[0, 1]`, higher is easier
    pub readability: f32,
}

impl SemanticMetadata {
    /// Whether this metadata satisfies the storage contract
    #[must_use]
    pub fn is_storable(&self) -> bool {
        !self.key_phrases.is_empty() && self.key_phrases.len() <= 10 && self.topics.len() <= 5
    }
}

/// Chunker output before the document id is known
#[derive(Debug, Clone)]
pub struct ChunkDraft {
    /// Ordinal within the document, starting at zero
    pub chunk_index: u32,
    /// Byte offset of the chunk start in the extracted text
    pub start_offset: usize,
    /// Byte offset one past the chunk end
    pub end_offset: usize,
    /// Estimated token count of the chunk text
    pub token_estimate: u32,
    /// The chunk text itself
    pub text: String,
}

/// Persisted chunk with metadata attached
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChunkRecord {
    /// Chunk identity
    pub key: ChunkKey,
    /// Byte offset of the chunk start in the extracted text
    pub start_offset: usize,
    /// Byte offset one past the chunk end
    pub end_offset: usize,
    /// Estimated token count
    pub token_estimate: u32,
    /// Chunk text
    pub text: String,
    /// Derived semantic metadata
    pub semantic: SemanticMetadata,
}
