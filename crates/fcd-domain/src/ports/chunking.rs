//! Chunking and semantic-extraction ports

use crate::entities::{ChunkDraft, PageOffset, SemanticMetadata};
use crate::error::Result;

/// Splits extracted text into overlapping chunks with stable ordinal ids.
///
/// Pure computation; no async. Paragraph and heading boundaries are
/// respected when possible, page boundaries are not preferred over them.
pub trait Chunker: Send + Sync {
    /// Chunk the text. Empty input yields an empty list.
    fn chunk(&self, text: &str, pages: &[PageOffset]) -> Vec<ChunkDraft>;
}

/// Derives key phrases, topics and readability for one chunk.
pub trait SemanticExtractor: Send + Sync {
    /// Extract semantic metadata for a chunk's text.
    ///
    /// May legally return an empty key-phrase list or fail; the pipeline
    /// then substitutes [`SemanticExtractor::fallback_phrases`] so no
    /// chunk is ever written without phrases.
    ///
    /// # Errors
    ///
    /// Extraction failure for this chunk only; the pipeline recovers.
    fn extract(&self, text: &str) -> Result<SemanticMetadata>;

    /// Frequency-based fallback: top non-stopword unigrams and bigrams.
    /// Returns at least one phrase for any non-empty text.
    fn fallback_phrases(&self, text: &str) -> Vec<String>;
}
