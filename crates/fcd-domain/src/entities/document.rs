//! Document records and extraction output

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::DocumentId;

/// Byte offset where a page begins in the extracted text.
///
/// Plain-text formats have no pages; extractors may return an empty list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PageOffset {
    /// 1-based page number
    pub page: u32,
    /// Byte offset of the page start in the extracted text
    pub offset: usize,
}

/// Output of the text-extraction collaborator
#[derive(Debug, Clone, Default)]
pub struct ExtractedText {
    /// Full extracted plain text
    pub text: String,
    /// Page start offsets, empty when the format has no page concept
    pub pages: Vec<PageOffset>,
    /// Language hint from the extractor, if it produced one
    pub language_hint: Option<String>,
}

/// Persisted document record, 1:1 with a successfully extracted file
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DocumentRecord {
    /// Store-assigned id
    pub id: DocumentId,
    /// Path relative to the folder root
    pub rel_path: String,
    /// Length of the extracted text in bytes
    pub text_len: u64,
    /// Page count when the source format has pages
    pub page_count: Option<u32>,
    /// Page start offsets into the extracted text; empty when pageless
    pub pages: Vec<PageOffset>,
    /// Language hint, if known
    pub language_hint: Option<String>,
    /// When extraction ran
    pub extracted_at: DateTime<Utc>,
}

impl DocumentRecord {
    /// Page a byte offset of the extracted text falls on, when paged
    #[must_use]
    pub fn page_for_offset(&self, offset: usize) -> Option<u32> {
        self.pages
            .iter()
            .take_while(|p| p.offset <= offset)
            .last()
            .map(|p| p.page)
    }
}

/// Summary row for `list_documents`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DocumentSummary {
    /// Store-assigned id
    pub id: DocumentId,
    /// Path relative to the folder root
    pub rel_path: String,
    /// Source file size in bytes
    pub size: u64,
    /// When the file last finished indexing
    pub last_indexed_at: Option<DateTime<Utc>>,
    /// Number of chunks currently stored for the document
    pub chunk_count: u64,
}
