//! Hybrid folder store port
//!
//! # Overview
//! One store per folder: relational rows for files, documents and chunks,
//! a vector per chunk, and an ANN index over those vectors. The lifecycle
//! engine owns the store exclusively; search and MCP reach it through the
//! engine's read lease, never by opening the database themselves.
//!
//! # Consistency contract
//! - Every multi-row mutation for one file runs in a single transaction;
//!   partial state is never observable (mutations for different files are
//!   never combined, so progress survives mid-queue crashes).
//! - A vector exists iff its chunk exists; deleting a chunk cascades.
//! - All vectors in a folder share one `(model_id, dims)` pair.
//! - A chunk with an empty key-phrase list is rejected at the write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::{
    ChunkDraft, ChunkRecord, DocumentRecord, DocumentSummary, FileRecord, Fingerprint, PageOffset,
    SemanticMetadata,
};
use crate::error::Result;
use crate::ids::{ChunkKey, DocumentId, FolderId, ScanGeneration};

/// Everything the pipeline produced for one file, written atomically
#[derive(Debug, Clone)]
pub struct ProcessedFile {
    /// Path relative to the folder root
    pub rel_path: String,
    /// Fingerprint the content was processed at
    pub fingerprint: Fingerprint,
    /// Source size in bytes
    pub size: u64,
    /// Full extracted text
    pub text: String,
    /// Page start offsets, empty for pageless formats
    pub pages: Vec<PageOffset>,
    /// Language hint from extraction
    pub language_hint: Option<String>,
    /// Chunks with their semantic metadata, ordinal order
    pub chunks: Vec<(ChunkDraft, SemanticMetadata)>,
    /// One vector per chunk, same order
    pub vectors: Vec<Vec<f32>>,
    /// Model the vectors were produced with
    pub model_id: String,
}

/// One ANN candidate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnHit {
    /// Matching chunk
    pub key: ChunkKey,
    /// Cosine similarity, higher is closer
    pub score: f32,
}

/// One page of `list_documents` output
#[derive(Debug, Clone)]
pub struct DocumentPage {
    /// Summaries in id order
    pub documents: Vec<DocumentSummary>,
    /// Cursor for the next page, `None` at the end
    pub next_cursor: Option<String>,
}

/// The per-folder hybrid store
#[async_trait]
pub trait FolderStore: Send + Sync + std::fmt::Debug {
    // ── Folder metadata ───────────────────────────────────────────

    /// Schema version the store was opened at
    fn schema_version(&self) -> i32;

    /// Model id the folder's vectors belong to, if any were written
    async fn model_id(&self) -> Result<Option<String>>;

    /// Record the folder's model id
    async fn set_model_id(&self, model_id: &str) -> Result<()>;

    /// Current scan generation
    async fn scan_generation(&self) -> Result<ScanGeneration>;

    /// Bump and return the new scan generation
    async fn bump_scan_generation(&self) -> Result<ScanGeneration>;

    /// Record completion of a full scan
    async fn set_last_full_scan(&self, at: DateTime<Utc>) -> Result<()>;

    /// When the last full scan completed
    async fn last_full_scan(&self) -> Result<Option<DateTime<Utc>>>;

    // ── File state (the durable work queue) ───────────────────────

    /// Reset rows left in `processing` by a crash back to `pending`.
    /// Returns the number of rows reset.
    async fn reset_processing(&self) -> Result<u64>;

    /// All file records
    async fn file_records(&self) -> Result<Vec<FileRecord>>;

    /// Files awaiting work, discovery order
    async fn pending_files(&self) -> Result<Vec<FileRecord>>;

    /// Insert or update a file record
    async fn upsert_file(&self, record: &FileRecord) -> Result<()>;

    /// Claim a file for processing
    async fn mark_processing(&self, rel_path: &str) -> Result<()>;

    /// Record a per-file failure; touches only state and reason
    async fn mark_failed(&self, rel_path: &str, reason: &str) -> Result<()>;

    /// Record a skip with its reason
    async fn mark_skipped(&self, rel_path: &str, reason: &str) -> Result<()>;

    /// Move a file record (and its document) to a new path. Content is
    /// unchanged, so chunks and vectors are untouched.
    async fn rename_file(&self, old_rel: &str, new_rel: &str) -> Result<()>;

    /// Delete a file record, cascading to its document, chunks and
    /// vectors in one transaction
    async fn remove_file(&self, rel_path: &str) -> Result<()>;

    // ── Pipeline writes ───────────────────────────────────────────

    /// Persist one file's processing outcome atomically: document row,
    /// chunks, vectors and the file's terminal `done` state.
    ///
    /// # Errors
    ///
    /// Rejects empty key-phrase lists, chunk/vector count mismatch and
    /// dimensionality differing from the folder's existing vectors.
    ///
    /// A model swap does not bulk-delete: files are requeued and each
    /// write replaces that file's chunks and vectors together, so the
    /// chunk/vector bijection holds at every observable point.
    async fn write_processed(&self, outcome: &ProcessedFile) -> Result<DocumentId>;

    // ── Counts ────────────────────────────────────────────────────

    /// Number of embedded chunks.
    ///
    /// Counts the chunks table (vectors are written in the same
    /// transaction, so the counts agree) rather than a vectors table
    /// whose existence could depend on build order. Zero from an open
    /// store is authoritative; a store that is not open returns
    /// [`crate::Error::StoreNotOpen`] instead of zero.
    async fn embedding_count(&self) -> Result<u64>;

    /// Number of documents
    async fn document_count(&self) -> Result<u64>;

    /// Dimensionality of stored vectors, `None` while no vectors exist
    async fn vector_dims(&self) -> Result<Option<usize>>;

    // ── Search and retrieval ──────────────────────────────────────

    /// Approximate top-`k` by cosine similarity
    async fn ann_search(&self, query: &[f32], k: usize) -> Result<Vec<AnnHit>>;

    /// Fetch one chunk
    async fn chunk(&self, key: ChunkKey) -> Result<ChunkRecord>;

    /// Chunks of a document, optionally restricted to an inclusive
    /// ordinal range
    async fn chunks_for_document(
        &self,
        document: DocumentId,
        range: Option<(u32, u32)>,
    ) -> Result<Vec<ChunkRecord>>;

    /// Chunks adjacent to `key` within `window` ordinals on each side,
    /// excluding the chunk itself
    async fn neighbor_chunks(&self, key: ChunkKey, window: usize) -> Result<Vec<ChunkRecord>>;

    /// Document by id
    async fn document(&self, id: DocumentId) -> Result<DocumentRecord>;

    /// Document by relative path
    async fn document_by_path(&self, rel_path: &str) -> Result<DocumentRecord>;

    /// Full extracted text of a document
    async fn document_text(&self, id: DocumentId) -> Result<String>;

    /// Paginated document summaries, optionally filtered by a path
    /// substring
    async fn list_documents(
        &self,
        filter: Option<&str>,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<DocumentPage>;

    /// Literal substring scan over the most recently indexed documents;
    /// the search engine's fallback when query embedding fails
    async fn substring_scan(
        &self,
        needle: &str,
        doc_limit: usize,
        hit_limit: usize,
    ) -> Result<Vec<ChunkRecord>>;

    // ── Lifecycle ─────────────────────────────────────────────────

    /// Flush buffered state to disk
    async fn flush(&self) -> Result<()>;

    /// Flush, release the exclusive lock and invalidate the handle
    async fn close(&self) -> Result<()>;
}

/// Opens folder stores, applying migrations and crash recovery
#[async_trait]
pub trait StoreFactory: Send + Sync {
    /// Open (creating if absent) the store for `folder`.
    ///
    /// Runs forward migrations up to `expected_schema`; refuses with
    /// [`crate::Error::SchemaMismatch`] when the stored version is newer.
    /// Open failures are reported as [`crate::Error::Environment`] or
    /// [`crate::Error::Corruption`] per the recovery policy's classifier.
    ///
    /// # Errors
    ///
    /// See above; also [`crate::Error::AlreadyOpen`] when another handle
    /// holds the exclusive lock.
    async fn open(
        &self,
        folder: &FolderId,
        expected_schema: i32,
    ) -> Result<std::sync::Arc<dyn FolderStore>>;
}
