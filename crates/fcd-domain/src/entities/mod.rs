//! Core business entities
//!
//! Records persisted in the per-folder store plus the in-memory FMDM
//! snapshot broadcast to subscribers.

mod chunk;
mod document;
mod file;
mod fmdm;
mod folder;
mod hardware;

pub use chunk::{ChunkDraft, ChunkRecord, SemanticMetadata};
pub use document::{DocumentRecord, DocumentSummary, ExtractedText, PageOffset};
pub use file::{FileRecord, FileState, Fingerprint};
pub use fmdm::{FmdmSnapshot, FolderProgress, FolderView};
pub use folder::FolderStatus;
pub use hardware::{
    ApiSupport, BackendConfig, ExecutionBackend, GpuInfo, GpuKind, HardwareProfile,
};
