//! Port interfaces for providers and infrastructure
//!
//! # Overview
//! Every seam between the lifecycle core and the outside world is a trait
//! defined here. `fcd-providers` supplies the concrete store, embedder,
//! scanner, watcher and extractor; `fcd-infrastructure` supplies the
//! capability probe and backend selector; `fcd-application` consumes all
//! of them without knowing the implementations.

mod chunking;
mod embedding;
mod extractor;
mod probe;
mod scanner;
mod store;

pub use chunking::{Chunker, SemanticExtractor};
pub use embedding::{EmbeddingProvider, EmbeddingProviderFactory};
pub use extractor::TextExtractor;
pub use probe::{BackendSelector, CapabilityProbe};
pub use scanner::{ChangeSet, ChangeStream, ChangeWatcher, FolderScanner, ScannedFile};
pub use store::{AnnHit, DocumentPage, FolderStore, ProcessedFile, StoreFactory};
