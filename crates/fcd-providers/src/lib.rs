//! # Provider Layer
//!
//! Concrete implementations of the domain ports: the sqlite + HNSW hybrid
//! store, the fastembed model runner (and a deterministic hash embedder
//! for offline runs and tests), the filesystem scanner and watcher, text
//! extractors for the plain-text family, and the chunking / semantic
//! extraction pipeline stages.

/// Paragraph-aware overlapping chunker
pub mod chunk;
/// Embedding providers (fastembed runner, deterministic hash embedder)
pub mod embed;
/// Text extractors (plain text, Markdown)
pub mod extract;
/// Content fingerprinting
pub mod fingerprint;
/// Full folder enumeration
pub mod scan;
/// Key phrases, topics and readability
pub mod semantic;
/// sqlite + HNSW hybrid store
pub mod store;
/// Debounced filesystem watcher
pub mod watch;

pub use chunk::ParagraphChunker;
pub use embed::{DefaultEmbeddingFactory, EmbeddingProviderKind, HashEmbeddingProvider};
pub use extract::CompositeExtractor;
pub use scan::WalkScanner;
pub use semantic::FrequencySemanticExtractor;
pub use store::SqliteStoreFactory;
pub use watch::NotifyChangeWatcher;
