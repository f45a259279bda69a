//! # Application Layer
//!
//! Use cases of the Folder Context Daemon, written against the domain
//! ports only: the per-folder lifecycle engine (state machine, durable
//! work queue, crash recovery), the shared embedding worker pool with
//! backpressure and fair scheduling, and the search engine with
//! metadata-aware re-ranking.

/// Bounded exponential backoff with jitter
pub mod backoff;
/// Per-folder lifecycle engine
pub mod lifecycle;
/// Shared embedding worker pool
pub mod pool;
/// Query execution and re-ranking
pub mod search;

pub use lifecycle::{
    EngineDeps, FolderHandle, FolderSettings, LifecycleEvent, spawn_folder_engine,
};
pub use pool::{EmbedBatch, EmbeddingPool, PoolLimits};
pub use search::{SearchEngine, SearchHit, SearchParams, SearchRequest, SearchResponse};
