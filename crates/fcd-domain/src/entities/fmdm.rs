//! Folder Monitoring Data Model
//!
//! # Overview
//! The FMDM is the immutable snapshot of per-folder state the daemon
//! broadcasts to subscribers (TUI, MCP introspection). It is derived from
//! lifecycle state, never persisted, and always sent whole: subscribers
//! receive full snapshots, not patches.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::FolderStatus;
use crate::ids::ScanGeneration;

/// Progress counters for one folder within the current scan generation.
///
/// `files_done <= files_total`; both counters are monotone within a
/// generation and reset when the generation bumps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FolderProgress {
    /// Files the current scan found needing work
    pub files_total: u64,
    /// Files finished (done, failed or skipped) this generation
    pub files_done: u64,
    /// Chunks written this generation
    pub chunks_done: u64,
    /// Estimated seconds to drain the queue, when computable
    pub eta_seconds: Option<u64>,
}

/// One folder's view inside an FMDM snapshot
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FolderView {
    /// Canonical folder path
    pub path: String,
    /// Lifecycle status
    pub status: FolderStatus,
    /// Embedding model id
    pub model: String,
    /// Scan generation the progress counters belong to
    pub generation: ScanGeneration,
    /// Progress counters
    pub progress: FolderProgress,
    /// User-actionable message when status is `Error`
    pub error: Option<String>,
}

/// Immutable snapshot of every managed folder
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct FmdmSnapshot {
    /// Per-folder views, ordered by path
    pub folders: Vec<FolderView>,
    /// When the snapshot was built
    pub generated_at: Option<DateTime<Utc>>,
}

impl FmdmSnapshot {
    /// Whether any folder is currently indexing (drives the 1 Hz tick)
    #[must_use]
    pub fn any_indexing(&self) -> bool {
        self.folders
            .iter()
            .any(|f| f.status == FolderStatus::Indexing)
    }
}
