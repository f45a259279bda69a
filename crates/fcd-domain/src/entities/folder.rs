//! Folder Domain Entities
//!
//! # Overview
//! A folder is the unit the daemon manages: one configured directory, one
//! embedded store, one lifecycle state machine. `FolderStatus` is the
//! machine's current state; the durable description (path + model) lives
//! in the daemon's folder registry.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a folder.
///
/// `Active` and `Error` are terminal for a session; everything else is in
/// flight. Transitions are owned by the lifecycle engine exclusively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FolderStatus {
    /// Store being opened, schema checked, crashed rows reset
    Initializing,
    /// Full enumeration and fingerprint comparison in progress
    Scanning,
    /// Selected embedding model is being fetched into the cache
    DownloadingModel,
    /// Work queue is being drained through the embedding pool
    Indexing,
    /// Queue drained; watcher drives incremental updates
    Active,
    /// Unrecoverable condition; see the attached message
    Error,
    /// User removed the folder; cleanup in progress
    Removing,
}

impl std::fmt::Display for FolderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Initializing => "initializing",
            Self::Scanning => "scanning",
            Self::DownloadingModel => "downloading_model",
            Self::Indexing => "indexing",
            Self::Active => "active",
            Self::Error => "error",
            Self::Removing => "removing",
        };
        f.write_str(name)
    }
}
