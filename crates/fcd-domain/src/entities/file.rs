//! File-state records
//!
//! One row per file under a folder. The persisted state table *is* the
//! work queue: resumption after a crash re-derives pending work from these
//! rows, never from memory.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Processing state of a file within its folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    /// Needs (re-)processing
    Pending,
    /// A worker currently owns it; reset to `Pending` on startup
    Processing,
    /// Chunks and vectors persisted
    Done,
    /// Processing failed; see the failure reason
    Failed,
    /// Unsupported or empty; intentionally not indexed
    Skipped,
}

impl FileState {
    /// Parse the stored string form
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// String form stored in the database
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Content fingerprint deciding whether a file needs reprocessing.
///
/// Full-content hash below the hashing budget; above it a bounded
/// head+tail digest combined with size and mtime. Renames keep the
/// fingerprint, so a rename is a path update, not a re-embed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    /// The hex digest
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-file record, keyed by `(folder, rel_path)`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FileRecord {
    /// Path relative to the folder root, `/`-separated
    pub rel_path: String,
    /// Content fingerprint at last scan
    pub fingerprint: Fingerprint,
    /// Size in bytes at last scan
    pub size: u64,
    /// First time the scanner saw the file
    pub discovered_at: DateTime<Utc>,
    /// Last time processing finished (either way)
    pub last_processed_at: Option<DateTime<Utc>>,
    /// Current processing state
    pub state: FileState,
    /// Failure or skip reason, when state is `Failed` or `Skipped`
    pub failure: Option<String>,
}
