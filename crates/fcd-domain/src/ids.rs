//! Identifier value objects
//!
//! Identifiers are small, cheap to clone and compared by value. Folder
//! identity is the canonical absolute path; chunk identity is ordinal
//! within its document, never content-derived (two chunks with identical
//! text in one document are legal).

use std::fmt;
use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Identity of a configured folder: its canonical absolute path.
///
/// On case-insensitive filesystems the stored form is case-folded so two
/// spellings of the same directory map to one folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct FolderId(String);

impl FolderId {
    /// Build a folder id from an already-canonicalized absolute path.
    ///
    /// Callers resolve symlinks and relative components first (the daemon
    /// does this at `folders.add` time); this constructor only applies the
    /// case fold.
    #[must_use]
    pub fn from_canonical(path: &Path) -> Self {
        let raw = path.to_string_lossy();
        if cfg!(any(windows, target_os = "macos")) {
            Self(raw.to_lowercase())
        } else {
            Self(raw.into_owned())
        }
    }

    /// The canonical path as a `Path`
    #[must_use]
    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }

}

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Row id of a document inside one folder store
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct DocumentId(pub i64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a chunk: `(document, ordinal)` within that document
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct ChunkKey {
    /// Owning document
    pub document_id: DocumentId,
    /// Ordinal of the chunk within the document, starting at zero
    pub chunk_index: u32,
}

impl ChunkKey {
    /// Construct a chunk key
    #[must_use]
    pub fn new(document_id: DocumentId, chunk_index: u32) -> Self {
        Self {
            document_id,
            chunk_index,
        }
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.document_id, self.chunk_index)
    }
}

/// Monotonic counter bumped on each full scan of a folder.
///
/// Progress counters reset with the generation; within one generation they
/// only move forward.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(transparent)]
pub struct ScanGeneration(pub u64);

impl ScanGeneration {
    /// The next generation
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for ScanGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
