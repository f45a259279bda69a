//! Scanner and watcher ports

use std::path::Path;

use async_trait::async_trait;

use crate::entities::Fingerprint;
use crate::error::Result;

/// One file found by a full enumeration
#[derive(Debug, Clone)]
pub struct ScannedFile {
    /// Path relative to the folder root, `/`-separated
    pub rel_path: String,
    /// Size in bytes
    pub size: u64,
    /// Content fingerprint
    pub fingerprint: Fingerprint,
    /// Whether an extractor handles this format
    pub supported: bool,
    /// Reason the file will be skipped, when unsupported
    pub skip_reason: Option<String>,
}

/// Full folder enumeration, run on folder entry and on demand
#[async_trait]
pub trait FolderScanner: Send + Sync {
    /// Enumerate all regular files under `root`, fingerprinting each.
    ///
    /// Directories are detected explicitly (stat first, extension
    /// fallback) and never classified as files. The hidden store
    /// directory is excluded.
    ///
    /// # Errors
    ///
    /// I/O errors for the enumeration itself; unreadable individual files
    /// are reported as unsupported with a reason instead.
    async fn scan(&self, root: &Path) -> Result<Vec<ScannedFile>>;

    /// Fingerprint and classify a single file named by a watcher event.
    /// Returns `None` when the path no longer exists or is a directory.
    ///
    /// # Errors
    ///
    /// I/O errors reading the file.
    async fn probe_file(&self, root: &Path, rel_path: &str) -> Result<Option<ScannedFile>>;
}

/// Debounced batch of filesystem changes for one folder.
///
/// A rename with an unchanged fingerprint arrives in `renamed`, which
/// triggers only a path update, not re-embedding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Newly appeared paths (relative)
    pub added: Vec<String>,
    /// Paths whose content changed
    pub modified: Vec<String>,
    /// Paths that disappeared
    pub removed: Vec<String>,
    /// `(old, new)` path pairs with identical content
    pub renamed: Vec<(String, String)>,
}

impl ChangeSet {
    /// Whether the set carries no changes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.modified.is_empty()
            && self.removed.is_empty()
            && self.renamed.is_empty()
    }
}

/// Live stream of debounced change sets
#[async_trait]
pub trait ChangeStream: Send {
    /// Next change set, or `None` once the stream has stopped
    async fn next_changes(&mut self) -> Option<ChangeSet>;
}

/// Starts filesystem watching for a folder
#[async_trait]
pub trait ChangeWatcher: Send + Sync {
    /// Begin watching `root`; events within the debounce window collapse
    /// into one [`ChangeSet`].
    ///
    /// # Errors
    ///
    /// Watch registration failure (platform watcher limits, permissions).
    async fn watch(&self, root: &Path) -> Result<Box<dyn ChangeStream>>;
}
