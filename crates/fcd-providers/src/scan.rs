//! Full folder enumeration
//!
//! # Overview
//! Walks a folder with gitignore semantics, fingerprints every regular
//! file and classifies formats the extractor set does not handle as
//! skipped-with-reason. Directory detection is stat-based with an
//! extension fallback for broken stat results; directories are never
//! classified as files.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use ignore::WalkBuilder;
use tracing::{debug, warn};

use fcd_domain::Error;
use fcd_domain::constants::store::FOLDER_DATA_DIR;
use fcd_domain::error::Result;
use fcd_domain::ports::{FolderScanner, ScannedFile, TextExtractor};

use crate::fingerprint::fingerprint_file;

/// Directory names never descended into
const SKIP_DIRS: &[&str] = &[FOLDER_DATA_DIR, ".git", ".hg", ".svn", "node_modules", "target"];

/// `ignore`-based scanner
pub struct WalkScanner {
    extractor: Arc<dyn TextExtractor>,
    fingerprint_budget: u64,
}

impl WalkScanner {
    /// Scanner classifying support through `extractor`
    #[must_use]
    pub fn new(extractor: Arc<dyn TextExtractor>, fingerprint_budget: u64) -> Self {
        Self {
            extractor,
            fingerprint_budget,
        }
    }

    fn is_dir(entry: &ignore::DirEntry) -> bool {
        // Stat-based primary; a path with no extension and a failed stat
        // is treated as a directory rather than risk indexing one
        match entry.file_type() {
            Some(ft) => ft.is_dir(),
            None => entry.path().extension().is_none(),
        }
    }

    fn scan_blocking(&self, root: &Path) -> Result<Vec<ScannedFile>> {
        if !root.is_dir() {
            return Err(Error::invalid_argument(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let mut files = Vec::new();
        let walker = WalkBuilder::new(root)
            .hidden(false)
            .filter_entry(|entry| {
                if !Self::is_dir(entry) {
                    return true;
                }
                entry
                    .file_name()
                    .to_str()
                    .is_none_or(|name| !SKIP_DIRS.contains(&name))
            })
            .build();

        for entry_result in walker {
            let entry = match entry_result {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(root = %root.display(), error = %e, "unreadable directory entry");
                    continue;
                }
            };
            if Self::is_dir(&entry) || !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }

            let path = entry.path();
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let rel_path = relative.to_string_lossy().replace('\\', "/");

            let size = entry.metadata().map_or(0, |m| m.len());
            let fingerprint = match fingerprint_file(path, self.fingerprint_budget) {
                Ok(fp) => fp,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "fingerprinting failed; skipping");
                    continue;
                }
            };

            let supported = self.extractor.supports(path);
            let skip_reason = if supported {
                None
            } else {
                Some(format!(
                    "unsupported extension '{}'",
                    path.extension()
                        .and_then(|e| e.to_str())
                        .unwrap_or("<none>")
                ))
            };

            files.push(ScannedFile {
                rel_path,
                size,
                fingerprint,
                supported,
                skip_reason,
            });
        }

        files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        debug!(root = %root.display(), files = files.len(), "scan complete");
        Ok(files)
    }
}

#[async_trait]
impl FolderScanner for WalkScanner {
    async fn scan(&self, root: &Path) -> Result<Vec<ScannedFile>> {
        let root = root.to_path_buf();
        let extractor = Arc::clone(&self.extractor);
        let budget = self.fingerprint_budget;
        tokio::task::spawn_blocking(move || {
            WalkScanner::new(extractor, budget).scan_blocking(&root)
        })
        .await
        .map_err(|e| Error::internal(format!("scan task panicked: {e}")))?
    }

    async fn probe_file(&self, root: &Path, rel_path: &str) -> Result<Option<ScannedFile>> {
        let path = root.join(rel_path);
        let rel_path = rel_path.to_owned();
        let extractor = Arc::clone(&self.extractor);
        let budget = self.fingerprint_budget;
        tokio::task::spawn_blocking(move || {
            let metadata = match std::fs::metadata(&path) {
                Ok(m) => m,
                Err(_) => return Ok(None),
            };
            if !metadata.is_file() {
                return Ok(None);
            }
            let fingerprint = fingerprint_file(&path, budget)?;
            let supported = extractor.supports(&path);
            let skip_reason = if supported {
                None
            } else {
                Some(format!(
                    "unsupported extension '{}'",
                    path.extension().and_then(|e| e.to_str()).unwrap_or("<none>")
                ))
            };
            Ok(Some(ScannedFile {
                rel_path,
                size: metadata.len(),
                fingerprint,
                supported,
                skip_reason,
            }))
        })
        .await
        .map_err(|e| Error::internal(format!("probe task panicked: {e}")))?
    }
}
