//! Diagnostics report for the control surface

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;

use fcd_domain::entities::HardwareProfile;

/// Snapshot answered by `diagnostics.get`
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    /// Daemon version
    pub version: String,
    /// Process id
    pub pid: u32,
    /// Hardware profile from the capability probe
    pub hardware: HardwareProfile,
    /// Active execution backend per folder
    pub active_backends: HashMap<String, String>,
    /// Configured folders with their models
    pub folders: Vec<FolderDiagnostics>,
    /// Total bytes under the model cache
    pub model_cache_bytes: u64,
    /// Expected schema version in effect
    pub expected_schema: i32,
}

/// Per-folder diagnostics line
#[derive(Debug, Clone, Serialize)]
pub struct FolderDiagnostics {
    /// Canonical path
    pub path: String,
    /// Model id
    pub model: String,
    /// Lifecycle status
    pub status: String,
    /// Error message when status is `error`
    pub error: Option<String>,
}

/// Recursive size of the model cache directory
#[must_use]
pub fn directory_size(path: &Path) -> u64 {
    let mut total = 0u64;
    let Ok(entries) = std::fs::read_dir(path) else {
        return 0;
    };
    for entry in entries.flatten() {
        let Ok(metadata) = entry.metadata() else { continue };
        if metadata.is_dir() {
            total += directory_size(&entry.path());
        } else {
            total += metadata.len();
        }
    }
    total
}
