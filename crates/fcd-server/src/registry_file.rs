//! Durable list of configured folders
//!
//! The daemon must resume every configured folder after a restart; this
//! small JSON file under the user data dir is the source of truth for
//! which folders exist and which model each one uses. Writes are
//! temp-file + rename so a crash can never leave a torn registry.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use fcd_domain::Error;
use fcd_domain::error::Result;

/// One configured folder
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FolderConfigEntry {
    /// Canonical absolute path
    pub path: String,
    /// Embedding model id
    pub model: String,
}

/// The registry file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FolderRegistry {
    /// Configured folders, insertion order
    pub folders: Vec<FolderConfigEntry>,
}

/// Default registry path under the user data dir
#[must_use]
pub fn default_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fcd")
        .join("folders.json")
}

/// Load the registry; a missing file is an empty registry.
///
/// # Errors
///
/// I/O or parse failures for an existing file.
pub fn load(path: &Path) -> Result<FolderRegistry> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(serde_json::from_str(&raw)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FolderRegistry::default()),
        Err(e) => Err(Error::io_with_source(format!("read {}", path.display()), e)),
    }
}

/// Persist the registry atomically.
///
/// # Errors
///
/// I/O failures writing or renaming.
pub fn save(path: &Path, registry: &FolderRegistry) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::io_with_source(format!("create {}", parent.display()), e))?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_string_pretty(registry)?)
        .map_err(|e| Error::io_with_source(format!("write {}", tmp.display()), e))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| Error::io_with_source(format!("rename to {}", path.display()), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty_registry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = load(&dir.path().join("folders.json")).expect("load");
        assert!(registry.folders.is_empty());
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("folders.json");
        let registry = FolderRegistry {
            folders: vec![FolderConfigEntry {
                path: "/data/corpus".to_owned(),
                model: "all-minilm-l6-v2".to_owned(),
            }],
        };
        save(&path, &registry).expect("save");
        let loaded = load(&path).expect("load");
        assert_eq!(loaded.folders, registry.folders);
        assert!(!path.with_extension("json.tmp").exists());
    }
}
