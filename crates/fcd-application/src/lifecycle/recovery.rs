//! Database-recovery policy
//!
//! # Overview
//! Two very different failures look similar at open time and demand
//! opposite treatment:
//!
//! - **Environment errors** (native-module ABI breaks, dynamic-loader
//!   failures, missing accelerator libraries); the data is fine, the
//!   process is not. The store file must be preserved; a reinstall fixes
//!   it.
//! - **Structural corruption** (failed integrity check, mangled file);
//!   the data is gone. The file is renamed aside with a timestamp and the
//!   folder is rebuilt from sources.
//!
//! Misclassifying an environment error as corruption has caused
//! catastrophic re-indexes; the classifier below is the single, tested
//! place where the distinction is made.
//!
//! The same caution applies to "how many embeddings exist": a zero from a
//! store that is not actually open must never be read as "no prior work".
//! [`count_with_retry`] retries ambiguous answers with backoff before
//! anyone is allowed to conclude a rebuild is needed.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use fcd_domain::Error;
use fcd_domain::constants::store::CORRUPTED_SUFFIX;
use fcd_domain::error::Result;
use fcd_domain::ports::FolderStore;

use crate::backoff::Backoff;

/// Classified open failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFailureKind {
    /// Runtime/environment problem; data preserved, folder goes to Error
    Environment,
    /// Data-file problem; quarantine and rebuild
    Corruption,
    /// Stored schema is newer than the binary; refuse
    SchemaMismatch,
    /// Another handle holds the exclusive lock
    AlreadyOpen,
    /// Possibly transient (I/O contention); retry with backoff
    Transient,
}

/// Fixed pattern set naming environment failures. Matching is
/// case-insensitive substring.
const ENVIRONMENT_PATTERNS: &[&str] = &[
    "undefined symbol",
    "cannot open shared object",
    "image not found",
    "wrong elf class",
    "glibc",
    "abi mismatch",
    "dlopen",
    "dll load failed",
    "libonnxruntime",
    "no such module",
    "library not loaded",
];

/// Fixed pattern set naming structural corruption
const CORRUPTION_PATTERNS: &[&str] = &[
    "malformed",
    "not a database",
    "database disk image",
    "corrupt",
    "file is encrypted",
];

/// Classify a store-open failure.
#[must_use]
pub fn classify_open_error(error: &Error) -> OpenFailureKind {
    match error {
        Error::Corruption { .. } => OpenFailureKind::Corruption,
        Error::Environment { .. } => OpenFailureKind::Environment,
        Error::SchemaMismatch { .. } => OpenFailureKind::SchemaMismatch,
        Error::AlreadyOpen { .. } => OpenFailureKind::AlreadyOpen,
        other => {
            let message = other.to_string().to_lowercase();
            if ENVIRONMENT_PATTERNS.iter().any(|p| message.contains(p)) {
                OpenFailureKind::Environment
            } else if CORRUPTION_PATTERNS.iter().any(|p| message.contains(p)) {
                OpenFailureKind::Corruption
            } else {
                OpenFailureKind::Transient
            }
        }
    }
}

/// Rename a corrupted database aside (`<db>.corrupted.<unix-ts>`) and drop
/// its WAL siblings so the next open starts from a fresh file.
///
/// # Errors
///
/// I/O errors renaming the file.
pub fn quarantine_corrupted(db_path: &Path) -> Result<std::path::PathBuf> {
    let ts = chrono::Utc::now().timestamp();
    let quarantined = db_path.with_extension(format!("db.{CORRUPTED_SUFFIX}.{ts}"));
    std::fs::rename(db_path, &quarantined)
        .map_err(|e| Error::io_with_source(format!("quarantine {}", db_path.display()), e))?;
    for suffix in ["-wal", "-shm"] {
        let sibling = db_path.with_file_name(format!(
            "{}{suffix}",
            db_path.file_name().and_then(|n| n.to_str()).unwrap_or("index.db")
        ));
        if sibling.exists() {
            let _ = std::fs::remove_file(&sibling);
        }
    }
    warn!(
        db = %db_path.display(),
        quarantined = %quarantined.display(),
        "corrupted store quarantined; folder will rebuild from sources"
    );
    Ok(quarantined)
}

/// Embedding count with ambiguity protection: transient failures are
/// retried with backoff; only an answer from an open store is returned.
///
/// # Errors
///
/// The last error once attempts are exhausted, or immediately for
/// non-transient failures.
pub async fn count_with_retry(store: &Arc<dyn FolderStore>, backoff: Backoff) -> Result<u64> {
    let mut attempt = 0u32;
    loop {
        match store.embedding_count().await {
            Ok(count) => return Ok(count),
            Err(e) if e.is_transient() && attempt < backoff.max_attempts => {
                let delay = backoff.delay(attempt);
                info!(error = %e, attempt, delay_ms = delay.as_millis() as u64,
                    "embedding count unavailable; retrying before any rebuild decision");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_variants_classify_directly() {
        assert_eq!(
            classify_open_error(&Error::Corruption {
                message: "integrity check: row 7".to_owned()
            }),
            OpenFailureKind::Corruption
        );
        assert_eq!(
            classify_open_error(&Error::Environment {
                message: "libonnxruntime missing".to_owned()
            }),
            OpenFailureKind::Environment
        );
        assert_eq!(
            classify_open_error(&Error::SchemaMismatch {
                stored: 9,
                expected: 3
            }),
            OpenFailureKind::SchemaMismatch
        );
        assert_eq!(
            classify_open_error(&Error::AlreadyOpen {
                path: "/x/index.db".to_owned()
            }),
            OpenFailureKind::AlreadyOpen
        );
    }

    #[test]
    fn loader_failures_are_environment_not_corruption() {
        for message in [
            "dlopen failed: cannot open shared object file libonnxruntime.so.1",
            "ImportError: DLL load failed while importing runtime",
            "version `GLIBC_2.34' not found",
            "undefined symbol: OrtGetApiBase",
        ] {
            let err = Error::database(message);
            assert_eq!(
                classify_open_error(&err),
                OpenFailureKind::Environment,
                "misclassified: {message}"
            );
        }
    }

    #[test]
    fn sqlite_damage_is_corruption() {
        for message in [
            "database disk image is malformed",
            "file is not a database",
            "database corruption detected at page 14",
        ] {
            let err = Error::database(message);
            assert_eq!(
                classify_open_error(&err),
                OpenFailureKind::Corruption,
                "misclassified: {message}"
            );
        }
    }

    #[test]
    fn unknown_failures_stay_transient() {
        let err = Error::database("disk I/O error");
        assert_eq!(classify_open_error(&err), OpenFailureKind::Transient);
    }

    #[test]
    fn quarantine_renames_with_timestamp_suffix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = dir.path().join("index.db");
        std::fs::write(&db, b"damaged").expect("write");

        let quarantined = quarantine_corrupted(&db).expect("quarantine");
        assert!(!db.exists());
        assert!(quarantined.exists());
        let name = quarantined.file_name().and_then(|n| n.to_str()).expect("name");
        assert!(name.contains("corrupted."), "unexpected name {name}");
    }
}
