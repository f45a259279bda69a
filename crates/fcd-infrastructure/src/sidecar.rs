//! Schema-version sidecar resolution
//!
//! # Overview
//! The expected on-disk schema version is declared by a small `VERSION`
//! file co-located with the compiled binary. Resolution tries a fixed
//! search list (binary directory, its parent, then the current working
//! directory) and falls back to the version compiled into the binary
//! when no sidecar is found. Absence is not an error: a missing sidecar
//! must never trigger a spurious mismatch and re-index.

use std::path::PathBuf;

use tracing::{debug, warn};

use fcd_domain::constants::store::{LATEST_SCHEMA_VERSION, VERSION_SIDECAR};

/// Where a resolved schema version came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSource {
    /// Parsed from a sidecar at this path
    Sidecar(PathBuf),
    /// No sidecar found (or unparsable); compiled-in latest used
    CompiledIn,
}

/// Resolved expected schema version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedSchema {
    /// The version number
    pub version: i32,
    /// How it was resolved
    pub source: VersionSource,
}

/// Resolve the expected schema version from the sidecar search list.
#[must_use]
pub fn resolve_expected_schema() -> ExpectedSchema {
    resolve_from_candidates(sidecar_candidates())
}

fn sidecar_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            candidates.push(dir.join(VERSION_SIDECAR));
            if let Some(parent) = dir.parent() {
                candidates.push(parent.join(VERSION_SIDECAR));
            }
        }
    }
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join(VERSION_SIDECAR));
    }
    candidates
}

fn resolve_from_candidates(candidates: Vec<PathBuf>) -> ExpectedSchema {
    for candidate in candidates {
        match std::fs::read_to_string(&candidate) {
            Ok(content) => match content.trim().parse::<i32>() {
                Ok(version) if version > 0 => {
                    debug!(path = %candidate.display(), version, "schema version sidecar found");
                    return ExpectedSchema {
                        version,
                        source: VersionSource::Sidecar(candidate),
                    };
                }
                _ => {
                    warn!(
                        path = %candidate.display(),
                        "sidecar exists but does not contain a positive integer; ignoring"
                    );
                }
            },
            Err(_) => continue,
        }
    }
    ExpectedSchema {
        version: LATEST_SCHEMA_VERSION,
        source: VersionSource::CompiledIn,
    }
}
