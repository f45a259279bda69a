//! Content fingerprinting
//!
//! Small files get a full sha256 digest. Files above the hashing budget
//! get a bounded fingerprint instead: seahash over head and tail windows
//! combined with size and mtime. Both forms are prefixed so a budget
//! change can never make the two collide.

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};

use fcd_domain::Error;
use fcd_domain::constants::indexing::FINGERPRINT_WINDOW_BYTES;
use fcd_domain::entities::Fingerprint;
use fcd_domain::error::Result;

/// Fingerprint a file, choosing full or bounded hashing by `budget`.
///
/// # Errors
///
/// I/O errors reading the file or its metadata.
pub fn fingerprint_file(path: &Path, budget: u64) -> Result<Fingerprint> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| Error::io_with_source(format!("stat {}", path.display()), e))?;
    let size = metadata.len();

    if size <= budget {
        fingerprint_full(path)
    } else {
        fingerprint_bounded(path, &metadata, size)
    }
}

fn fingerprint_full(path: &Path) -> Result<Fingerprint> {
    let mut file = std::fs::File::open(path)
        .map_err(|e| Error::io_with_source(format!("open {}", path.display()), e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut buf)
            .map_err(|e| Error::io_with_source(format!("read {}", path.display()), e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(Fingerprint(format!("sha256:{}", hex::encode(hasher.finalize()))))
}

fn fingerprint_bounded(path: &Path, metadata: &std::fs::Metadata, size: u64) -> Result<Fingerprint> {
    let mut file = std::fs::File::open(path)
        .map_err(|e| Error::io_with_source(format!("open {}", path.display()), e))?;

    let window = FINGERPRINT_WINDOW_BYTES.min(size as usize / 2);
    let mut head = vec![0u8; window];
    file.read_exact(&mut head)
        .map_err(|e| Error::io_with_source(format!("read head of {}", path.display()), e))?;

    file.seek(SeekFrom::End(-(window as i64)))
        .map_err(|e| Error::io_with_source(format!("seek {}", path.display()), e))?;
    let mut tail = vec![0u8; window];
    file.read_exact(&mut tail)
        .map_err(|e| Error::io_with_source(format!("read tail of {}", path.display()), e))?;

    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs());

    let head_hash = seahash::hash(&head);
    let tail_hash = seahash::hash(&tail);
    Ok(Fingerprint(format!(
        "bounded:{head_hash:016x}{tail_hash:016x}:{size}:{mtime}"
    )))
}

/// Fingerprint in-memory content (used for rename matching in tests)
#[must_use]
pub fn fingerprint_bytes(content: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(content);
    Fingerprint(format!("sha256:{}", hex::encode(hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_content_same_fingerprint() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, "identical content").expect("write");
        std::fs::write(&b, "identical content").expect("write");

        let budget = 1024 * 1024;
        assert_eq!(
            fingerprint_file(&a, budget).expect("fp a"),
            fingerprint_file(&b, budget).expect("fp b")
        );
    }

    #[test]
    fn changed_content_changes_fingerprint() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "before").expect("write");
        let first = fingerprint_file(&path, 1024).expect("fp");
        std::fs::write(&path, "after!").expect("write");
        let second = fingerprint_file(&path, 1024).expect("fp");
        assert_ne!(first, second);
    }

    #[test]
    fn large_file_uses_bounded_form() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("big.bin");
        std::fs::write(&path, vec![7u8; 4096]).expect("write");

        let fp = fingerprint_file(&path, 1024).expect("fp");
        assert!(fp.as_str().starts_with("bounded:"));
    }

    #[test]
    fn small_file_uses_full_form() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("small.txt");
        std::fs::write(&path, "tiny").expect("write");

        let fp = fingerprint_file(&path, 1024).expect("fp");
        assert!(fp.as_str().starts_with("sha256:"));
        assert_eq!(fp, fingerprint_bytes(b"tiny"));
    }
}
