//! Text-extraction collaborator port
//!
//! Document-format parsing is an external collaborator: the daemon only
//! depends on this interface. The bundled implementations cover the
//! plain-text family; richer formats plug in behind the same trait.

use std::path::Path;

use async_trait::async_trait;

use crate::entities::ExtractedText;
use crate::error::Result;

/// Produces plain text plus page offsets from a file on disk
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Whether this extractor handles the file's format
    fn supports(&self, path: &Path) -> bool;

    /// Extract text and page offsets.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Extraction`] on parse failure; recorded against the
    /// file, never promoted to a folder-level failure.
    async fn extract(&self, path: &Path) -> Result<ExtractedText>;
}
