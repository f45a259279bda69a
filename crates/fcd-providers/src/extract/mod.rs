//! Text extractors
//!
//! Document-format parsing is specified as an external collaborator; the
//! implementations bundled here cover the plain-text family so the daemon
//! is usable out of the box. Richer formats (PDF, Office) plug in behind
//! the same [`TextExtractor`] port.

mod markdown;
mod plain;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use fcd_domain::entities::ExtractedText;
use fcd_domain::error::Result;
use fcd_domain::ports::TextExtractor;

pub use markdown::MarkdownExtractor;
pub use plain::PlainTextExtractor;

/// Routes a file to the first extractor that supports its format
pub struct CompositeExtractor {
    extractors: Vec<Arc<dyn TextExtractor>>,
}

impl CompositeExtractor {
    /// The default extractor set: Markdown, then plain text
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            extractors: vec![
                Arc::new(MarkdownExtractor::new()),
                Arc::new(PlainTextExtractor::new()),
            ],
        }
    }

    /// Compose an explicit extractor list, tried in order
    #[must_use]
    pub fn new(extractors: Vec<Arc<dyn TextExtractor>>) -> Self {
        Self { extractors }
    }

    fn route(&self, path: &Path) -> Option<&Arc<dyn TextExtractor>> {
        self.extractors.iter().find(|e| e.supports(path))
    }
}

#[async_trait]
impl TextExtractor for CompositeExtractor {
    fn supports(&self, path: &Path) -> bool {
        self.route(path).is_some()
    }

    async fn extract(&self, path: &Path) -> Result<ExtractedText> {
        match self.route(path) {
            Some(extractor) => extractor.extract(path).await,
            None => Err(fcd_domain::Error::extraction(format!(
                "no extractor for {}",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn routes_by_extension() {
        let composite = CompositeExtractor::with_defaults();
        assert!(composite.supports(Path::new("notes.md")));
        assert!(composite.supports(Path::new("notes.txt")));
        assert!(!composite.supports(Path::new("image.png")));
    }

    #[tokio::test]
    async fn unsupported_format_is_an_extraction_error() {
        let composite = CompositeExtractor::with_defaults();
        let err = composite
            .extract(Path::new("image.png"))
            .await
            .expect_err("png must not extract");
        assert!(err.to_string().contains("no extractor"));
    }
}
