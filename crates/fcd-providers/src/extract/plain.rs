//! Plain-text extractor

use std::path::Path;

use async_trait::async_trait;

use fcd_domain::Error;
use fcd_domain::entities::{ExtractedText, PageOffset};
use fcd_domain::error::Result;
use fcd_domain::ports::TextExtractor;

const EXTENSIONS: &[&str] = &["txt", "text", "log", "csv", "tsv", "rst", "org"];

/// Reads a file as UTF-8 text (lossy on invalid sequences).
///
/// Form feeds are the only page concept plain text has; when present they
/// become page boundaries, otherwise the document is pageless.
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    /// Construct the extractor
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for PlainTextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    fn supports(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
    }

    async fn extract(&self, path: &Path) -> Result<ExtractedText> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Error::extraction(format!("read {}: {e}", path.display())))?;
        let text = String::from_utf8_lossy(&bytes).into_owned();

        let mut pages = Vec::new();
        if text.contains('\u{c}') {
            let mut offset = 0usize;
            for (i, segment) in text.split('\u{c}').enumerate() {
                pages.push(PageOffset {
                    page: (i + 1) as u32,
                    offset,
                });
                offset += segment.len() + 1;
            }
        }

        Ok(ExtractedText {
            text,
            pages,
            language_hint: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn extracts_text_and_form_feed_pages() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, "page one\u{c}page two").expect("write");

        let extractor = PlainTextExtractor::new();
        let out = extractor.extract(&path).await.expect("extract");
        assert!(out.text.starts_with("page one"));
        assert_eq!(out.pages.len(), 2);
        assert_eq!(out.pages[1].page, 2);
    }

    #[tokio::test]
    async fn pageless_without_form_feeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, "just text").expect("write");

        let out = PlainTextExtractor::new()
            .extract(&path)
            .await
            .expect("extract");
        assert!(out.pages.is_empty());
    }
}
