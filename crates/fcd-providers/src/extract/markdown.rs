//! Markdown extractor
//!
//! Walks pulldown-cmark events and keeps the rendered text: headings and
//! paragraphs become blank-line-separated blocks so the chunker's
//! paragraph detection keeps working, code blocks are preserved verbatim,
//! markup syntax is dropped.

use std::path::Path;

use async_trait::async_trait;
use pulldown_cmark::{Event, Parser, Tag, TagEnd};

use fcd_domain::Error;
use fcd_domain::entities::ExtractedText;
use fcd_domain::error::Result;
use fcd_domain::ports::TextExtractor;

const EXTENSIONS: &[&str] = &["md", "markdown", "mdown"];

/// Markdown-to-plain-text extractor
pub struct MarkdownExtractor;

impl MarkdownExtractor {
    /// Construct the extractor
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn render(source: &str) -> String {
        let mut out = String::with_capacity(source.len());
        for event in Parser::new(source) {
            match event {
                Event::Text(text) | Event::Code(text) => out.push_str(&text),
                Event::SoftBreak => out.push(' '),
                Event::HardBreak => out.push('\n'),
                Event::Start(Tag::Item) => out.push_str("- "),
                Event::End(
                    TagEnd::Paragraph
                    | TagEnd::Heading(_)
                    | TagEnd::Item
                    | TagEnd::CodeBlock
                    | TagEnd::BlockQuote(_),
                ) => out.push_str("\n\n"),
                _ => {}
            }
        }
        while out.ends_with('\n') {
            out.pop();
        }
        out
    }
}

impl Default for MarkdownExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextExtractor for MarkdownExtractor {
    fn supports(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
    }

    async fn extract(&self, path: &Path) -> Result<ExtractedText> {
        let source = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::extraction(format!("read {}: {e}", path.display())))?;
        Ok(ExtractedText {
            text: Self::render(&source),
            pages: Vec::new(),
            language_hint: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markup_keeps_text() {
        let text = MarkdownExtractor::render("# Title\n\nSome *bold* claim.\n\n- one\n- two\n");
        assert!(text.contains("Title"));
        assert!(text.contains("Some bold claim."));
        assert!(text.contains("- one"));
        assert!(!text.contains('*'));
        assert!(!text.contains('#'));
    }

    #[test]
    fn blocks_are_blank_line_separated() {
        let text = MarkdownExtractor::render("# Title\n\nParagraph.");
        assert!(text.contains("\n\n"));
    }
}
