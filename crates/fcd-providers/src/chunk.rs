//! Paragraph-aware overlapping chunker
//!
//! # Overview
//! Splits extracted text into chunks around a token-estimate target with a
//! fixed overlap, respecting paragraph boundaries where possible. Chunk
//! ids are ordinals within the document; content hashes are not used
//! because two chunks with identical text in one document are legal.
//! Paragraph boundaries win over page boundaries when both exist.

use unicode_segmentation::UnicodeSegmentation;

use fcd_domain::entities::{ChunkDraft, PageOffset};
use fcd_domain::ports::Chunker;

/// Estimate tokens for a text slice: `tokens = words * 4 / 3`, rounded up.
#[must_use]
pub fn estimate_tokens(text: &str) -> u32 {
    let words = text.unicode_words().count() as u32;
    (words * 4).div_ceil(3)
}

/// One source region feeding the packer: a paragraph, or a slice of an
/// oversized paragraph
#[derive(Debug, Clone, Copy)]
struct Segment {
    start: usize,
    end: usize,
    tokens: u32,
}

/// Paragraph-packing chunker with token-estimate targets
pub struct ParagraphChunker {
    target_tokens: u32,
    overlap_tokens: u32,
}

impl ParagraphChunker {
    /// Chunker with explicit target and overlap (overlap < target)
    #[must_use]
    pub fn new(target_tokens: u32, overlap_tokens: u32) -> Self {
        Self {
            target_tokens: target_tokens.max(16),
            overlap_tokens: overlap_tokens.min(target_tokens / 2),
        }
    }

    /// Blank-line separated paragraph ranges
    fn paragraphs(text: &str) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        let mut start: Option<usize> = None;
        let mut offset = 0usize;
        for line in text.split_inclusive('\n') {
            if line.trim().is_empty() {
                if let Some(s) = start.take() {
                    out.push((s, offset));
                }
            } else if start.is_none() {
                start = Some(offset);
            }
            offset += line.len();
        }
        if let Some(s) = start {
            out.push((s, text.len()));
        }
        out
    }

    /// Split a paragraph exceeding the target into word-boundary windows
    fn split_oversized(&self, text: &str, start: usize, end: usize, out: &mut Vec<Segment>) {
        let slice = &text[start..end];
        let mut window_start = 0usize;
        let mut window_tokens = 0u32;
        let mut last_boundary = 0usize;

        for (idx, word) in slice.unicode_word_indices() {
            window_tokens += 1;
            last_boundary = idx + word.len();
            if window_tokens * 4 / 3 >= self.target_tokens {
                out.push(Segment {
                    start: start + window_start,
                    end: start + last_boundary,
                    tokens: (window_tokens * 4).div_ceil(3),
                });
                window_start = last_boundary;
                window_tokens = 0;
            }
        }
        if window_tokens > 0 {
            out.push(Segment {
                start: start + window_start,
                end,
                tokens: (window_tokens * 4).div_ceil(3),
            });
        }
    }

    fn segments(&self, text: &str) -> Vec<Segment> {
        let mut segments = Vec::new();
        for (start, end) in Self::paragraphs(text) {
            let tokens = estimate_tokens(&text[start..end]);
            if tokens == 0 {
                continue;
            }
            if tokens > self.target_tokens {
                self.split_oversized(text, start, end, &mut segments);
            } else {
                segments.push(Segment { start, end, tokens });
            }
        }
        segments
    }
}

impl Chunker for ParagraphChunker {
    fn chunk(&self, text: &str, _pages: &[PageOffset]) -> Vec<ChunkDraft> {
        let segments = self.segments(text);
        if segments.is_empty() {
            return Vec::new();
        }

        let mut drafts: Vec<ChunkDraft> = Vec::new();
        let mut current: Vec<Segment> = Vec::new();
        let mut current_tokens = 0u32;

        let mut emit = |current: &mut Vec<Segment>, current_tokens: &mut u32| {
            let Some(first) = current.first() else {
                return;
            };
            let Some(last) = current.last() else {
                return;
            };
            let (start, end) = (first.start, last.end);
            let chunk_text = text[start..end].trim_end().to_owned();
            drafts.push(ChunkDraft {
                chunk_index: drafts.len() as u32,
                start_offset: start,
                end_offset: end,
                token_estimate: estimate_tokens(&chunk_text),
                text: chunk_text,
            });

            // Carry trailing segments worth the overlap into the next chunk
            let mut kept = Vec::new();
            let mut kept_tokens = 0u32;
            for segment in current.iter().rev() {
                if kept_tokens >= self.overlap_tokens {
                    break;
                }
                kept_tokens += segment.tokens;
                kept.push(*segment);
            }
            // Never carry everything forward or packing cannot progress
            if kept.len() == current.len() {
                kept.pop();
                if let Some(dropped) = current.first() {
                    kept_tokens = kept_tokens.saturating_sub(dropped.tokens);
                }
            }
            kept.reverse();
            *current = kept;
            *current_tokens = kept_tokens;
        };

        for segment in segments {
            if current_tokens + segment.tokens > self.target_tokens && !current.is_empty() {
                emit(&mut current, &mut current_tokens);
            }
            current_tokens += segment.tokens;
            current.push(segment);
        }
        if !current.is_empty() {
            emit(&mut current, &mut current_tokens);
        }

        drafts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker() -> ParagraphChunker {
        ParagraphChunker::new(100, 20)
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunker().chunk("", &[]).is_empty());
        assert!(chunker().chunk("   \n\n  ", &[]).is_empty());
    }

    #[test]
    fn small_text_is_one_chunk() {
        let drafts = chunker().chunk("hello world, a short note", &[]);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].chunk_index, 0);
        assert_eq!(drafts[0].start_offset, 0);
    }

    #[test]
    fn chunk_ids_are_consecutive_ordinals() {
        let paragraph = "alpha beta gamma delta epsilon zeta eta theta. ".repeat(8);
        let text = (0..10).map(|_| paragraph.clone()).collect::<Vec<_>>().join("\n\n");
        let drafts = chunker().chunk(&text, &[]);
        assert!(drafts.len() > 1);
        for (i, draft) in drafts.iter().enumerate() {
            assert_eq!(draft.chunk_index, i as u32);
        }
    }

    #[test]
    fn adjacent_chunks_overlap() {
        let paragraph = "one two three four five six seven eight nine ten. ".repeat(4);
        let text = (0..12).map(|_| paragraph.clone()).collect::<Vec<_>>().join("\n\n");
        let drafts = chunker().chunk(&text, &[]);
        assert!(drafts.len() > 1);
        for pair in drafts.windows(2) {
            assert!(
                pair[1].start_offset < pair[0].end_offset,
                "chunk {} does not overlap its predecessor",
                pair[1].chunk_index
            );
        }
    }

    #[test]
    fn offsets_index_into_source_text() {
        let text = "first paragraph here.\n\nsecond paragraph follows.";
        let drafts = chunker().chunk(text, &[]);
        for draft in &drafts {
            let slice = &text[draft.start_offset..draft.end_offset];
            assert!(slice.starts_with(draft.text.trim_end_matches('\n').split('\n').next().unwrap_or("")));
        }
    }

    #[test]
    fn oversized_paragraph_is_split() {
        let text = "word ".repeat(1000);
        let drafts = chunker().chunk(&text, &[]);
        assert!(drafts.len() > 3);
        for draft in &drafts {
            assert!(draft.token_estimate <= 160, "chunk too large: {}", draft.token_estimate);
        }
    }

    #[test]
    fn identical_paragraphs_get_distinct_ids() {
        let paragraph = "repeat me ".repeat(40);
        let text = format!("{paragraph}\n\n{paragraph}\n\n{paragraph}");
        let drafts = chunker().chunk(&text, &[]);
        let mut ids: Vec<u32> = drafts.iter().map(|d| d.chunk_index).collect();
        ids.dedup();
        assert_eq!(ids.len(), drafts.len());
    }
}
