//! Key phrases, topics and readability
//!
//! # Overview
//! Frequency-based semantic extraction over one chunk: scored non-stopword
//! unigrams and bigrams become key phrases (1..=10), the strongest
//! single-word phrases double as topic tags (≤5), and a Flesch-style
//! reading-ease estimate clamped to `[0, 1]` becomes the readability
//! score. The same machinery backs `fallback_phrases`, which the pipeline
//! substitutes whenever a primary extraction yields no phrases; a chunk
//! is never written with an empty key-phrase list.

use std::collections::HashMap;

use unicode_segmentation::UnicodeSegmentation;

use fcd_domain::constants::indexing::{FALLBACK_KEY_PHRASES, MAX_KEY_PHRASES, MAX_TOPICS};
use fcd_domain::entities::SemanticMetadata;
use fcd_domain::error::Result;
use fcd_domain::ports::SemanticExtractor;

/// English stopwords filtered out of phrase candidates
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "can", "could", "did", "do",
    "does", "for", "from", "had", "has", "have", "he", "her", "his", "how", "i", "if", "in",
    "into", "is", "it", "its", "may", "me", "more", "most", "my", "no", "not", "of", "on", "or",
    "our", "she", "should", "so", "some", "such", "than", "that", "the", "their", "them", "then",
    "there", "these", "they", "this", "to", "up", "us", "was", "we", "were", "what", "when",
    "where", "which", "while", "who", "will", "with", "would", "you", "your",
];

fn is_stopword(word: &str) -> bool {
    STOPWORDS.binary_search(&word).is_ok()
}

/// Frequency-scored phrase extractor
pub struct FrequencySemanticExtractor;

impl FrequencySemanticExtractor {
    /// Construct the extractor
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Lowercased word stream with stopwords still present (bigrams need
    /// positional adjacency)
    fn words(text: &str) -> Vec<String> {
        text.unicode_words()
            .map(|w| w.to_lowercase())
            .filter(|w| w.chars().any(char::is_alphanumeric))
            .collect()
    }

    /// Score candidate phrases: frequency weighted by phrase length, so a
    /// repeated bigram outranks its constituent unigrams
    fn ranked_phrases(words: &[String], limit: usize) -> Vec<String> {
        let mut scores: HashMap<String, f32> = HashMap::new();

        for word in words {
            if !is_stopword(word) && word.len() > 2 {
                *scores.entry(word.clone()).or_default() += 1.0;
            }
        }
        for pair in words.windows(2) {
            if !is_stopword(&pair[0]) && !is_stopword(&pair[1]) {
                let bigram = format!("{} {}", pair[0], pair[1]);
                *scores.entry(bigram).or_default() += 1.8;
            }
        }

        let mut ranked: Vec<(String, f32)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.into_iter().take(limit).map(|(p, _)| p).collect()
    }

    /// Flesch-style reading ease mapped onto `[0, 1]`
    fn readability(text: &str) -> f32 {
        let words: Vec<&str> = text.unicode_words().collect();
        if words.is_empty() {
            return 0.0;
        }
        let sentences = text
            .split(['.', '!', '?'])
            .filter(|s| !s.trim().is_empty())
            .count()
            .max(1);
        let syllables: usize = words.iter().map(|w| estimate_syllables(w)).sum();

        let words_per_sentence = words.len() as f32 / sentences as f32;
        let syllables_per_word = syllables as f32 / words.len() as f32;
        let flesch = 206.835 - 1.015 * words_per_sentence - 84.6 * syllables_per_word;
        (flesch / 100.0).clamp(0.0, 1.0)
    }
}

/// Vowel-group syllable estimate; silent trailing 'e' discounted
fn estimate_syllables(word: &str) -> usize {
    let lower = word.to_lowercase();
    let mut count = 0usize;
    let mut prev_vowel = false;
    for c in lower.chars() {
        let vowel = matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
        if vowel && !prev_vowel {
            count += 1;
        }
        prev_vowel = vowel;
    }
    if lower.ends_with('e') && count > 1 {
        count -= 1;
    }
    count.max(1)
}

impl Default for FrequencySemanticExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticExtractor for FrequencySemanticExtractor {
    fn extract(&self, text: &str) -> Result<SemanticMetadata> {
        let words = Self::words(text);
        let key_phrases = Self::ranked_phrases(&words, MAX_KEY_PHRASES);
        let topics = key_phrases
            .iter()
            .filter(|p| !p.contains(' '))
            .take(MAX_TOPICS)
            .cloned()
            .collect();

        Ok(SemanticMetadata {
            key_phrases,
            topics,
            readability: Self::readability(text),
        })
    }

    fn fallback_phrases(&self, text: &str) -> Vec<String> {
        let words = Self::words(text);
        let mut phrases = Self::ranked_phrases(&words, FALLBACK_KEY_PHRASES);
        if phrases.is_empty() {
            // Stopword-only or symbol-only chunk: take the raw leading
            // words so the storage invariant still holds
            phrases = words.into_iter().take(FALLBACK_KEY_PHRASES).collect();
        }
        if phrases.is_empty() && !text.trim().is_empty() {
            let head: String = text.trim().chars().take(32).collect();
            phrases.push(head);
        }
        phrases
    }
}
