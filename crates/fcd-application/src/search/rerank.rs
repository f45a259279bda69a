//! Composite re-ranking
//!
//! Cosine similarity is primary; key-phrase matches add a small boost per
//! matched query term, recency contributes `weight * exp(-age/half_life)`
//! (tunable, defaults documented in DESIGN.md), and chunks below the
//! readability floor pay a small penalty. Scores are comparable only
//! within one response.

use std::collections::HashMap;

use fcd_domain::constants::search::KEY_PHRASE_BOOST;
use fcd_domain::entities::{ChunkRecord, DocumentRecord};
use fcd_domain::ids::DocumentId;

use super::SearchParams;

/// Score breakdown kept for diagnostics
#[derive(Debug, Clone, Copy)]
pub struct CompositeScore {
    /// Cosine similarity from the ANN stage
    pub cosine: f32,
    /// Key-phrase term boost
    pub phrase: f32,
    /// Recency contribution
    pub recency: f32,
    /// Readability penalty (≤ 0)
    pub readability_penalty: f32,
    /// Sum of the above
    pub total: f32,
}

/// A candidate after re-ranking
pub struct RankedChunk {
    /// The chunk
    pub chunk: ChunkRecord,
    /// Its composite score
    pub score: CompositeScore,
    /// Query terms found among the chunk's key phrases
    pub matched_phrases: Vec<String>,
}

/// Re-rank ANN candidates with the composite score, best first
#[must_use]
pub fn rank_candidates(
    params: &SearchParams,
    query: &str,
    candidates: Vec<(ChunkRecord, f32)>,
    documents: &HashMap<DocumentId, DocumentRecord>,
) -> Vec<RankedChunk> {
    let query_terms: Vec<String> = query
        .split_whitespace()
        .map(str::to_lowercase)
        .filter(|t| t.len() > 2)
        .collect();
    let now = chrono::Utc::now();

    let mut ranked: Vec<RankedChunk> = candidates
        .into_iter()
        .map(|(chunk, cosine)| {
            let matched_phrases: Vec<String> = query_terms
                .iter()
                .filter(|term| {
                    chunk
                        .semantic
                        .key_phrases
                        .iter()
                        .any(|phrase| phrase.to_lowercase().contains(term.as_str()))
                })
                .cloned()
                .collect();
            let phrase = KEY_PHRASE_BOOST * matched_phrases.len() as f32;

            let recency = documents
                .get(&chunk.key.document_id)
                .map_or(0.0, |document| {
                    let age_days = (now - document.extracted_at).num_seconds().max(0) as f32
                        / 86_400.0;
                    params.recency_weight * (-age_days / params.recency_half_life_days).exp()
                });

            let readability_penalty = if chunk.semantic.readability < params.readability_floor {
                -0.02
            } else {
                0.0
            };

            let score = CompositeScore {
                cosine,
                phrase,
                recency,
                readability_penalty,
                total: cosine + phrase + recency + readability_penalty,
            };
            RankedChunk {
                chunk,
                score,
                matched_phrases,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .total
            .partial_cmp(&a.score.total)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fcd_domain::entities::SemanticMetadata;
    use fcd_domain::ids::ChunkKey;

    fn chunk(doc: i64, idx: u32, phrases: &[&str], readability: f32) -> ChunkRecord {
        ChunkRecord {
            key: ChunkKey::new(DocumentId(doc), idx),
            start_offset: 0,
            end_offset: 10,
            token_estimate: 10,
            text: "text".to_owned(),
            semantic: SemanticMetadata {
                key_phrases: phrases.iter().map(|p| (*p).to_owned()).collect(),
                topics: vec![],
                readability,
            },
        }
    }

    fn document(id: i64, age_days: i64) -> DocumentRecord {
        DocumentRecord {
            id: DocumentId(id),
            rel_path: format!("doc{id}.txt"),
            text_len: 100,
            page_count: None,
            pages: vec![],
            language_hint: None,
            extracted_at: Utc::now() - chrono::Duration::days(age_days),
        }
    }

    #[test]
    fn phrase_match_outranks_equal_cosine() {
        let params = SearchParams::default();
        let documents: HashMap<DocumentId, DocumentRecord> =
            [(DocumentId(1), document(1, 1))].into();
        let candidates = vec![
            (chunk(1, 0, &["irrelevant"], 0.8), 0.70),
            (chunk(1, 1, &["retry budget"], 0.8), 0.70),
        ];
        let ranked = rank_candidates(&params, "retry semantics", candidates, &documents);
        assert_eq!(ranked[0].chunk.key.chunk_index, 1);
        assert_eq!(ranked[0].matched_phrases, vec!["retry".to_owned()]);
    }

    #[test]
    fn newer_document_wins_ties() {
        let params = SearchParams::default();
        let documents: HashMap<DocumentId, DocumentRecord> =
            [(DocumentId(1), document(1, 0)), (DocumentId(2), document(2, 300))].into();
        let candidates = vec![
            (chunk(2, 0, &[], 0.8), 0.70),
            (chunk(1, 0, &[], 0.8), 0.70),
        ];
        let ranked = rank_candidates(&params, "anything", candidates, &documents);
        assert_eq!(ranked[0].chunk.key.document_id, DocumentId(1));
    }

    #[test]
    fn unreadable_chunk_pays_penalty() {
        let params = SearchParams::default();
        let documents: HashMap<DocumentId, DocumentRecord> =
            [(DocumentId(1), document(1, 1))].into();
        let candidates = vec![
            (chunk(1, 0, &[], 0.05), 0.70),
            (chunk(1, 1, &[], 0.9), 0.70),
        ];
        let ranked = rank_candidates(&params, "anything", candidates, &documents);
        assert_eq!(ranked[0].chunk.key.chunk_index, 1);
        assert!(ranked[1].score.readability_penalty < 0.0);
    }

    #[test]
    fn cosine_dominates_boosts() {
        let params = SearchParams::default();
        let documents: HashMap<DocumentId, DocumentRecord> =
            [(DocumentId(1), document(1, 0))].into();
        let candidates = vec![
            (chunk(1, 0, &["query"], 0.9), 0.40),
            (chunk(1, 1, &[], 0.9), 0.90),
        ];
        let ranked = rank_candidates(&params, "query", candidates, &documents);
        assert_eq!(ranked[0].chunk.key.chunk_index, 1);
    }
}
