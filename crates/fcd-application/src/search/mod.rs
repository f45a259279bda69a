//! Query execution and re-ranking
//!
//! # Overview
//! A query flows embed → ANN top-K → composite re-rank → assembly. The
//! composite score blends cosine similarity (primary) with a key-phrase
//! term boost, a tunable recency factor and a readability floor. Results
//! are assembled with neighbor-chunk context and cut to the per-request
//! budget (chunk count and aggregate token estimate) with an explicit
//! truncation flag. When query embedding fails the engine serves a
//! literal substring scan over the most recent documents, marked as a
//! fallback; it never lets a tool call crash.

mod rerank;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use fcd_domain::constants::search::{FALLBACK_DOCUMENT_LIMIT, NEIGHBOR_WINDOW};
use fcd_domain::entities::{ChunkRecord, DocumentRecord};
use fcd_domain::error::Result;
use fcd_domain::ids::DocumentId;
use fcd_domain::ports::{EmbeddingProvider, FolderStore};

pub use rerank::{CompositeScore, rank_candidates};

/// Tunables, wired from `[search]` configuration
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// ANN candidate count before re-ranking
    pub top_k: usize,
    /// Response budget by chunk count
    pub chunk_budget: usize,
    /// Response budget by aggregate token estimate
    pub token_budget: u32,
    /// Weight of the recency factor
    pub recency_weight: f32,
    /// Recency half-life in days
    pub recency_half_life_days: f32,
    /// Chunks below this readability are slightly penalized
    pub readability_floor: f32,
    /// Soft deadline for the whole request
    pub deadline: Duration,
}

impl Default for SearchParams {
    fn default() -> Self {
        use fcd_domain::constants::{search, time};
        Self {
            top_k: search::DEFAULT_TOP_K,
            chunk_budget: search::DEFAULT_RESULT_CHUNK_BUDGET,
            token_budget: search::DEFAULT_RESULT_TOKEN_BUDGET,
            recency_weight: search::DEFAULT_RECENCY_WEIGHT,
            recency_half_life_days: search::DEFAULT_RECENCY_HALF_LIFE_DAYS,
            readability_floor: search::READABILITY_FLOOR,
            deadline: Duration::from_millis(time::SEARCH_DEADLINE_MS),
        }
    }
}

/// One search request
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    /// Natural-language query
    pub query: String,
    /// Override of the ANN candidate count
    pub top_k: Option<usize>,
    /// Restrict to one document (relative path)
    pub document: Option<String>,
    /// Restrict to files with this extension (no dot)
    pub extension: Option<String>,
    /// Require these phrases among a chunk's key phrases
    pub require_phrases: Vec<String>,
}

/// One ranked hit
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    /// Document path relative to the folder root
    pub path: String,
    /// Page the chunk starts on, when the source has pages
    pub page: Option<u32>,
    /// Composite score, higher is better
    pub score: f32,
    /// Chunk ordinal within its document
    pub chunk_index: u32,
    /// The chunk text
    pub text: String,
    /// Neighbor chunk texts for context (window of 1 each side)
    pub context: Vec<String>,
    /// Query terms that matched the chunk's key phrases
    pub matched_phrases: Vec<String>,
}

/// Search response with its bookkeeping flags
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchResponse {
    /// Ranked hits, best first
    pub hits: Vec<SearchHit>,
    /// Budget or deadline cut results short
    pub truncated: bool,
    /// The literal substring fallback served this response
    pub fallback: bool,
    /// Diagnostic for empty or degraded responses
    pub reason: Option<String>,
}

/// The query engine; stateless besides its tunables
pub struct SearchEngine {
    params: SearchParams,
}

impl SearchEngine {
    /// Engine with the given tunables
    #[must_use]
    pub fn new(params: SearchParams) -> Self {
        Self { params }
    }

    /// Execute a search against one folder's store.
    ///
    /// # Errors
    ///
    /// Store access failures. Embedding failures do not error; they
    /// degrade to the marked substring fallback.
    pub async fn search(
        &self,
        store: &Arc<dyn FolderStore>,
        provider: &Arc<dyn EmbeddingProvider>,
        request: &SearchRequest,
    ) -> Result<SearchResponse> {
        let started = Instant::now();
        if request.query.trim().is_empty() {
            return Ok(SearchResponse {
                hits: Vec::new(),
                truncated: false,
                fallback: false,
                reason: Some("empty query".to_owned()),
            });
        }

        if store.embedding_count().await? == 0 {
            return Ok(SearchResponse {
                hits: Vec::new(),
                truncated: false,
                fallback: false,
                reason: Some("index is empty; no documents have been embedded yet".to_owned()),
            });
        }

        let query_vector = match provider.embed(std::slice::from_ref(&request.query)).await {
            Ok(mut vectors) if !vectors.is_empty() => vectors.remove(0),
            Ok(_) => return self.fallback_search(store, request, "embedder returned nothing").await,
            Err(e) => {
                warn!(error = %e, "query embedding failed; serving substring fallback");
                return self
                    .fallback_search(store, request, &format!("query embedding failed: {e}"))
                    .await;
            }
        };

        let top_k = request.top_k.unwrap_or(self.params.top_k).max(1);
        let candidates = store.ann_search(&query_vector, top_k).await?;
        if candidates.is_empty() {
            return Ok(SearchResponse {
                hits: Vec::new(),
                truncated: false,
                fallback: false,
                reason: Some("no vector candidates".to_owned()),
            });
        }

        // Load candidate chunks and their documents
        let mut chunks: Vec<(ChunkRecord, f32)> = Vec::with_capacity(candidates.len());
        let mut documents: HashMap<DocumentId, DocumentRecord> = HashMap::new();
        for hit in &candidates {
            if started.elapsed() > self.params.deadline {
                debug!("search deadline reached while loading candidates");
                break;
            }
            let Ok(chunk) = store.chunk(hit.key).await else {
                continue;
            };
            if let std::collections::hash_map::Entry::Vacant(entry) =
                documents.entry(hit.key.document_id)
            {
                match store.document(hit.key.document_id).await {
                    Ok(document) => {
                        entry.insert(document);
                    }
                    Err(_) => continue,
                }
            }
            chunks.push((chunk, hit.score));
        }

        // Post-filters
        chunks.retain(|(chunk, _)| {
            let Some(document) = documents.get(&chunk.key.document_id) else {
                return false;
            };
            if let Some(ref wanted) = request.document
                && &document.rel_path != wanted
            {
                return false;
            }
            if let Some(ref ext) = request.extension {
                let actual = std::path::Path::new(&document.rel_path)
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("");
                if !actual.eq_ignore_ascii_case(ext) {
                    return false;
                }
            }
            if !request.require_phrases.is_empty() {
                let phrases = &chunk.semantic.key_phrases;
                if !request
                    .require_phrases
                    .iter()
                    .all(|p| phrases.iter().any(|kp| kp.eq_ignore_ascii_case(p)))
                {
                    return false;
                }
            }
            true
        });

        let ranked = rank_candidates(&self.params, &request.query, chunks, &documents);

        // Assemble within budgets
        let mut hits = Vec::new();
        let mut spent_tokens = 0u32;
        let mut truncated = started.elapsed() > self.params.deadline;
        for scored in &ranked {
            if hits.len() >= self.params.chunk_budget
                || spent_tokens + scored.chunk.token_estimate > self.params.token_budget
            {
                truncated = true;
                break;
            }
            if started.elapsed() > self.params.deadline {
                truncated = true;
                break;
            }
            let document = match documents.get(&scored.chunk.key.document_id) {
                Some(document) => document,
                None => continue,
            };
            let context = match store
                .neighbor_chunks(scored.chunk.key, NEIGHBOR_WINDOW)
                .await
            {
                Ok(neighbors) => neighbors.into_iter().map(|n| n.text).collect(),
                Err(_) => Vec::new(),
            };
            spent_tokens += scored.chunk.token_estimate;
            hits.push(SearchHit {
                path: document.rel_path.clone(),
                page: page_for_offset(document, scored.chunk.start_offset),
                score: scored.score.total,
                chunk_index: scored.chunk.key.chunk_index,
                text: scored.chunk.text.clone(),
                context,
                matched_phrases: scored.matched_phrases.clone(),
            });
        }

        Ok(SearchResponse {
            hits,
            truncated,
            fallback: false,
            reason: None,
        })
    }

    /// Literal substring search over the most recently indexed documents;
    /// used when embedding is unavailable and for very short queries.
    async fn fallback_search(
        &self,
        store: &Arc<dyn FolderStore>,
        request: &SearchRequest,
        reason: &str,
    ) -> Result<SearchResponse> {
        let found = store
            .substring_scan(
                request.query.trim(),
                FALLBACK_DOCUMENT_LIMIT,
                self.params.chunk_budget,
            )
            .await?;
        let mut hits = Vec::with_capacity(found.len());
        for chunk in found {
            let Ok(document) = store.document(chunk.key.document_id).await else {
                continue;
            };
            hits.push(SearchHit {
                path: document.rel_path.clone(),
                page: page_for_offset(&document, chunk.start_offset),
                score: 0.0,
                chunk_index: chunk.key.chunk_index,
                text: chunk.text,
                context: Vec::new(),
                matched_phrases: Vec::new(),
            });
        }
        Ok(SearchResponse {
            hits,
            truncated: false,
            fallback: true,
            reason: Some(reason.to_owned()),
        })
    }

}

/// Page hint for a chunk: the last page starting at or before the chunk
fn page_for_offset(document: &DocumentRecord, offset: usize) -> Option<u32> {
    document.page_for_offset(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_are_consistent() {
        let params = SearchParams::default();
        assert!(params.top_k >= params.chunk_budget);
        assert!(params.recency_half_life_days > 0.0);
    }
}
