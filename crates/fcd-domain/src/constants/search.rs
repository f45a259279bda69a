//! Search and re-ranking constants

/// Default ANN candidate count before re-ranking
pub const DEFAULT_TOP_K: usize = 50;

/// Default chunk budget per search response
pub const DEFAULT_RESULT_CHUNK_BUDGET: usize = 10;

/// Default aggregate token budget per search response
pub const DEFAULT_RESULT_TOKEN_BUDGET: u32 = 4_000;

/// Boost added when a query term matches a chunk key phrase
pub const KEY_PHRASE_BOOST: f32 = 0.05;

/// Default weight of the recency factor in the composite score
pub const DEFAULT_RECENCY_WEIGHT: f32 = 0.05;

/// Default recency half-life in days
pub const DEFAULT_RECENCY_HALF_LIFE_DAYS: f32 = 30.0;

/// Chunks below this readability contribute a small penalty
pub const READABILITY_FLOOR: f32 = 0.15;

/// Documents considered by the literal substring fallback
pub const FALLBACK_DOCUMENT_LIMIT: usize = 50;

/// Neighbor chunks included on each side of a hit for context
pub const NEIGHBOR_WINDOW: usize = 1;
