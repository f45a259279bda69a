//! Chunking and pipeline constants

/// Target chunk size in estimated tokens
pub const CHUNK_TARGET_TOKENS: u32 = 500;

/// Overlap between adjacent chunks in estimated tokens
pub const CHUNK_OVERLAP_TOKENS: u32 = 50;

/// Upper bound on key phrases per chunk
pub const MAX_KEY_PHRASES: usize = 10;

/// Upper bound on topic tags per chunk
pub const MAX_TOPICS: usize = 5;

/// Fallback key phrases synthesized when the extractor yields none
pub const FALLBACK_KEY_PHRASES: usize = 5;

/// Default batch ceiling by chunk count
pub const MAX_BATCH_CHUNKS: usize = 32;

/// Default batch ceiling by total text bytes
pub const MAX_BATCH_BYTES: usize = 256 * 1024;

/// Full-content hashing budget; larger files get the bounded fingerprint
pub const FINGERPRINT_FULL_HASH_BUDGET: u64 = 8 * 1024 * 1024;

/// Window size for the bounded head+tail fingerprint
pub const FINGERPRINT_WINDOW_BYTES: usize = 256 * 1024;
