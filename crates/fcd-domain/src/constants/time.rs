//! Timing constants

/// Hardware-profile cache TTL in seconds (one hour)
pub const PROBE_CACHE_TTL_SECS: u64 = 60 * 60;

/// Watcher debounce window in milliseconds
pub const WATCH_DEBOUNCE_MS: u64 = 1_000;

/// FMDM progress tick interval while indexing, in milliseconds
pub const FMDM_TICK_MS: u64 = 1_000;

/// Base delay for exponential backoff, in milliseconds
pub const BACKOFF_BASE_MS: u64 = 250;

/// Backoff delay ceiling, in milliseconds
pub const BACKOFF_CAP_MS: u64 = 15_000;

/// Bounded attempts for retryable operations
pub const BACKOFF_MAX_ATTEMPTS: u32 = 5;

/// Total model-download timeout in seconds. Stall detection happens at
/// the hf-hub transfer layer; this bound catches everything it misses.
pub const MODEL_DOWNLOAD_TIMEOUT_SECS: u64 = 15 * 60;

/// Default soft deadline for search requests, in milliseconds
pub const SEARCH_DEADLINE_MS: u64 = 5_000;
