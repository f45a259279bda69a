//! Bounded exponential backoff with jitter

use std::time::Duration;

use rand::RngExt;

use fcd_domain::constants::time::{BACKOFF_BASE_MS, BACKOFF_CAP_MS, BACKOFF_MAX_ATTEMPTS};

/// Backoff schedule: `base * 2^attempt` capped, with up to 25% jitter
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    /// Bounded attempt count
    pub max_attempts: u32,
}

impl Backoff {
    /// Schedule with explicit parameters
    #[must_use]
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap,
            max_attempts,
        }
    }

    /// Delay before retry number `attempt` (0-based)
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
            .min(self.cap);
        let jitter_budget = exp.as_millis() as u64 / 4;
        let jitter = if jitter_budget == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_budget)
        };
        exp + Duration::from_millis(jitter)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(BACKOFF_BASE_MS),
            cap: Duration::from_millis(BACKOFF_CAP_MS),
            max_attempts: BACKOFF_MAX_ATTEMPTS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_and_cap() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(800), 6);
        let d0 = backoff.delay(0);
        let d3 = backoff.delay(3);
        assert!(d0 >= Duration::from_millis(100));
        assert!(d0 <= Duration::from_millis(125));
        // attempt 3 would be 800ms uncapped; cap plus jitter bounds it
        assert!(d3 >= Duration::from_millis(800));
        assert!(d3 <= Duration::from_millis(1_000));
    }

    #[test]
    fn huge_attempt_does_not_overflow() {
        let backoff = Backoff::default();
        let d = backoff.delay(u32::MAX);
        assert!(d <= Duration::from_millis(BACKOFF_CAP_MS + BACKOFF_CAP_MS / 4));
    }
}
