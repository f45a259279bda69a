//! Progress tracking
//!
//! Counters are monotone within one scan generation; a new generation
//! resets them. The ETA is a simple throughput projection and disappears
//! while no rate is measurable.

use std::time::Instant;

use fcd_domain::entities::FolderProgress;
use fcd_domain::ids::ScanGeneration;

/// Monotone per-generation progress counters
#[derive(Debug)]
pub struct ProgressTracker {
    generation: ScanGeneration,
    files_total: u64,
    files_done: u64,
    chunks_done: u64,
    started: Instant,
}

impl ProgressTracker {
    /// Fresh tracker for a new scan generation
    #[must_use]
    pub fn new(generation: ScanGeneration, files_total: u64) -> Self {
        Self {
            generation,
            files_total,
            files_done: 0,
            chunks_done: 0,
            started: Instant::now(),
        }
    }

    /// The generation these counters belong to
    #[must_use]
    pub fn generation(&self) -> ScanGeneration {
        self.generation
    }

    /// Record one finished file (done, failed or skipped all count)
    pub fn file_finished(&mut self, chunks: u64) {
        self.files_done = (self.files_done + 1).min(self.files_total);
        self.chunks_done += chunks;
    }

    /// Late-found work grows the total, never shrinks it
    pub fn grow_total(&mut self, extra: u64) {
        self.files_total += extra;
    }

    /// Snapshot as the FMDM progress record
    #[must_use]
    pub fn snapshot(&self) -> FolderProgress {
        FolderProgress {
            files_total: self.files_total,
            files_done: self.files_done,
            chunks_done: self.chunks_done,
            eta_seconds: self.eta_seconds(),
        }
    }

    fn eta_seconds(&self) -> Option<u64> {
        if self.files_done == 0 || self.files_done >= self.files_total {
            return None;
        }
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed < 1.0 {
            return None;
        }
        let rate = self.files_done as f64 / elapsed;
        let remaining = (self.files_total - self.files_done) as f64;
        Some((remaining / rate).ceil() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_monotone_and_bounded() {
        let mut tracker = ProgressTracker::new(ScanGeneration(1), 3);
        let mut last_done = 0;
        for _ in 0..5 {
            tracker.file_finished(2);
            let snap = tracker.snapshot();
            assert!(snap.files_done >= last_done);
            assert!(snap.files_done <= snap.files_total);
            last_done = snap.files_done;
        }
        assert_eq!(tracker.snapshot().chunks_done, 10);
    }

    #[test]
    fn no_eta_before_first_file_or_after_completion() {
        let mut tracker = ProgressTracker::new(ScanGeneration(1), 2);
        assert_eq!(tracker.snapshot().eta_seconds, None);
        tracker.file_finished(1);
        tracker.file_finished(1);
        assert_eq!(tracker.snapshot().eta_seconds, None);
    }
}
