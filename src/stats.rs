//! Thread-safe processing counters.

use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::dedup::lock;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Counters {
    total: u64,
    successful: u64,
    failed: u64,
    skipped: u64,
    archived: u64,
}

/// Point-in-time copy of [`ProcessingStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_files: u64,
    pub successful_uploads: u64,
    pub failed_uploads: u64,
    pub skipped_files: u64,
    pub archived_files: u64,
    pub runtime: Duration,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Processing Stats - Total: {}, Success: {}, Failed: {}, Skipped: {}, Archived: {}, Runtime: {:.1}s",
            self.total_files,
            self.successful_uploads,
            self.failed_uploads,
            self.skipped_files,
            self.archived_files,
            self.runtime.as_secs_f64()
        )
    }
}

/// Counters for one processor lifetime. Every increment and read takes the same lock.
#[derive(Debug)]
pub struct ProcessingStats {
    counters: Mutex<Counters>,
    started: Instant,
}

impl Default for ProcessingStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStats {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
            started: Instant::now(),
        }
    }

    pub fn increment_total(&self) {
        lock(&self.counters).total += 1;
    }

    pub fn increment_success(&self) {
        lock(&self.counters).successful += 1;
    }

    pub fn increment_failed(&self) {
        lock(&self.counters).failed += 1;
    }

    pub fn increment_skipped(&self) {
        lock(&self.counters).skipped += 1;
    }

    pub fn increment_archived(&self) {
        lock(&self.counters).archived += 1;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let counters = *lock(&self.counters);
        StatsSnapshot {
            total_files: counters.total,
            successful_uploads: counters.successful,
            failed_uploads: counters.failed,
            skipped_files: counters.skipped,
            archived_files: counters.archived,
            runtime: self.started.elapsed(),
        }
    }

    pub fn summary(&self) -> String {
        self.snapshot().to_string()
    }
}
