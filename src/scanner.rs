//! One-time enumeration of files already present in the watch roots at startup.
//!
//! Files found here are assumed to be fully written and skip the stability check; they go
//! through the same validation and ready callback as live events.

use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::file_record::FileRecord;

/// Counts from one scan pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    pub files_seen: usize,
    pub files_ready: usize,
    pub errors: usize,
}

#[derive(Debug, Clone)]
pub struct DirectoryScanner {
    config: Arc<Config>,
}

impl DirectoryScanner {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Scans every configured watch root.
    pub fn scan_all(&self, on_ready: &dyn Fn(FileRecord)) -> ScanSummary {
        info!("Performing initial scan of existing files...");
        let mut total = ScanSummary::default();
        for root in &self.config.watch_directories {
            if !root.exists() {
                warn!(path = %root.display(), "Watch directory does not exist, skipping scan");
                continue;
            }
            let summary = self.scan_root(root, on_ready);
            total.files_seen += summary.files_seen;
            total.files_ready += summary.files_ready;
            total.errors += summary.errors;
        }
        info!(
            files_seen = total.files_seen,
            files_ready = total.files_ready,
            errors = total.errors,
            "Initial scan completed"
        );
        total
    }

    /// Scans a single root, descending only if recursion is enabled.
    ///
    /// Symlinks are followed, matching how live events stat their targets. Unreadable
    /// subdirectories and link loops are logged and their subtree skipped.
    pub fn scan_root(&self, root: &Path, on_ready: &dyn Fn(FileRecord)) -> ScanSummary {
        let mut walker = WalkDir::new(root).min_depth(1).follow_links(true);
        if !self.config.watch_recursive {
            walker = walker.max_depth(1);
        }

        let mut summary = ScanSummary::default();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(path = ?e.path(), error = %e, "Cannot access directory entry");
                    summary.errors += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            summary.files_seen += 1;
            let record = FileRecord::capture(entry.path());
            if record.is_valid(&self.config) {
                info!(%record, "Found existing file");
                summary.files_ready += 1;
                on_ready(record);
            }
        }
        summary
    }
}
