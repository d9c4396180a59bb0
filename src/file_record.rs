//! Snapshot of a candidate file at observation time.

use std::fmt;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

use crate::config::Config;

/// Identity of a file (path, size, mtime) captured once when it was detected.
///
/// A record is never mutated; capture again to observe a newer state. A `size_bytes` or
/// `modified_time` of zero means the file could not be stat'ed at capture time.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub name: String,
    /// Lowercase, without the leading dot.
    pub extension: String,
    pub size_bytes: u64,
    /// Seconds since the Unix epoch.
    pub modified_time: f64,
}

/// Why a [`FileRecord`] is not eligible for processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Missing,
    NotAFile,
    Vanished,
    TooLarge { size: u64, limit: u64 },
    Unsupported(String),
    InArchive,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Missing => f.write_str("file does not exist"),
            Rejection::NotAFile => f.write_str("not a regular file"),
            Rejection::Vanished => f.write_str("file is empty or could not be inspected"),
            Rejection::TooLarge { size, limit } => {
                write!(f, "file too large ({size} bytes, limit {limit})")
            }
            Rejection::Unsupported(ext) => write!(f, "unsupported extension {ext:?}"),
            Rejection::InArchive => f.write_str("file is inside the archive directory"),
        }
    }
}

impl FileRecord {
    /// Stats `path` now. Failure to stat yields zero size and mtime rather than an error.
    pub fn capture(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let (size_bytes, modified_time) = match std::fs::metadata(&path) {
            Ok(meta) => {
                let mtime = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_secs_f64())
                    .unwrap_or(0.0);
                (meta.len(), mtime)
            }
            Err(e) => {
                debug!(path = %path.display(), error = ?e, "Could not stat file at capture");
                (0, 0.0)
            }
        };

        Self {
            path,
            name,
            extension,
            size_bytes,
            modified_time,
        }
    }

    /// Identity of one upload attempt: the same path with a different size or mtime is a new key.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}_{}_{}",
            self.path.display(),
            self.size_bytes,
            self.modified_time
        )
    }

    pub fn validate(&self, config: &Config) -> Result<(), Rejection> {
        let meta = match std::fs::metadata(&self.path) {
            Ok(meta) => meta,
            Err(_) => return Err(Rejection::Missing),
        };
        if !meta.is_file() {
            return Err(Rejection::NotAFile);
        }
        if self.size_bytes == 0 || self.modified_time == 0.0 {
            return Err(Rejection::Vanished);
        }

        let limit = config.file_size_limit_bytes();
        if self.size_bytes > limit {
            warn!(path = %self.path.display(), size = self.size_bytes, "File too large");
            return Err(Rejection::TooLarge {
                size: self.size_bytes,
                limit,
            });
        }
        if !config.is_supported_extension(&self.extension) {
            return Err(Rejection::Unsupported(self.extension.clone()));
        }
        if config.is_in_archive_directory(&self.path) {
            debug!(path = %self.path.display(), "File is in archive directory, skipping");
            return Err(Rejection::InArchive);
        }
        Ok(())
    }

    pub fn is_valid(&self, config: &Config) -> bool {
        self.validate(config).is_ok()
    }
}

impl fmt::Display for FileRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FileRecord(path={}, size={}, ext={})",
            self.path.display(),
            self.size_bytes,
            self.extension
        )
    }
}
