//! Error types for the watch → upload → archive pipeline.
//!
//! Only configuration, startup and watcher setup failures are surfaced as `Err` to callers.
//! Per-file problems (invalid files, failed uploads, archive I/O) are converted into
//! [`crate::uploader::UploadResult`]s and statistics by the processor and never escape it.

use std::path::PathBuf;
use thiserror::Error;

/// Failures while reading, parsing or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Required environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("immich.api_url must start with http:// or https:// (got {0:?})")]
    InvalidUrl(String),

    #[error("{key} {requirement}")]
    OutOfRange {
        key: &'static str,
        requirement: &'static str,
    },

    #[error("watch.directories cannot be empty")]
    NoWatchDirectories,

    #[error("Watch directory does not exist: {0:?}")]
    WatchDirectoryMissing(PathBuf),

    #[error("Watch path is not a directory: {0:?}")]
    WatchPathNotDirectory(PathBuf),

    #[error("Watch directory is not readable: {path:?}: {source}")]
    WatchDirectoryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Fatal processor lifecycle failures.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Cannot create archive directory {path:?}: {source}")]
    ArchiveDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot connect to Immich server")]
    ServerUnreachable,
}

/// Failures while subscribing to filesystem events.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Failed to create filesystem watcher: {0}")]
    Create(#[source] notify::Error),

    #[error("Failed to watch {path:?}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Failures below the HTTP response level: the request never produced a status.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid header value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),

    #[error("No progress from server for {0:?}")]
    Stalled(std::time::Duration),
}

/// Structural problems found in a video container before upload.
#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("File too small to be a valid video ({size} bytes)")]
    TooSmall { size: u64 },

    #[error("Missing moov atom - file may be incomplete or truncated")]
    MissingMoov,

    #[error("File could not be read completely: {0}")]
    Unreadable(#[source] std::io::Error),

    #[error("I/O error during integrity check: {0}")]
    Io(#[from] std::io::Error),
}
