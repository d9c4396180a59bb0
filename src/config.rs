//! Runtime configuration for the uploader.
//!
//! [`Config`] is produced by [`crate::load_config::load_config`] from a static YAML file plus
//! environment secrets, but it can also be built directly (tests do this) via [`Config::new`]
//! and adjusted through its public sections.

use serde::Deserialize;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::ConfigError;

/// Extensions accepted when the config does not list any.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp", "mp4", "mov", "avi", "mkv", "wmv", "flv",
    "m4v", "3gp",
];

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Upper bound for fractional-second settings.
pub const MAX_FRACTIONAL_SECONDS: f64 = 3600.0;

/// Converts seconds to a `Duration`, clamping negative, non-finite and out-of-range values.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.clamp(0.0, MAX_FRACTIONAL_SECONDS)).unwrap_or(Duration::ZERO)
}

/// API key wrapper whose `Debug` output never reveals the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// First five characters followed by a fixed run of asterisks.
    pub fn masked(&self) -> String {
        let prefix: String = self.0.chars().take(5).collect();
        format!("{prefix}{}", "*".repeat(20))
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StabilitySettings {
    /// Base wait for small files, in seconds.
    pub wait_seconds: u64,
    pub check_interval_seconds: f64,
    /// Extended wait for files at or above `min_video_wait_size_mb`.
    pub video_wait_seconds: u64,
    pub min_video_wait_size_mb: u64,
    pub max_concurrent_checks: usize,
}

impl Default for StabilitySettings {
    fn default() -> Self {
        Self {
            wait_seconds: 5,
            check_interval_seconds: 1.0,
            video_wait_seconds: 30,
            min_video_wait_size_mb: 100,
            max_concurrent_checks: 16,
        }
    }
}

impl StabilitySettings {
    pub fn check_interval(&self) -> Duration {
        seconds(self.check_interval_seconds)
    }

    pub fn base_wait(&self) -> Duration {
        Duration::from_secs(self.wait_seconds)
    }

    pub fn extended_wait(&self) -> Duration {
        Duration::from_secs(self.video_wait_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    pub verify_video_integrity: bool,
    pub max_retries: u32,
    pub backoff_seconds: f64,
    /// Connect and read inactivity timeout; uploads have no total deadline.
    pub timeout_seconds: u64,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            verify_video_integrity: true,
            max_retries: 3,
            backoff_seconds: 1.0,
            timeout_seconds: 60,
        }
    }
}

impl UploadSettings {
    pub fn backoff_base(&self) -> Duration {
        seconds(self.backoff_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub batch_timeout_seconds: u64,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_timeout_seconds: 30,
        }
    }
}

impl NotificationSettings {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_seconds)
    }
}

/// Fully resolved configuration shared (behind an `Arc`) by every component.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub api_key: ApiKey,
    pub watch_directories: Vec<PathBuf>,
    pub watch_recursive: bool,
    pub archive_directory: PathBuf,
    /// Lowercase, without leading dots.
    pub supported_extensions: Vec<String>,
    pub max_file_size_mb: u64,
    pub stability: StabilitySettings,
    pub upload: UploadSettings,
    pub notifications: NotificationSettings,
    pub stats_interval_seconds: u64,
}

impl Config {
    /// Builds a config with defaults for everything but the required settings.
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        watch_directories: Vec<PathBuf>,
        archive_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: ApiKey::new(api_key),
            watch_directories,
            watch_recursive: true,
            archive_directory: archive_directory.into(),
            supported_extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            max_file_size_mb: 1000,
            stability: StabilitySettings::default(),
            upload: UploadSettings::default(),
            notifications: NotificationSettings::default(),
            stats_interval_seconds: 300,
        }
    }

    /// Checks value ranges and that every watch directory is an accessible directory.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl(self.api_url.clone()));
        }
        if self.max_file_size_mb < 1 {
            return Err(ConfigError::OutOfRange {
                key: "files.max_file_size_mb",
                requirement: "must be at least 1",
            });
        }
        if self.stability.wait_seconds < 1 {
            return Err(ConfigError::OutOfRange {
                key: "stability.wait_seconds",
                requirement: "must be at least 1",
            });
        }
        let interval = self.stability.check_interval_seconds;
        if !(0.1..=MAX_FRACTIONAL_SECONDS).contains(&interval) {
            return Err(ConfigError::OutOfRange {
                key: "stability.check_interval_seconds",
                requirement: "must be between 0.1 and 3600",
            });
        }
        if self.stability.video_wait_seconds < self.stability.wait_seconds {
            return Err(ConfigError::OutOfRange {
                key: "stability.video_wait_seconds",
                requirement: "must be at least stability.wait_seconds",
            });
        }
        if self.stability.max_concurrent_checks < 1 {
            return Err(ConfigError::OutOfRange {
                key: "stability.max_concurrent_checks",
                requirement: "must be at least 1",
            });
        }
        if !(0.0..=MAX_FRACTIONAL_SECONDS).contains(&self.upload.backoff_seconds) {
            return Err(ConfigError::OutOfRange {
                key: "upload.backoff_seconds",
                requirement: "must be between 0 and 3600",
            });
        }
        if self.upload.timeout_seconds < 1 {
            return Err(ConfigError::OutOfRange {
                key: "upload.timeout_seconds",
                requirement: "must be at least 1",
            });
        }
        if self.notifications.batch_timeout_seconds < 1 {
            return Err(ConfigError::OutOfRange {
                key: "notifications.batch_timeout_seconds",
                requirement: "must be at least 1 second",
            });
        }
        if self.stats_interval_seconds < 1 {
            return Err(ConfigError::OutOfRange {
                key: "stats_interval_seconds",
                requirement: "must be at least 1",
            });
        }

        if self.watch_directories.is_empty() {
            return Err(ConfigError::NoWatchDirectories);
        }
        for dir in &self.watch_directories {
            if !dir.exists() {
                return Err(ConfigError::WatchDirectoryMissing(dir.clone()));
            }
            if !dir.is_dir() {
                return Err(ConfigError::WatchPathNotDirectory(dir.clone()));
            }
            if let Err(source) = std::fs::read_dir(dir) {
                return Err(ConfigError::WatchDirectoryUnreadable {
                    path: dir.clone(),
                    source,
                });
            }
        }
        Ok(())
    }

    pub fn is_supported_file(&self, filename: &str) -> bool {
        match filename.rsplit_once('.') {
            Some((_, ext)) => self.is_supported_extension(ext),
            None => false,
        }
    }

    pub fn is_supported_extension(&self, extension: &str) -> bool {
        let ext = extension.to_lowercase();
        self.supported_extensions.iter().any(|s| *s == ext)
    }

    pub fn file_size_limit_bytes(&self) -> u64 {
        self.max_file_size_mb * BYTES_PER_MB
    }

    /// True when `path` is the archive directory or lies anywhere beneath it.
    ///
    /// Both sides are resolved through symlinks first. A path that cannot be resolved is treated
    /// as inside the archive so it is never uploaded.
    pub fn is_in_archive_directory(&self, path: &Path) -> bool {
        let archive = match resolve_lenient(&self.archive_directory) {
            Ok(p) => p,
            Err(_) => return true,
        };
        match resolve_lenient(path) {
            Ok(resolved) => resolved.starts_with(&archive),
            Err(_) => true,
        }
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_seconds)
    }

    pub fn trace_loaded(&self) {
        info!(
            api_url = %self.api_url,
            watch_directories = self.watch_directories.len(),
            archive_directory = %self.archive_directory.display(),
            recursive = self.watch_recursive,
            "Loaded Config"
        );
        debug!(?self, "Config loaded (full debug)");
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dirs: Vec<String> = self
            .watch_directories
            .iter()
            .map(|d| d.display().to_string())
            .collect();
        writeln!(f, "Configuration:")?;
        writeln!(f, "  API URL: {}", self.api_url)?;
        writeln!(f, "  API Key: {}", self.api_key.masked())?;
        writeln!(f, "  Watch directories: {}", dirs.join(", "))?;
        writeln!(f, "  Archive directory: {}", self.archive_directory.display())?;
        writeln!(f, "  Supported extensions: {}", self.supported_extensions.join(", "))?;
        writeln!(f, "  Max file size: {} MB", self.max_file_size_mb)?;
        writeln!(f, "  File stability wait: {} seconds", self.stability.wait_seconds)?;
        writeln!(
            f,
            "  File stability check interval: {} seconds",
            self.stability.check_interval_seconds
        )?;
        writeln!(
            f,
            "  File stability wait for videos: {} seconds",
            self.stability.video_wait_seconds
        )?;
        writeln!(
            f,
            "  Min size for extended stability: {} MB",
            self.stability.min_video_wait_size_mb
        )?;
        writeln!(
            f,
            "  Max concurrent stability checks: {}",
            self.stability.max_concurrent_checks
        )?;
        writeln!(f, "  Verify video integrity: {}", self.upload.verify_video_integrity)?;
        writeln!(f, "  Upload retries: {}", self.upload.max_retries)?;
        writeln!(f, "  Watch recursive: {}", self.watch_recursive)?;
        writeln!(f, "  Notifications enabled: {}", self.notifications.enabled)?;
        write!(
            f,
            "  Notification batch timeout: {} seconds",
            self.notifications.batch_timeout_seconds
        )
    }
}

/// Resolves symlinks in `path` even if its tail does not exist yet.
///
/// The deepest existing ancestor is canonicalized and the remaining components are appended
/// lexically (`..` pops, `.` is dropped).
pub fn resolve_lenient(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    if let Ok(resolved) = absolute.canonicalize() {
        return Ok(resolved);
    }

    let mut existing = absolute.as_path();
    let mut tail: Vec<Component<'_>> = Vec::new();
    loop {
        match existing.canonicalize() {
            Ok(mut resolved) => {
                for component in tail.into_iter().rev() {
                    match component {
                        Component::ParentDir => {
                            resolved.pop();
                        }
                        Component::CurDir => {}
                        other => resolved.push(other.as_os_str()),
                    }
                }
                return Ok(resolved);
            }
            Err(e) => {
                let Some(last) = existing.components().next_back() else {
                    return Err(e);
                };
                tail.push(last);
                existing = match existing.parent() {
                    Some(parent) => parent,
                    None => return Err(e),
                };
            }
        }
    }
}

/// Expands a leading `~` to `$HOME`.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}
