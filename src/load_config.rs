/// `load_config` module: Loads a static YAML config and injects environment secrets into a [`Config`].
///
/// This is the only place where untrusted YAML is parsed and mapped to strongly-typed structs.
///
/// # Responsibilities
/// - Parse the YAML file into intermediate serde structs (all sections but `immich`, `watch`
///   and `archive` are optional and defaulted)
/// - Inject `IMMICH_API_KEY` (required) and `IMMICH_API_URL` (optional override) from the environment
/// - Expand `~` in directory paths and normalise extensions
/// - Validate the merged result before handing it to the pipeline
///
/// # Errors
/// Every failure is a [`ConfigError`] whose message names the offending key, variable or path.
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::config::{
    expand_home, Config, NotificationSettings, StabilitySettings, UploadSettings,
    DEFAULT_EXTENSIONS,
};
use crate::error::ConfigError;

pub const API_KEY_ENV: &str = "IMMICH_API_KEY";
pub const API_URL_ENV: &str = "IMMICH_API_URL";

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    immich: ImmichSection,
    watch: WatchSection,
    archive: ArchiveSection,
    #[serde(default)]
    files: FilesSection,
    #[serde(default)]
    stability: StabilitySettings,
    #[serde(default)]
    upload: UploadSettings,
    #[serde(default)]
    notifications: NotificationSettings,
    #[serde(default = "default_stats_interval")]
    stats_interval_seconds: u64,
}

#[derive(Debug, Default, Deserialize)]
struct ImmichSection {
    #[serde(default)]
    api_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WatchSection {
    directories: Vec<PathBuf>,
    #[serde(default = "default_true")]
    recursive: bool,
}

#[derive(Debug, Deserialize)]
struct ArchiveSection {
    directory: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct FilesSection {
    supported_extensions: Vec<String>,
    max_file_size_mb: u64,
}

impl Default for FilesSection {
    fn default() -> Self {
        Self {
            supported_extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            max_file_size_mb: 1000,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_stats_interval() -> u64 {
    300
}

/// Loads a static YAML config file (no secrets) and injects required env vars for secrets.
/// Returns a validated [`Config`] or an error.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(ConfigError::Read {
                path: path_ref.to_path_buf(),
                source: e,
            });
        }
    };

    let raw: RawConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(ConfigError::Parse(e));
        }
    };

    let api_key = match std::env::var(API_KEY_ENV) {
        Ok(key) if !key.is_empty() => {
            info!("{API_KEY_ENV} found in env");
            key
        }
        _ => {
            error!("{API_KEY_ENV} environment variable not set");
            return Err(ConfigError::MissingEnv(API_KEY_ENV));
        }
    };

    let api_url = match std::env::var(API_URL_ENV) {
        Ok(url) if !url.is_empty() => {
            info!(api_url = %url, "{API_URL_ENV} overrides immich.api_url");
            url
        }
        _ => match raw.immich.api_url {
            Some(url) => url,
            None => {
                error!("No immich.api_url in config and {API_URL_ENV} not set");
                return Err(ConfigError::MissingEnv(API_URL_ENV));
            }
        },
    };

    let watch_directories = raw
        .watch
        .directories
        .iter()
        .map(|d| expand_home(d))
        .collect();

    let mut config = Config::new(
        api_url,
        api_key,
        watch_directories,
        expand_home(&raw.archive.directory),
    );
    config.watch_recursive = raw.watch.recursive;
    config.supported_extensions = normalise_extensions(&raw.files.supported_extensions);
    config.max_file_size_mb = raw.files.max_file_size_mb;
    config.stability = raw.stability;
    config.upload = raw.upload;
    config.notifications = raw.notifications;
    config.stats_interval_seconds = raw.stats_interval_seconds;

    if let Err(e) = config.validate() {
        error!(error = %e, config_path = ?path_ref, "Configuration failed validation");
        return Err(e);
    }

    config.trace_loaded();
    Ok(config)
}

fn normalise_extensions(raw: &[String]) -> Vec<String> {
    raw.iter()
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}
