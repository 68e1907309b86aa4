//! Static configuration for the courier.
//!
//! Settings live in a TOML file loaded once at startup:
//!
//! ```toml
//! service_url = "http://paperless.local:8000"
//! api_token = "0123abcd"
//! site_name = "branch-office"
//! watch_dir = "/srv/scans/inbox"
//! archive_dir = "/srv/scans/archive"
//! failed_dir = "/srv/scans/failed"
//! ```
//!
//! The resulting [`Config`] is immutable and handed to each component by
//! construction.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "SCAN_COURIER_CONFIG";

/// Environment variable that overrides `api_token` from the file.
pub const API_TOKEN_ENV: &str = "SCAN_COURIER_API_TOKEN";

/// Config file used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_FILE: &str = "scan-courier.toml";

/// Extensions accepted when the file does not list any.
pub const DEFAULT_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "tiff", "tif"];

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid service URL '{0}': expected an http or https URL")]
    InvalidServiceUrl(String),

    #[error("No API token configured (set api_token or SCAN_COURIER_API_TOKEN)")]
    MissingApiToken,

    #[error("max_retries must be at least 1")]
    ZeroRetries,

    #[error("At least one file extension must be configured")]
    NoExtensions,
}

/// On-disk shape of the config file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    service_url: String,
    #[serde(default)]
    api_token: String,
    #[serde(default)]
    site_name: String,
    watch_dir: PathBuf,
    archive_dir: PathBuf,
    failed_dir: PathBuf,
    #[serde(default = "default_log_file")]
    log_file: PathBuf,
    #[serde(default = "default_extensions")]
    extensions: Vec<String>,
    #[serde(default = "default_max_retries")]
    max_retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    retry_delay_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    poll_interval_secs: u64,
    #[serde(default = "default_grace_delay_secs")]
    grace_delay_secs: u64,
}

fn default_log_file() -> PathBuf {
    PathBuf::from("scan-courier.log")
}

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    10
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_grace_delay_secs() -> u64 {
    2
}

/// Validated, immutable runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the document service, without trailing slash.
    pub service_url: String,
    /// Credential sent as `Authorization: Token <api_token>`.
    pub api_token: String,
    /// Name of the tag identifying this site. Empty disables tagging.
    pub site_name: String,
    /// Directory polled for new scans.
    pub watch_dir: PathBuf,
    /// Destination for uploaded files.
    pub archive_dir: PathBuf,
    /// Destination for files whose upload permanently failed.
    pub failed_dir: PathBuf,
    /// Log file appended to on every event.
    pub log_file: PathBuf,
    /// Lowercase extensions without leading dot.
    pub extensions: Vec<String>,
    /// Upload attempts per file, at least 1.
    pub max_retries: u32,
    /// Fixed wait between upload attempts.
    pub retry_delay: Duration,
    /// Wait between scan cycles.
    pub poll_interval: Duration,
    /// Wait before probing a candidate for an exclusive lock.
    pub grace_delay: Duration,
}

impl Config {
    /// Load the config file named by [`CONFIG_PATH_ENV`], or
    /// [`DEFAULT_CONFIG_FILE`] when unset.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(&path)
    }

    /// Load and validate a config file, applying [`API_TOKEN_ENV`] if set.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let token_override = std::env::var(API_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty());
        Self::from_toml(&content, token_override)
    }

    /// Parse and validate TOML content. `token_override` replaces the file's
    /// `api_token` when present.
    pub fn from_toml(content: &str, token_override: Option<String>) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content)?;

        let service_url = raw.service_url.trim().trim_end_matches('/').to_string();
        match reqwest::Url::parse(&service_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => return Err(ConfigError::InvalidServiceUrl(raw.service_url)),
        }

        let api_token = token_override
            .unwrap_or(raw.api_token)
            .trim()
            .to_string();
        if api_token.is_empty() {
            return Err(ConfigError::MissingApiToken);
        }

        if raw.max_retries == 0 {
            return Err(ConfigError::ZeroRetries);
        }

        let extensions = normalize_extensions(&raw.extensions);
        if extensions.is_empty() {
            return Err(ConfigError::NoExtensions);
        }

        Ok(Self {
            service_url,
            api_token,
            site_name: raw.site_name.trim().to_string(),
            watch_dir: raw.watch_dir,
            archive_dir: raw.archive_dir,
            failed_dir: raw.failed_dir,
            log_file: raw.log_file,
            extensions,
            max_retries: raw.max_retries,
            retry_delay: Duration::from_secs(raw.retry_delay_secs),
            poll_interval: Duration::from_secs(raw.poll_interval_secs),
            grace_delay: Duration::from_secs(raw.grace_delay_secs),
        })
    }
}

/// Lowercase, strip leading dots, drop blanks and duplicates (first wins).
fn normalize_extensions(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for ext in raw {
        let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        if !ext.is_empty() && !out.contains(&ext) {
            out.push(ext);
        }
    }
    out
}
