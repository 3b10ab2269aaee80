//! User configuration.
//!
//! Loaded from `config.toml` in the per-user config directory (or the file
//! named by `FRICS_CONFIG`). Every field is optional:
//!
//! ```toml
//! base_url = "https://codeshare.frida.re"
//! data_dir = "/home/me/.local/share/frics"
//! request_timeout_secs = 10
//! max_pages = 0
//!
//! [retry]
//! max_attempts = 3
//! backoff_ms = 500
//! ```
//!
//! `FRICS_BASE_URL` and `FRICS_DATA_DIR` override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sources::remote::{DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT, RetryPolicy};

pub const CONFIG_ENV: &str = "FRICS_CONFIG";
pub const BASE_URL_ENV: &str = "FRICS_BASE_URL";
pub const DATA_DIR_ENV: &str = "FRICS_DATA_DIR";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("could not determine a data directory; set FRICS_DATA_DIR or pass --data-dir")]
    NoDataDir,

    #[error("invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            backoff_ms: policy.base_delay.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub data_dir: Option<PathBuf>,
    pub request_timeout_secs: u64,
    /// Stop after this many listing pages (0 = unlimited).
    pub max_pages: u32,
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            data_dir: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            max_pages: 0,
            retry: RetryConfig::default(),
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "frics", "frics")
}

/// Per-user data directory used when nothing overrides it.
pub fn default_data_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
}

impl Config {
    /// Location of the config file: `FRICS_CONFIG`, else the user config dir.
    pub fn default_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV)
            && !path.is_empty()
        {
            return Some(PathBuf::from(path));
        }
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load the config file (if any) and apply environment overrides.
    ///
    /// The result is not validated; callers apply their own overrides first.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::default_path() {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Parse `path`; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(BASE_URL_ENV)
            && !url.is_empty()
        {
            self.base_url = url;
        }
        if let Ok(dir) = std::env::var(DATA_DIR_ENV)
            && !dir.is_empty()
        {
            self.data_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl {
                url: self.base_url.clone(),
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }
        Ok(())
    }

    pub fn resolve_data_dir(&self) -> Result<PathBuf, ConfigError> {
        self.data_dir
            .clone()
            .or_else(default_data_dir)
            .ok_or(ConfigError::NoDataDir)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts.max(1),
            base_delay: Duration::from_millis(self.retry.backoff_ms),
        }
    }
}
