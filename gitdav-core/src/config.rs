//! Configuration management for gitdav
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (GITDAV_*)
//! 3. Config file (~/.config/gitdav/config.toml)
//! 4. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryConfig;
use crate::{Error, Result};

/// Local working area
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory used for clones and archives; exclusively owned by gitdav
    pub local_root: Option<PathBuf>,
}

/// Remote backup collection
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WebDavConfig {
    /// Collection URL that receives the archives
    pub url: Option<String>,
}

/// Scheduler timing
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How often the queue is polled
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,

    /// How many completed backups `/status` remembers
    pub report_history: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5),
            report_history: 50,
        }
    }
}

/// HTTP intake
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Local working area
    pub storage: StorageConfig,
    /// WebDAV destination
    pub webdav: WebDavConfig,
    /// Scheduler timing
    pub scheduler: SchedulerConfig,
    /// HTTP intake
    pub server: ServerConfig,
    /// Retry policy for network operations
    pub retry: RetryConfig,
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::default_config_path() {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Get the default config file path
    ///
    /// Returns `~/.config/gitdav/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("gitdav").join("config.toml"))
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - GITDAV_LOCAL_PATH: Working directory for clones and archives
    /// - GITDAV_WEBDAV_URL: WebDAV collection URL
    /// - GITDAV_TICK_INTERVAL: Queue poll interval (e.g. "5s")
    /// - GITDAV_BIND: HTTP listen address
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(path) = get("GITDAV_LOCAL_PATH") {
            self.storage.local_root = Some(PathBuf::from(path));
        }

        if let Some(url) = get("GITDAV_WEBDAV_URL") {
            self.webdav.url = Some(url);
        }

        if let Some(interval) = get("GITDAV_TICK_INTERVAL") {
            self.scheduler.tick_interval = humantime_serde::re::humantime::parse_duration(&interval)
                .map_err(|e| {
                    Error::Config(format!("Invalid GITDAV_TICK_INTERVAL '{}': {}", interval, e))
                })?;
        }

        if let Some(bind) = get("GITDAV_BIND") {
            self.server.bind = bind;
        }

        Ok(self)
    }

    /// Apply CLI flag overrides
    pub fn with_cli_overrides(mut self, bind: Option<String>) -> Self {
        if let Some(bind) = bind {
            self.server.bind = bind;
        }

        self
    }

    /// Load configuration with all overrides applied
    ///
    /// Priority: CLI > env > config file > defaults
    pub fn load_with_overrides(config_path: Option<&Path>, bind: Option<String>) -> Result<Self> {
        let base = match config_path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load()?,
        };
        Ok(base.with_env_overrides()?.with_cli_overrides(bind))
    }

    /// Fail on missing or malformed settings
    pub fn validate(&self) -> Result<()> {
        if self.storage.local_root.is_none() {
            return Err(Error::Config(
                "Local working root not set (storage.local_root / GITDAV_LOCAL_PATH)".to_string(),
            ));
        }

        let url = self.webdav.url.as_deref().unwrap_or("");
        if url.is_empty() {
            return Err(Error::Config(
                "WebDAV URL not set (webdav.url / GITDAV_WEBDAV_URL)".to_string(),
            ));
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(Error::Config(
                "WebDAV URL must start with http:// or https://".to_string(),
            ));
        }

        if self.scheduler.tick_interval.is_zero() {
            return Err(Error::Config(
                "scheduler.tick_interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Validated local working root
    pub fn local_root(&self) -> Result<&Path> {
        self.storage
            .local_root
            .as_deref()
            .ok_or_else(|| Error::Config("Local working root not set".to_string()))
    }

    /// Validated WebDAV collection URL
    pub fn webdav_url(&self) -> Result<&str> {
        self.webdav
            .url
            .as_deref()
            .ok_or_else(|| Error::Config("WebDAV URL not set".to_string()))
    }
}
