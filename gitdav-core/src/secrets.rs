//! Secrets management for gitdav
//!
//! Secrets are stored separately from configuration to avoid accidental sharing.
//! The secrets file is located at `~/.config/gitdav/secrets.toml` and must have
//! restrictive permissions (0600 on Unix).
//!
//! Loading priority:
//! 1. Environment variables (GITDAV_GIT_USERNAME, GITDAV_GIT_PASSWORD,
//!    GITDAV_WEBDAV_USERNAME, GITDAV_WEBDAV_PASSWORD, GITDAV_TOKEN_HASH,
//!    GITHUB_TOKEN)
//! 2. Secrets file (~/.config/gitdav/secrets.toml)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// Username/password pair
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Credentials {
    /// Login name
    pub username: String,
    /// Password or access token
    pub password: String,
}

impl Credentials {
    /// Create a credential pair
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Intake authentication secrets
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct IntakeSecrets {
    /// Hex SHA-256 digest of the caller token
    pub token_hash: Option<String>,
}

impl std::fmt::Debug for IntakeSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntakeSecrets")
            .field("token_hash", &self.token_hash.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// GitHub API secrets
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubSecrets {
    /// GitHub Personal Access Token; falls back to the git password
    pub token: Option<String>,
}

impl std::fmt::Debug for GitHubSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubSecrets")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Secrets structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Secrets {
    /// Credentials for cloning
    pub git: Credentials,
    /// Credentials for the WebDAV store
    pub webdav: Credentials,
    /// Intake authentication
    pub intake: IntakeSecrets,
    /// GitHub API access
    pub github: GitHubSecrets,
}

impl Secrets {
    /// Load secrets from the default location
    ///
    /// Returns default (empty) secrets if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::default_secrets_path() {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load secrets from a specific file with permission checking
    pub fn load_from_file(path: &Path) -> Result<Self> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let metadata = std::fs::metadata(path).map_err(Error::Io)?;
            let mode = metadata.permissions().mode();

            if mode & 0o077 != 0 {
                return Err(Error::Config(format!(
                    "Secrets file {} has insecure permissions {:o}. \
                     Please run: chmod 600 {}",
                    path.display(),
                    mode & 0o777,
                    path.display()
                )));
            }

            debug!(path = %path.display(), mode = format!("{:o}", mode & 0o777), "Secrets file permissions OK");
        }

        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        let mut secrets: Secrets = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse secrets: {}", e)))?;
        secrets.trim();
        Ok(secrets)
    }

    /// Get the default secrets file path
    ///
    /// Returns `~/.config/gitdav/secrets.toml` on Unix
    pub fn default_secrets_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("gitdav").join("secrets.toml"))
    }

    /// Apply environment variable overrides
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get("GITDAV_GIT_USERNAME") {
            self.git.username = v;
        }
        if let Some(v) = get("GITDAV_GIT_PASSWORD") {
            self.git.password = v;
        }
        if let Some(v) = get("GITDAV_WEBDAV_USERNAME") {
            self.webdav.username = v;
        }
        if let Some(v) = get("GITDAV_WEBDAV_PASSWORD") {
            self.webdav.password = v;
        }
        if let Some(v) = get("GITDAV_TOKEN_HASH") {
            self.intake.token_hash = Some(v);
        }
        if let Some(v) = get("GITHUB_TOKEN") {
            self.github.token = Some(v);
        }

        self
    }

    /// Load secrets with environment overrides applied
    pub fn load_with_overrides() -> Result<Self> {
        Ok(Self::load()?.with_env_overrides())
    }

    /// Fail unless every secret the service needs is present
    pub fn require_all(&self) -> Result<()> {
        let mut missing = self.missing_for_backup();
        if self.intake.token_hash.as_deref().unwrap_or("").is_empty() {
            missing.push("intake token hash (GITDAV_TOKEN_HASH)");
        }
        report_missing(missing)
    }

    /// Fail unless the clone and upload credentials are present
    pub fn require_backup(&self) -> Result<()> {
        report_missing(self.missing_for_backup())
    }

    fn missing_for_backup(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.git.is_complete() {
            missing.push("git credentials (GITDAV_GIT_USERNAME / GITDAV_GIT_PASSWORD)");
        }
        if !self.webdav.is_complete() {
            missing.push("WebDAV credentials (GITDAV_WEBDAV_USERNAME / GITDAV_WEBDAV_PASSWORD)");
        }
        missing
    }

    /// Token for the GitHub API
    ///
    /// Priority: explicit GitHub token > git password
    pub fn github_token(&self) -> Option<String> {
        if let Some(token) = self.github.token.as_deref().filter(|t| !t.is_empty()) {
            debug!("Using dedicated GitHub token");
            return Some(token.to_string());
        }
        if !self.git.password.is_empty() {
            debug!("Using git password as GitHub token");
            return Some(self.git.password.clone());
        }
        None
    }

    fn trim(&mut self) {
        for creds in [&mut self.git, &mut self.webdav] {
            creds.username = creds.username.trim().to_string();
            creds.password = creds.password.trim().to_string();
        }
        for value in [&mut self.intake.token_hash, &mut self.github.token]
            .into_iter()
            .flatten()
        {
            *value = value.trim().to_string();
        }
    }
}

fn report_missing(missing: Vec<&str>) -> Result<()> {
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!("Missing secrets: {}", missing.join(", "))))
    }
}
