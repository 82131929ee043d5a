//! Repository URL parsing

use crate::{Error, Result};

/// Parsed repository location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoUrl {
    /// Host (e.g., "github.com")
    pub host: String,
    /// Repository owner/organization (first path segment)
    pub owner: String,
    /// Repository name without `.git`
    pub repo: String,
}

impl RepoUrl {
    /// Parse a repository URL
    ///
    /// Supports:
    /// - `https://github.com/owner/repo`
    /// - `https://github.com/owner/repo.git`
    /// - `git@github.com:owner/repo.git`
    /// - `ssh://git@host/owner/repo.git`
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        // Handle scp-like URLs (e.g., git@github.com:owner/repo.git)
        if !input.contains("://") {
            if let Some((user_host, path)) = input.split_once(':') {
                let host = user_host.rsplit('@').next().unwrap_or(user_host);
                if !host.is_empty() {
                    return Self::from_parts(host, path, input);
                }
            }
        }

        if let Ok(url) = ::url::Url::parse(input) {
            if let Some(host) = url.host_str() {
                return Self::from_parts(host, url.path(), input);
            }
        }

        Err(Error::Parse(format!(
            "Invalid repository URL: {}. Expected https://host/owner/repo or git@host:owner/repo.git",
            input
        )))
    }

    fn from_parts(host: &str, path: &str, input: &str) -> Result<Self> {
        let path = path.trim_matches('/');
        let path = path.strip_suffix(".git").unwrap_or(path);
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();

        if parts.len() < 2 {
            return Err(Error::Parse(format!(
                "Repository URL has no owner/repo path: {}",
                input
            )));
        }

        Ok(Self {
            host: host.to_ascii_lowercase(),
            owner: parts[0].to_string(),
            repo: parts[parts.len() - 1].to_string(),
        })
    }
}
