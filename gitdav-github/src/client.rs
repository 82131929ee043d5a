//! Latest-commit lookup through the GitHub REST API

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gitdav_core::retry::{retry_async, RetryConfig};
use gitdav_core::{CommitDateLookup, RepoUrl};
use octocrab::Octocrab;
use serde::Deserialize;
use tracing::{debug, info};

use crate::{Error, Result};

/// Host the default API endpoint serves
pub const GITHUB_HOST: &str = "github.com";

/// Commit-date provider for GitHub-hosted repositories
pub struct GitHubCommitLookup {
    client: Octocrab,
    retry: RetryConfig,
}

impl std::fmt::Debug for GitHubCommitLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubCommitLookup").finish_non_exhaustive()
    }
}

impl GitHubCommitLookup {
    /// Create a client for api.github.com
    ///
    /// Without a token requests are anonymous and heavily rate limited.
    pub fn new(token: Option<String>) -> Result<Self> {
        Self::build(token, None)
    }

    /// Create a client for another API root, e.g. a GitHub Enterprise server
    pub fn with_base_uri(token: Option<String>, base_uri: &str) -> Result<Self> {
        Self::build(token, Some(base_uri))
    }

    fn build(token: Option<String>, base_uri: Option<&str>) -> Result<Self> {
        let mut builder = Octocrab::builder();
        if let Some(uri) = base_uri {
            builder = builder.base_uri(uri)?;
        }
        match token {
            Some(token) => builder = builder.personal_token(token),
            None => debug!("No GitHub token configured, using anonymous access"),
        }

        let client = builder
            .build()
            .map_err(|e| Error::Auth(format!("Failed to create GitHub client: {}", e)))?;

        info!(base_uri = base_uri.unwrap_or("https://api.github.com"), "Created GitHub client");
        Ok(Self {
            client,
            retry: RetryConfig::default(),
        })
    }

    /// Set the retry policy for transient API failures
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Date of the newest commit on the default branch of `owner/repo`
    pub async fn latest_commit(&self, owner: &str, repo: &str) -> Result<DateTime<Utc>> {
        let route = format!("/repos/{}/{}/commits", owner, repo);
        debug!(route = %route, "Fetching latest commit");

        let commits: Vec<CommitEntry> = self
            .client
            .get(&route, Some(&[("per_page", "1")]))
            .await
            .map_err(|e| classify(e, &route))?;

        let entry = commits
            .into_iter()
            .next()
            .ok_or_else(|| Error::NoCommits(format!("{}/{}", owner, repo)))?;

        entry.date().ok_or_else(|| {
            Error::Parse(format!(
                "Commit {} of {}/{} carries no date",
                entry.sha, owner, repo
            ))
        })
    }
}

#[async_trait]
impl CommitDateLookup for GitHubCommitLookup {
    async fn latest_commit_date(&self, repo_url: &str) -> gitdav_core::Result<DateTime<Utc>> {
        let (owner, repo) = parse_github_url(repo_url)?;

        let date = retry_async(&self.retry, "GitHub commit lookup", || {
            let (owner, repo) = (&owner, &repo);
            async move {
                self.latest_commit(owner, repo)
                    .await
                    .map_err(gitdav_core::Error::from)
            }
        })
        .await?;

        debug!(owner = %owner, repo = %repo, date = %date, "Latest commit");
        Ok(date)
    }
}

#[derive(Debug, Deserialize)]
struct CommitEntry {
    #[serde(default)]
    sha: String,
    commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    author: Option<Signature>,
    committer: Option<Signature>,
}

#[derive(Debug, Deserialize)]
struct Signature {
    date: Option<DateTime<Utc>>,
}

impl CommitEntry {
    /// Author date, falling back to the committer date
    fn date(&self) -> Option<DateTime<Utc>> {
        let detail = &self.commit;
        detail
            .author
            .as_ref()
            .and_then(|s| s.date)
            .or_else(|| detail.committer.as_ref().and_then(|s| s.date))
    }
}

fn classify(err: octocrab::Error, route: &str) -> Error {
    match err {
        octocrab::Error::GitHub { source, .. } => {
            let status = source.status_code.as_u16();
            let message = source.message.clone();
            match status {
                401 => Error::Auth(message),
                403 | 429 if message.to_ascii_lowercase().contains("rate limit") => {
                    Error::RateLimited(route.to_string())
                }
                403 => Error::Auth(message),
                _ => Error::Status {
                    status,
                    route: route.to_string(),
                    message,
                },
            }
        }
        other => Error::Api(other),
    }
}

/// Owner and repository name of a github.com URL
///
/// Supports formats:
/// - https://github.com/owner/repo[.git]
/// - git@github.com:owner/repo.git
/// - ssh://git@github.com/owner/repo.git
fn parse_github_url(url: &str) -> gitdav_core::Result<(String, String)> {
    let parsed = RepoUrl::parse(url)?;
    Ok((parsed.owner, parsed.repo))
}
