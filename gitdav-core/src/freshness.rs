//! Deciding whether an existing backup still reflects upstream
//!
//! A backup is up to date when its archive stamp is strictly later than the
//! latest upstream commit. Ties favor taking a new backup.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::git::RepoUrl;
use crate::naming::{extract_repo_base_name, resolve_last_backup_timestamp};
use crate::store::BackupStore;
use crate::{Error, Result};

/// Looks up the most recent commit of a hosted repository
#[async_trait]
pub trait CommitDateLookup: Send + Sync {
    /// Instant of the latest commit on the default branch
    async fn latest_commit_date(&self, repo_url: &str) -> Result<DateTime<Utc>>;
}

/// Host pattern a provider is registered under
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPattern {
    /// Matches one host exactly
    Exact(String),
    /// Matches any subdomain of the suffix (`*.example.com`)
    Subdomain(String),
}

impl HostPattern {
    /// Parse `github.com` or `*.example.com`
    pub fn parse(pattern: &str) -> Self {
        let pattern = pattern.trim().to_ascii_lowercase();
        match pattern.strip_prefix("*.") {
            Some(suffix) => HostPattern::Subdomain(suffix.to_string()),
            None => HostPattern::Exact(pattern),
        }
    }

    /// Whether `host` matches this pattern
    pub fn matches(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        match self {
            HostPattern::Exact(expected) => host == *expected,
            HostPattern::Subdomain(suffix) => host
                .strip_suffix(suffix.as_str())
                .is_some_and(|prefix| prefix.ends_with('.') && prefix.len() > 1),
        }
    }
}

/// Dispatch table from repository host to commit-date provider
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    entries: Vec<(HostPattern, Arc<dyn CommitDateLookup>)>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(pattern, _)| pattern))
            .finish()
    }
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` for hosts matching `pattern`
    ///
    /// Earlier registrations win when several patterns match.
    pub fn register(mut self, pattern: &str, provider: Arc<dyn CommitDateLookup>) -> Self {
        self.entries.push((HostPattern::parse(pattern), provider));
        self
    }

    /// Provider responsible for `repo_url`
    pub fn resolve(&self, repo_url: &str) -> Result<Arc<dyn CommitDateLookup>> {
        let parsed = RepoUrl::parse(repo_url)?;
        self.entries
            .iter()
            .find(|(pattern, _)| pattern.matches(&parsed.host))
            .map(|(_, provider)| Arc::clone(provider))
            .ok_or_else(|| {
                Error::NotSupported(format!(
                    "No commit-date provider for host '{}' ({})",
                    parsed.host,
                    repo_url.trim()
                ))
            })
    }
}

#[async_trait]
impl CommitDateLookup for ProviderRegistry {
    async fn latest_commit_date(&self, repo_url: &str) -> Result<DateTime<Utc>> {
        self.resolve(repo_url)?.latest_commit_date(repo_url).await
    }
}

/// Result of a freshness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// No archive of this repository exists in the store
    NeverBackedUp,
    /// Upstream has commits at or after the latest archive
    Stale {
        /// Latest archive stamp
        last_backup: DateTime<Utc>,
        /// Latest upstream commit
        last_commit: DateTime<Utc>,
    },
    /// Latest archive is strictly newer than the latest commit
    UpToDate {
        /// Latest archive stamp
        last_backup: DateTime<Utc>,
        /// Latest upstream commit
        last_commit: DateTime<Utc>,
    },
}

impl Freshness {
    /// Whether a new backup can be skipped
    pub fn is_up_to_date(&self) -> bool {
        matches!(self, Freshness::UpToDate { .. })
    }

    /// Stamp of the newest existing archive
    pub fn last_backup(&self) -> Option<DateTime<Utc>> {
        match self {
            Freshness::NeverBackedUp => None,
            Freshness::Stale { last_backup, .. } | Freshness::UpToDate { last_backup, .. } => {
                Some(*last_backup)
            }
        }
    }
}

/// Compares the backup store listing with upstream commit dates
#[derive(Clone)]
pub struct FreshnessOracle {
    store: Arc<dyn BackupStore>,
    commits: Arc<dyn CommitDateLookup>,
}

impl std::fmt::Debug for FreshnessOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FreshnessOracle").finish_non_exhaustive()
    }
}

impl FreshnessOracle {
    /// Create an oracle over `store` and a commit-date source
    pub fn new(store: Arc<dyn BackupStore>, commits: Arc<dyn CommitDateLookup>) -> Self {
        Self { store, commits }
    }

    /// Determine whether `repo_url` already has a current backup
    ///
    /// The upstream provider is only queried when an archive exists.
    pub async fn check(&self, repo_url: &str) -> Result<Freshness> {
        let base = extract_repo_base_name(repo_url)?;
        let listing = self.store.list().await.map_err(Error::lookup)?;

        let Some(last_backup) = resolve_last_backup_timestamp(&base, &listing) else {
            debug!(repo = %base, "No previous backup found");
            return Ok(Freshness::NeverBackedUp);
        };

        let last_commit = self
            .commits
            .latest_commit_date(repo_url)
            .await
            .map_err(Error::lookup)?;

        debug!(
            repo = %base,
            last_backup = %last_backup,
            last_commit = %last_commit,
            "Compared backup and commit dates"
        );

        Ok(compare(last_backup, last_commit))
    }

    /// Boolean form of [`FreshnessOracle::check`]
    pub async fn is_up_to_date(&self, repo_url: &str) -> Result<bool> {
        Ok(self.check(repo_url).await?.is_up_to_date())
    }
}

fn compare(last_backup: DateTime<Utc>, last_commit: DateTime<Utc>) -> Freshness {
    if last_backup > last_commit {
        Freshness::UpToDate {
            last_backup,
            last_commit,
        }
    } else {
        Freshness::Stale {
            last_backup,
            last_commit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FixedCommitDate, MemoryStore};
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    fn oracle(listing: &[&str], commit: DateTime<Utc>) -> (FreshnessOracle, Arc<FixedCommitDate>) {
        let store = Arc::new(MemoryStore::with_names(listing));
        let commits = Arc::new(FixedCommitDate::new(commit));
        (FreshnessOracle::new(store, commits.clone()), commits)
    }

    #[tokio::test]
    async fn test_never_backed_up_is_stale_without_lookup() {
        let (oracle, commits) = oracle(&["other20240101120000.zip"], at(2023, 1, 1, 0, 0, 0));
        let freshness = oracle.check("https://github.com/org/repo.git").await.unwrap();
        assert_eq!(freshness, Freshness::NeverBackedUp);
        assert!(!freshness.is_up_to_date());
        assert_eq!(commits.calls(), 0);
    }

    #[tokio::test]
    async fn test_equal_timestamps_are_not_fresh() {
        let (oracle, _) = oracle(&["repo20240101120000.zip"], at(2024, 1, 1, 12, 0, 0));
        assert!(!oracle
            .is_up_to_date("https://github.com/org/repo.git")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_strictly_later_backup_is_fresh() {
        let (oracle, commits) = oracle(
            &["repo20231101000000.zip", "repo20240101120000.zip"],
            at(2023, 12, 1, 0, 0, 0),
        );
        let freshness = oracle.check("https://github.com/org/repo.git").await.unwrap();
        assert!(freshness.is_up_to_date());
        assert_eq!(freshness.last_backup(), Some(at(2024, 1, 1, 12, 0, 0)));
        assert_eq!(commits.calls(), 1);
    }

    #[tokio::test]
    async fn test_newer_commit_is_stale() {
        let (oracle, _) = oracle(&["repo20240101120000.zip"], at(2024, 1, 1, 12, 0, 1));
        let freshness = oracle.check("https://github.com/org/repo").await.unwrap();
        assert!(matches!(freshness, Freshness::Stale { .. }));
    }

    #[tokio::test]
    async fn test_prefix_sharing_repo_does_not_count() {
        let (oracle, _) = oracle(&["foobar20300101000000.zip"], at(2020, 1, 1, 0, 0, 0));
        let freshness = oracle.check("https://github.com/org/foo.git").await.unwrap();
        assert_eq!(freshness, Freshness::NeverBackedUp);
    }

    #[tokio::test]
    async fn test_listing_failure_is_lookup_error() {
        let store = Arc::new(MemoryStore::default());
        store.fail_list(Error::Network("unreachable".into()));
        let oracle = FreshnessOracle::new(store, Arc::new(FixedCommitDate::new(Utc::now())));
        let err = oracle.check("https://github.com/org/repo.git").await.unwrap_err();
        assert!(matches!(err, Error::Lookup(_)));
    }

    #[tokio::test]
    async fn test_unsupported_host_fails_loudly() {
        let store = Arc::new(MemoryStore::with_names(&["repo20240101120000.zip"]));
        let registry = ProviderRegistry::new().register(
            "github.com",
            Arc::new(FixedCommitDate::new(at(2020, 1, 1, 0, 0, 0))),
        );
        let oracle = FreshnessOracle::new(store, Arc::new(registry));
        let err = oracle
            .check("https://gitlab.com/org/repo.git")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotSupported(_)));
    }

    #[tokio::test]
    async fn test_registry_dispatches_by_host() {
        let github = Arc::new(FixedCommitDate::new(at(2020, 1, 1, 0, 0, 0)));
        let internal = Arc::new(FixedCommitDate::new(at(2021, 1, 1, 0, 0, 0)));
        let registry = ProviderRegistry::new()
            .register("github.com", github.clone())
            .register("*.corp.example", internal.clone());

        assert_eq!(
            registry
                .latest_commit_date("https://github.com/a/b.git")
                .await
                .unwrap(),
            at(2020, 1, 1, 0, 0, 0)
        );
        assert_eq!(
            registry
                .latest_commit_date("git@git.corp.example:a/b.git")
                .await
                .unwrap(),
            at(2021, 1, 1, 0, 0, 0)
        );
        assert_eq!(github.calls(), 1);
        assert_eq!(internal.calls(), 1);
    }

    #[test]
    fn test_host_pattern_matching() {
        assert!(HostPattern::parse("github.com").matches("GitHub.com"));
        assert!(!HostPattern::parse("github.com").matches("api.github.com"));

        let wildcard = HostPattern::parse("*.example.com");
        assert!(wildcard.matches("git.example.com"));
        assert!(!wildcard.matches("example.com"));
        assert!(!wildcard.matches("badexample.com"));
    }
}
