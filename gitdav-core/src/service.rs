//! One backup request, end to end

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, instrument};

use crate::error::ErrorKind;
use crate::freshness::FreshnessOracle;
use crate::pipeline::BackupPipeline;
use crate::Result;

/// How a backup request ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackupOutcome {
    /// A new archive was uploaded
    Created {
        /// Archive resource name
        archive: String,
        /// Archive size in bytes
        size: u64,
    },
    /// The existing backup was already up to date
    Skipped {
        /// Stamp of the newest existing archive
        last_backup: DateTime<Utc>,
    },
    /// The request failed
    Failed {
        /// Error category
        kind: ErrorKind,
        /// Error message
        message: String,
    },
}

impl BackupOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, BackupOutcome::Failed { .. })
    }
}

/// Completion record of one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupReport {
    /// Repository URL as submitted
    pub repo_url: String,
    /// Result of the request
    pub outcome: BackupOutcome,
    /// When processing began
    pub started_at: DateTime<Utc>,
    /// When processing ended
    pub finished_at: DateTime<Utc>,
}

/// Freshness check followed by the backup pipeline
#[derive(Debug, Clone)]
pub struct BackupService {
    oracle: FreshnessOracle,
    pipeline: Arc<BackupPipeline>,
}

impl BackupService {
    pub fn new(oracle: FreshnessOracle, pipeline: Arc<BackupPipeline>) -> Self {
        Self { oracle, pipeline }
    }

    /// Back up `repo_url` unless its newest archive is current
    ///
    /// Never fails; errors end up in the report.
    #[instrument(skip(self, repo_url), fields(repo = %repo_url.trim()))]
    pub async fn process(&self, repo_url: &str) -> BackupReport {
        let started_at = Utc::now();
        let outcome = settle(self.backup_if_stale(repo_url).await);
        report(repo_url, outcome, started_at)
    }

    /// Back up `repo_url` without consulting the freshness oracle
    #[instrument(skip(self, repo_url), fields(repo = %repo_url.trim()))]
    pub async fn force(&self, repo_url: &str) -> BackupReport {
        let started_at = Utc::now();
        let outcome = settle(self.backup(repo_url).await);
        report(repo_url, outcome, started_at)
    }

    async fn backup_if_stale(&self, repo_url: &str) -> Result<BackupOutcome> {
        let freshness = self.oracle.check(repo_url).await?;
        if let (true, Some(last_backup)) = (freshness.is_up_to_date(), freshness.last_backup()) {
            info!(last_backup = %last_backup, "Backup is already up to date");
            return Ok(BackupOutcome::Skipped { last_backup });
        }
        self.backup(repo_url).await
    }

    async fn backup(&self, repo_url: &str) -> Result<BackupOutcome> {
        let artifact = self.pipeline.run_backup(repo_url).await?;
        Ok(BackupOutcome::Created {
            archive: artifact.archive.file_name(),
            size: artifact.size,
        })
    }
}

fn settle(result: Result<BackupOutcome>) -> BackupOutcome {
    result.unwrap_or_else(|e| {
        error!(error = %e, "Backup failed");
        BackupOutcome::Failed {
            kind: e.kind(),
            message: e.to_string(),
        }
    })
}

fn report(repo_url: &str, outcome: BackupOutcome, started_at: DateTime<Utc>) -> BackupReport {
    BackupReport {
        repo_url: repo_url.to_string(),
        outcome,
        started_at,
        finished_at: Utc::now(),
    }
}
