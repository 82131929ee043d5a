//! gitdav core - repository backups to a WebDAV collection
//!
//! Repositories submitted over HTTP are queued and backed up one at a time:
//! cloned, packed into a timestamped zip archive and uploaded. A repository
//! whose newest archive is later than its latest upstream commit is skipped.

pub mod archive;
pub mod config;
pub mod error;
pub mod freshness;
pub mod git;
pub mod intake;
pub mod naming;
pub mod pipeline;
pub mod retry;
pub mod scheduler;
pub mod secrets;
pub mod service;
pub mod store;
pub mod webdav;

#[cfg(test)]
mod testutil;

pub use archive::{ArchiveSummary, Archiver, ZipArchiver};
pub use config::{Config, SchedulerConfig};
pub use error::{Error, ErrorKind, Result};
pub use freshness::{CommitDateLookup, Freshness, FreshnessOracle, ProviderRegistry};
pub use git::{Cloner, Git2Cloner, RepoUrl};
pub use intake::{parse_repository_list, IntakeError, TokenVerifier};
pub use naming::{extract_repo_base_name, resolve_last_backup_timestamp, ArchiveName};
pub use pipeline::{BackupArtifact, BackupPipeline};
pub use retry::RetryConfig;
pub use scheduler::{Scheduler, SchedulerStatus};
pub use secrets::{Credentials, Secrets};
pub use service::{BackupOutcome, BackupReport, BackupService};
pub use store::BackupStore;
pub use webdav::WebDavClient;
