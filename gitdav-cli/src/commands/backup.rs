//! Backup command - back up one repository in the foreground

use clap::Args;
use gitdav_core::{BackupOutcome, Config, Secrets};

use super::build_service;

/// Back up a single repository now
#[derive(Args, Debug)]
pub struct BackupArgs {
    /// Repository clone URL
    url: String,

    /// Skip the freshness check and always create a new archive
    #[arg(long)]
    force: bool,
}

impl BackupArgs {
    /// Execute the backup command
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        config.validate()?;
        let secrets = Secrets::load_with_overrides()?;
        secrets.require_backup()?;

        let service = build_service(config, &secrets)?;
        let report = if self.force {
            service.force(&self.url).await
        } else {
            service.process(&self.url).await
        };

        let elapsed = report.finished_at - report.started_at;
        match &report.outcome {
            BackupOutcome::Created { archive, size } => {
                println!(
                    "Created {} ({} bytes) in {}s",
                    archive,
                    size,
                    elapsed.num_seconds()
                );
            }
            BackupOutcome::Skipped { last_backup } => {
                println!(
                    "Skipped: backup from {} is newer than the latest commit",
                    last_backup.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
            BackupOutcome::Failed { kind, message } => {
                anyhow::bail!("Backup of {} failed ({:?}): {}", report.repo_url, kind, message);
            }
        }

        Ok(())
    }
}
