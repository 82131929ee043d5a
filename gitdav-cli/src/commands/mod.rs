//! CLI command implementations

pub mod backup;
pub mod hash_token;
pub mod serve;

pub use backup::BackupArgs;
pub use hash_token::HashTokenArgs;
pub use serve::ServeArgs;

use std::sync::Arc;

use gitdav_core::{
    BackupPipeline, BackupService, BackupStore, Config, FreshnessOracle, Git2Cloner,
    ProviderRegistry, Secrets, WebDavClient, ZipArchiver,
};
use gitdav_github::{GitHubCommitLookup, GITHUB_HOST};
use tracing::debug;

/// Wire the WebDAV store, GitHub lookup, git cloner and zip archiver together
pub fn build_service(config: &Config, secrets: &Secrets) -> anyhow::Result<BackupService> {
    let store: Arc<dyn BackupStore> = Arc::new(
        WebDavClient::new(
            config.webdav_url()?,
            secrets.webdav.username.clone(),
            secrets.webdav.password.clone(),
        )?
        .with_retry(config.retry.clone()),
    );

    let github = GitHubCommitLookup::new(secrets.github_token())
        .map_err(gitdav_core::Error::from)?
        .with_retry(config.retry.clone());
    let providers = ProviderRegistry::new().register(GITHUB_HOST, Arc::new(github));
    debug!(providers = ?providers, "Registered commit-date providers");

    let credentials = (!secrets.git.username.is_empty()).then(|| secrets.git.clone());
    let cloner = Git2Cloner::new(credentials).with_retry(config.retry.clone());

    let oracle = FreshnessOracle::new(Arc::clone(&store), Arc::new(providers));
    let pipeline = BackupPipeline::new(
        config.local_root()?,
        Arc::new(cloner),
        Arc::new(ZipArchiver::stored()),
        store,
    );

    Ok(BackupService::new(oracle, Arc::new(pipeline)))
}
