//! Repository cloning

use std::path::Path;

use async_trait::async_trait;
use git2::build::RepoBuilder;
use git2::{Cred, CredentialType, FetchOptions, RemoteCallbacks};
use tracing::{debug, info};

use crate::retry::{retry_async, RetryConfig};
use crate::secrets::Credentials;
use crate::{Error, Result};

/// How many times libgit2 may ask for credentials before we give up
const MAX_CREDENTIAL_ATTEMPTS: u32 = 3;

/// Clones a remote repository into a local directory
#[async_trait]
pub trait Cloner: Send + Sync {
    /// Clone `repo_url` into `destination`, checking out the default branch
    ///
    /// `destination` must not exist or be empty.
    async fn clone_repo(&self, repo_url: &str, destination: &Path) -> Result<()>;
}

/// [`Cloner`] backed by libgit2
#[derive(Clone)]
pub struct Git2Cloner {
    credentials: Option<Credentials>,
    retry: RetryConfig,
}

impl std::fmt::Debug for Git2Cloner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git2Cloner")
            .field("has_credentials", &self.credentials.is_some())
            .finish_non_exhaustive()
    }
}

impl Git2Cloner {
    /// Create a cloner authenticating with `credentials` when the remote asks
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self {
            credentials,
            retry: RetryConfig::default(),
        }
    }

    /// Set the retry policy for transient network failures
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl Cloner for Git2Cloner {
    async fn clone_repo(&self, repo_url: &str, destination: &Path) -> Result<()> {
        let url = repo_url.trim().to_string();
        let destination = destination.to_path_buf();

        retry_async(&self.retry, "git clone", || {
            let url = url.clone();
            let destination = destination.clone();
            let credentials = self.credentials.clone();
            async move {
                tokio::task::spawn_blocking(move || clone_blocking(&url, &destination, credentials))
                    .await
                    .map_err(|e| Error::Other(format!("Clone task failed: {}", e)))?
            }
        })
        .await?;

        info!(url = %url, path = %destination.display(), "Cloned repository");
        Ok(())
    }
}

fn clone_blocking(url: &str, destination: &Path, credentials: Option<Credentials>) -> Result<()> {
    // A previous failed attempt may have left a partial checkout behind
    if destination.exists() {
        std::fs::remove_dir_all(destination)?;
    }
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut attempts = 0;
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, username_from_url, allowed| {
        attempts += 1;
        if attempts > MAX_CREDENTIAL_ATTEMPTS {
            return Err(git2::Error::new(
                git2::ErrorCode::Auth,
                git2::ErrorClass::Http,
                "remote rejected the configured credentials",
            ));
        }

        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
            if let Some(creds) = &credentials {
                return Cred::userpass_plaintext(&creds.username, &creds.password);
            }
        }
        if allowed.contains(CredentialType::SSH_KEY) {
            return Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"));
        }
        Cred::default()
    });

    let mut fetch_options = FetchOptions::new();
    fetch_options.remote_callbacks(callbacks);

    debug!(url = %url, path = %destination.display(), "Starting clone");

    // Full checkout: the archive needs the working tree contents
    RepoBuilder::new()
        .fetch_options(fetch_options)
        .clone(url, destination)?;

    Ok(())
}
