//! Parsing and authenticating backup submissions

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::naming::extract_repo_base_name;
use crate::scheduler::Scheduler;
use crate::Error as CoreError;

/// Split a submission body into repository URLs
///
/// One URL per line; surrounding whitespace is trimmed and blank lines are
/// dropped.
pub fn parse_repository_list(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Hex SHA-256 digest of `token`, as stored in `GITDAV_TOKEN_HASH`
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Checks caller tokens against a configured SHA-256 digest
#[derive(Clone)]
pub struct TokenVerifier {
    expected: [u8; 32],
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier").finish_non_exhaustive()
    }
}

impl TokenVerifier {
    /// Create a verifier from a hex digest (either case)
    pub fn from_hex(digest: &str) -> crate::Result<Self> {
        let bytes = hex::decode(digest.trim())
            .map_err(|e| CoreError::Config(format!("Token hash is not valid hex: {}", e)))?;
        let expected: [u8; 32] = bytes.try_into().map_err(|_| {
            CoreError::Config("Token hash must be a 64-character SHA-256 digest".to_string())
        })?;
        Ok(Self { expected })
    }

    /// Whether `token` hashes to the configured digest
    pub fn verify(&self, token: &str) -> bool {
        let digest = Sha256::digest(token.as_bytes());
        digest.as_slice().ct_eq(&self.expected).into()
    }
}

/// Why a submission was not (fully) accepted
#[derive(Debug, Error)]
pub enum IntakeError {
    /// The body listed no repositories
    #[error("No repositories in request body")]
    Empty,

    /// A line is not a usable repository URL
    #[error("Invalid repository on line {line}: {reason}")]
    InvalidRepository {
        /// 1-based position among non-blank lines
        line: usize,
        /// Why the line was rejected
        reason: String,
    },

    /// The queue refused a request; earlier ones stay queued
    #[error("Queued {queued} of {total} repositories: {source}")]
    Enqueue {
        /// Requests accepted before the failure
        queued: usize,
        /// Requests in the submission
        total: usize,
        /// Queue error
        #[source]
        source: CoreError,
    },
}

/// Validate every line of `body`, then queue them in order
///
/// Nothing is queued when any line is invalid.
pub fn submit(scheduler: &Scheduler, body: &str) -> Result<usize, IntakeError> {
    let repos = parse_repository_list(body);
    if repos.is_empty() {
        return Err(IntakeError::Empty);
    }

    for (index, repo) in repos.iter().enumerate() {
        extract_repo_base_name(repo).map_err(|e| IntakeError::InvalidRepository {
            line: index + 1,
            reason: e.to_string(),
        })?;
    }

    let total = repos.len();
    let mut queued = 0;
    for repo in repos {
        scheduler.enqueue(repo).map_err(|source| IntakeError::Enqueue {
            queued,
            total,
            source,
        })?;
        queued += 1;
    }
    Ok(queued)
}
