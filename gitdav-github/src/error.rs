//! Error types for GitHub operations

use thiserror::Error;

/// Result type for GitHub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during GitHub operations
#[derive(Error, Debug)]
pub enum Error {
    /// Transport or client-side failure talking to the API
    #[error("GitHub API error: {0}")]
    Api(#[from] octocrab::Error),

    /// API answered with an error status
    #[error("GitHub returned {status} for {route}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// API route that was requested
        route: String,
        /// Error message from the response body
        message: String,
    },

    /// Authentication error
    #[error("GitHub authentication error: {0}")]
    Auth(String),

    /// Rate limit exceeded on the given route
    #[error("GitHub rate limit exceeded for {0}")]
    RateLimited(String),

    /// Repository has no commits
    #[error("Repository {0} has no commits")]
    NoCommits(String),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<Error> for gitdav_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Api(e) => gitdav_core::Error::Network(e.to_string()),
            Error::Status { status, route, .. } => gitdav_core::Error::Http { status, url: route },
            Error::Auth(msg) => gitdav_core::Error::Auth(msg),
            Error::RateLimited(route) => gitdav_core::Error::Http {
                status: 429,
                url: route,
            },
            Error::NoCommits(repo) => {
                gitdav_core::Error::Other(format!("Repository {} has no commits", repo))
            }
            Error::Parse(msg) => gitdav_core::Error::Parse(msg),
        }
    }
}
