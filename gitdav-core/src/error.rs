//! Error types for gitdav

use serde::Serialize;
use thiserror::Error;

/// Result type alias for gitdav operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for gitdav operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Git error not covered by a more specific variant
    #[error("Git error: {0}")]
    Git(String),

    /// Credentials were rejected (git remote, WebDAV or provider API)
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// No commit-date provider is registered for the repository host
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Transport-level failure (connect, reset, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Remote answered with an unexpected HTTP status
    #[error("HTTP {status} from {url}")]
    Http {
        /// Response status code
        status: u16,
        /// Request URL
        url: String,
    },

    /// Malformed URL, archive name or response body
    #[error("Parse error: {0}")]
    Parse(String),

    /// Freshness lookup failed
    #[error("Freshness lookup failed: {0}")]
    Lookup(#[source] Box<Error>),

    /// Archive could not be written
    #[error("Archive error: {0}")]
    Archive(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The request queue no longer accepts work
    #[error("Backup queue is closed")]
    QueueClosed,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

/// Coarse error category carried in backup reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Auth,
    NotSupported,
    Network,
    Io,
    Parse,
    Config,
    Other,
}

impl Error {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Auth(_) => ErrorKind::Auth,
            Error::NotSupported(_) => ErrorKind::NotSupported,
            Error::Network(_) | Error::Http { .. } => ErrorKind::Network,
            Error::Io(_) | Error::Archive(_) => ErrorKind::Io,
            Error::Parse(_) => ErrorKind::Parse,
            Error::Config(_) => ErrorKind::Config,
            Error::Lookup(inner) => inner.kind(),
            Error::Git(_) | Error::QueueClosed | Error::Other(_) => ErrorKind::Other,
        }
    }

    /// Whether retrying the failed operation may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Network(_) => true,
            Error::Http { status, .. } => *status == 429 || *status >= 500,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
            ),
            Error::Lookup(inner) => inner.is_transient(),
            _ => false,
        }
    }

    /// Wrap an error raised while determining freshness
    ///
    /// `NotSupported` and `Auth` are kept as-is so callers can tell them apart.
    pub fn lookup(err: Error) -> Self {
        match err {
            Error::NotSupported(_) | Error::Auth(_) | Error::Lookup(_) => err,
            other => Error::Lookup(Box::new(other)),
        }
    }
}

impl From<git2::Error> for Error {
    fn from(err: git2::Error) -> Self {
        match (err.code(), err.class()) {
            (git2::ErrorCode::Auth, _) => Error::Auth(err.message().to_string()),
            (_, git2::ErrorClass::Net | git2::ErrorClass::Http | git2::ErrorClass::Ssh) => {
                Error::Network(err.message().to_string())
            }
            _ => Error::Git(err.message().to_string()),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Error::Http {
                status: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            };
        }
        if err.is_decode() {
            return Error::Parse(err.to_string());
        }
        Error::Network(err.to_string())
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => Error::Io(e),
            other => Error::Archive(other.to_string()),
        }
    }
}
