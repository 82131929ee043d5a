//! gitdav GitHub - commit dates of GitHub-hosted repositories
//!
//! Provides the [`gitdav_core::CommitDateLookup`] used by the freshness check
//! for `github.com` URLs.

mod client;
mod error;

pub use client::{GitHubCommitLookup, GITHUB_HOST};
pub use error::{Error, Result};
