//! Git operations for gitdav
//!
//! This module provides repository URL parsing and cloning.

mod clone;
mod url;

pub use clone::{Cloner, Git2Cloner};
pub use url::RepoUrl;
