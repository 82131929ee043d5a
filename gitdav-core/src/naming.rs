//! Archive naming and backup-age resolution
//!
//! Archive names are the only persisted state: `<base><yyyyMMddHHmmss>.zip`.
//! The same names listed back from the store tell us when a repository was
//! last backed up.

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use regex::Regex;
use tracing::warn;

use crate::{Error, Result};

/// Timestamp layout embedded in archive names
pub const STAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Number of digits in the embedded timestamp
pub const STAMP_DIGITS: usize = 14;

/// Archive file extension, including the dot
pub const ARCHIVE_EXTENSION: &str = ".zip";

/// Derive the repository base name from a clone URL
///
/// Takes the last `/`-separated segment and strips one trailing `.git`.
pub fn extract_repo_base_name(repo_url: &str) -> Result<String> {
    let trimmed = repo_url.trim().trim_end_matches('/');
    let segment = trimmed.rsplit('/').next().unwrap_or(trimmed);
    let name = segment.strip_suffix(".git").unwrap_or(segment);

    if name.is_empty() || name == "." || name == ".." || name.contains('\\') {
        return Err(Error::Parse(format!(
            "Cannot derive repository name from '{}'",
            repo_url.trim()
        )));
    }

    Ok(name.to_string())
}

/// Name of one backup archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveName {
    base: String,
    stamp: NaiveDateTime,
}

impl ArchiveName {
    /// Create an archive name for `base` stamped at `created_at`
    ///
    /// Sub-second precision is dropped.
    pub fn new(base: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        let stamp = created_at.naive_utc();
        let stamp = stamp.with_nanosecond(0).unwrap_or(stamp);
        Self {
            base: base.into(),
            stamp,
        }
    }

    /// Creation instant
    pub fn created_at(&self) -> DateTime<Utc> {
        self.stamp.and_utc()
    }

    /// File / resource name
    pub fn file_name(&self) -> String {
        format!(
            "{}{}{}",
            self.base,
            self.stamp.format(STAMP_FORMAT),
            ARCHIVE_EXTENSION
        )
    }

    /// Parse `name` as an archive of repository `base`
    ///
    /// Returns `Ok(None)` when the name belongs to another repository or is
    /// not an archive, and an error when the digits are not a valid instant.
    pub fn parse_for(base: &str, name: &str) -> Result<Option<Self>> {
        ArchiveMatcher::new(base)?.parse(name)
    }
}

impl std::fmt::Display for ArchiveName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// Compiled archive-name pattern of one repository
struct ArchiveMatcher<'a> {
    base: &'a str,
    pattern: Regex,
}

impl<'a> ArchiveMatcher<'a> {
    fn new(base: &'a str) -> Result<Self> {
        let pattern = Regex::new(&format!(
            r"^{}(\d{{{}}})\.zip$",
            regex::escape(base),
            STAMP_DIGITS
        ))
        .map_err(|e| Error::Parse(format!("Invalid archive pattern for '{}': {}", base, e)))?;
        Ok(Self { base, pattern })
    }

    fn parse(&self, name: &str) -> Result<Option<ArchiveName>> {
        let Some(caps) = self.pattern.captures(name) else {
            return Ok(None);
        };

        let digits = &caps[1];
        let stamp = NaiveDateTime::parse_from_str(digits, STAMP_FORMAT).map_err(|e| {
            Error::Parse(format!("Invalid timestamp '{}' in '{}': {}", digits, name, e))
        })?;

        Ok(Some(ArchiveName {
            base: self.base.to_string(),
            stamp,
        }))
    }
}

/// Most recent backup instant of `base` among the listed resource names
///
/// Names that do not belong to `base` are ignored; names with an invalid
/// timestamp are logged and ignored.
pub fn resolve_last_backup_timestamp<I, S>(base: &str, listing: I) -> Option<DateTime<Utc>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let matcher = match ArchiveMatcher::new(base) {
        Ok(matcher) => matcher,
        Err(e) => {
            warn!(error = %e, "Cannot match archive names");
            return None;
        }
    };

    listing
        .into_iter()
        .filter_map(|name| match matcher.parse(name.as_ref()) {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "Ignoring unparseable archive name");
                None
            }
        })
        .map(|archive| archive.created_at())
        .max()
}
