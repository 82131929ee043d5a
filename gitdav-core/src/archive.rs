//! Packing a directory tree into a single archive file

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Component, Path};

use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::{Error, Result};

/// Writes the contents of a directory into one archive file
pub trait Archiver: Send + Sync {
    /// Archive every file below `source` into `destination`
    ///
    /// Member paths are relative to `source` and use `/` separators.
    fn archive(&self, source: &Path, destination: &Path) -> Result<ArchiveSummary>;
}

/// What went into an archive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Regular files stored
    pub files: usize,
    /// Directory entries stored
    pub directories: usize,
    /// Symbolic links stored as links
    pub symlinks: usize,
    /// Uncompressed payload size in bytes
    pub bytes: u64,
}

/// Zip [`Archiver`] storing entries without compression
///
/// Symbolic links are stored as links, never followed.
#[derive(Debug, Clone, Default)]
pub struct ZipArchiver;

impl ZipArchiver {
    pub fn stored() -> Self {
        Self
    }
}

impl Archiver for ZipArchiver {
    fn archive(&self, source: &Path, destination: &Path) -> Result<ArchiveSummary> {
        if !source.is_dir() {
            return Err(Error::Archive(format!(
                "Source is not a directory: {}",
                source.display()
            )));
        }
        if destination.starts_with(source) {
            return Err(Error::Archive(format!(
                "Archive {} must not be written inside {}",
                destination.display(),
                source.display()
            )));
        }

        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .large_file(true);

        let file = File::create(destination)?;
        let mut zip = ZipWriter::new(BufWriter::new(file));
        let mut summary = ArchiveSummary::default();

        for entry in WalkDir::new(source).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::Archive(format!("Failed to walk tree: {}", e)))?;
            let relative = entry
                .path()
                .strip_prefix(source)
                .map_err(|e| Error::Archive(e.to_string()))?;

            let Some(name) = member_name(relative) else {
                continue;
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                zip.add_directory(format!("{}/", name), options)?;
                summary.directories += 1;
            } else if file_type.is_file() {
                zip.start_file(name, options)?;
                let mut input = File::open(entry.path())?;
                summary.bytes += std::io::copy(&mut input, &mut zip)?;
                summary.files += 1;
            } else if file_type.is_symlink() {
                let target = std::fs::read_link(entry.path())?;
                zip.add_symlink(name, target.to_string_lossy().into_owned(), options)?;
                summary.symlinks += 1;
            } else {
                debug!(path = %entry.path().display(), "Skipping special file");
            }
        }

        let mut writer = zip.finish()?;
        writer.flush()?;

        debug!(
            archive = %destination.display(),
            files = summary.files,
            directories = summary.directories,
            symlinks = summary.symlinks,
            bytes = summary.bytes,
            "Archive written"
        );
        Ok(summary)
    }
}

/// Zip member name for a path relative to the archive root
///
/// Joins normal components with `/`; the root itself yields `None`.
pub fn member_name(relative: &Path) -> Option<String> {
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
