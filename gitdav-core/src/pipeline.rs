//! Clone, archive and upload one repository
//!
//! The local root is a scratch area owned by the pipeline. It is emptied
//! before each run and again when the run ends, whether it succeeded or not.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use chrono::{DateTime, Duration, Timelike, Utc};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, info, warn};

use crate::archive::Archiver;
use crate::git::Cloner;
use crate::naming::{extract_repo_base_name, ArchiveName};
use crate::store::BackupStore;
use crate::{Error, Result};

/// Source of archive-creation instants
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// What a successful run uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArtifact {
    /// Name of the uploaded archive
    pub archive: ArchiveName,
    /// Archive size in bytes
    pub size: u64,
    /// Regular files packed into the archive
    pub files: usize,
}

/// Runs the backup steps for a single repository
pub struct BackupPipeline {
    local_root: PathBuf,
    cloner: Arc<dyn Cloner>,
    archiver: Arc<dyn Archiver>,
    store: Arc<dyn BackupStore>,
    clock: Clock,
    last_stamp: Mutex<Option<DateTime<Utc>>>,
}

impl std::fmt::Debug for BackupPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupPipeline")
            .field("local_root", &self.local_root)
            .finish_non_exhaustive()
    }
}

impl BackupPipeline {
    pub fn new(
        local_root: impl Into<PathBuf>,
        cloner: Arc<dyn Cloner>,
        archiver: Arc<dyn Archiver>,
        store: Arc<dyn BackupStore>,
    ) -> Self {
        Self {
            local_root: local_root.into(),
            cloner,
            archiver,
            store,
            clock: Arc::new(Utc::now),
            last_stamp: Mutex::new(None),
        }
    }

    /// Replace the wall clock used for archive stamps
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Back up `repo_url` and return the uploaded archive
    pub async fn run_backup(&self, repo_url: &str) -> Result<BackupArtifact> {
        let repo_url = repo_url.trim();
        let base = extract_repo_base_name(repo_url)?;

        prepare_root(&self.local_root).await?;
        let workspace = WorkspaceGuard::new(self.local_root.clone());
        let result = self.backup_in_root(repo_url, &base).await;
        workspace.release().await;
        result
    }

    async fn backup_in_root(&self, repo_url: &str, base: &str) -> Result<BackupArtifact> {
        let tree = self.local_root.join(base);
        info!(url = %repo_url, path = %tree.display(), "Cloning repository");
        self.cloner.clone_repo(repo_url, &tree).await?;

        let archive = ArchiveName::new(base, self.next_stamp());
        let archive_path = self.local_root.join(archive.file_name());

        let summary = {
            let archiver = Arc::clone(&self.archiver);
            let tree = tree.clone();
            let archive_path = archive_path.clone();
            tokio::task::spawn_blocking(move || archiver.archive(&tree, &archive_path))
                .await
                .map_err(|e| Error::Other(format!("Archive task failed: {}", e)))??
        };
        debug!(archive = %archive, files = summary.files, "Archived working tree");

        tokio::fs::remove_dir_all(&tree).await?;

        let bytes = Bytes::from(tokio::fs::read(&archive_path).await?);
        let size = bytes.len() as u64;
        self.store.put(&archive.file_name(), bytes).await?;
        info!(archive = %archive, size, "Uploaded archive");

        tokio::fs::remove_file(&archive_path).await?;

        Ok(BackupArtifact {
            archive,
            size,
            files: summary.files,
        })
    }

    /// Current clock reading, bumped past the previously issued stamp
    fn next_stamp(&self) -> DateTime<Utc> {
        let now = (self.clock)();
        let now = now.with_nanosecond(0).unwrap_or(now);

        let mut last = self
            .last_stamp
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let stamp = match *last {
            Some(previous) if now <= previous => previous + Duration::seconds(1),
            _ => now,
        };
        *last = Some(stamp);
        stamp
    }
}

async fn prepare_root(root: &Path) -> Result<()> {
    tokio::fs::create_dir_all(root).await?;
    clear_root(root.to_path_buf()).await
}

async fn clear_root(root: PathBuf) -> Result<()> {
    tokio::task::spawn_blocking(move || clear_dir(&root))
        .await
        .map_err(|e| Error::Other(format!("Cleanup task failed: {}", e)))??;
    Ok(())
}

/// Remove everything inside `root`, keeping `root` itself
fn clear_dir(root: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(entry.path())?;
        } else {
            std::fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

/// Empties the local root when a run ends
///
/// [`release`](Self::release) clears it off the async workers. Dropping an
/// unreleased guard (cancellation, panic) clears it in place.
struct WorkspaceGuard {
    root: Option<PathBuf>,
}

impl WorkspaceGuard {
    fn new(root: PathBuf) -> Self {
        Self { root: Some(root) }
    }

    async fn release(mut self) {
        if let Some(root) = self.root.take() {
            let path = root.clone();
            if let Err(e) = clear_root(root).await {
                warn!(path = %path.display(), error = %e, "Failed to clean local root");
            }
        }
    }
}

impl Drop for WorkspaceGuard {
    fn drop(&mut self) {
        let Some(root) = self.root.take() else {
            return;
        };
        let on_multi_thread = Handle::try_current()
            .is_ok_and(|handle| handle.runtime_flavor() == RuntimeFlavor::MultiThread);
        let result = if on_multi_thread {
            tokio::task::block_in_place(|| clear_dir(&root))
        } else {
            clear_dir(&root)
        };
        if let Err(e) = result {
            warn!(path = %root.display(), error = %e, "Failed to clean local root");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ZipArchiver;
    use crate::testutil::{FakeCloner, MemoryStore};
    use chrono::TimeZone;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn fixed_clock(at: DateTime<Utc>) -> Clock {
        Arc::new(move || at)
    }

    fn pipeline(root: &Path, cloner: Arc<FakeCloner>, store: Arc<MemoryStore>) -> BackupPipeline {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        BackupPipeline::new(root, cloner, Arc::new(ZipArchiver::stored()), store)
            .with_clock(fixed_clock(at))
    }

    fn is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_backup_uploads_archive_and_cleans_up() {
        let root = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let pipeline = pipeline(root.path(), Arc::new(FakeCloner::new()), store.clone());

        let artifact = pipeline
            .run_backup("https://github.com/org/repo.git")
            .await
            .unwrap();

        assert_eq!(artifact.archive.file_name(), "repo20240305070809.zip");
        assert_eq!(artifact.files, 3);
        assert_eq!(store.names(), vec!["repo20240305070809.zip"]);
        assert!(is_empty(root.path()));

        let bytes = store.contents("repo20240305070809.zip").unwrap();
        assert_eq!(bytes.len() as u64, artifact.size);
        let zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names: Vec<&str> = zip.file_names().collect();
        assert!(names.contains(&"README.md"));
        assert!(names.contains(&"src/lib.rs"));
        assert!(names.contains(&".git/HEAD"));
        assert!(names.iter().all(|n| !n.starts_with("repo/")));
    }

    #[tokio::test]
    async fn test_stale_content_is_removed_before_clone() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("leftover")).unwrap();
        std::fs::write(root.path().join("old20200101000000.zip"), "x").unwrap();

        let store = Arc::new(MemoryStore::default());
        let pipeline = pipeline(root.path(), Arc::new(FakeCloner::new()), store.clone());
        pipeline.run_backup("https://github.com/org/repo").await.unwrap();

        assert_eq!(store.names(), vec!["repo20240305070809.zip"]);
        assert!(is_empty(root.path()));
    }

    #[tokio::test]
    async fn test_upload_failure_still_cleans_up() {
        let root = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        store.fail_put(Error::Network("connection reset".into()));
        let pipeline = pipeline(root.path(), Arc::new(FakeCloner::new()), store.clone());

        let err = pipeline
            .run_backup("https://github.com/org/repo.git")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(_)));
        assert!(store.names().is_empty());
        assert!(is_empty(root.path()));
    }

    #[tokio::test]
    async fn test_clone_failure_uploads_nothing() {
        let root = TempDir::new().unwrap();
        let cloner = Arc::new(FakeCloner::new());
        cloner.fail_next(Error::Auth("bad credentials".into()));
        let store = Arc::new(MemoryStore::default());
        let pipeline = pipeline(root.path(), cloner, store.clone());

        let err = pipeline
            .run_backup("https://github.com/org/repo.git")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        assert_eq!(store.puts(), 0);
        assert!(is_empty(root.path()));
    }

    #[tokio::test]
    async fn test_invalid_url_fails_before_clone() {
        let root = TempDir::new().unwrap();
        let cloner = Arc::new(FakeCloner::new());
        let pipeline = pipeline(root.path(), cloner.clone(), Arc::new(MemoryStore::default()));

        assert!(matches!(
            pipeline.run_backup("   ").await,
            Err(Error::Parse(_))
        ));
        assert_eq!(cloner.calls(), 0);
    }

    #[tokio::test]
    async fn test_stamps_never_repeat() {
        let root = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let pipeline = pipeline(root.path(), Arc::new(FakeCloner::new()), store.clone());

        let first = pipeline.run_backup("https://github.com/org/repo").await.unwrap();
        let second = pipeline.run_backup("https://github.com/org/repo").await.unwrap();

        assert!(second.archive.created_at() > first.archive.created_at());
        assert_eq!(store.names().len(), 2);
        assert!(store.names().contains(&"repo20240305070810.zip".to_string()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropped_guard_clears_root_on_worker() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("repo").join("src")).unwrap();
        std::fs::write(root.path().join("repo20240101120000.zip"), "partial").unwrap();

        drop(WorkspaceGuard::new(root.path().to_path_buf()));
        assert!(is_empty(root.path()));
    }

    #[tokio::test]
    async fn test_cancelled_run_leaves_root_empty() {
        let root = TempDir::new().unwrap();
        let cloner = Arc::new(FakeCloner::with_delay(std::time::Duration::from_secs(30)));
        let pipeline = pipeline(root.path(), cloner.clone(), Arc::new(MemoryStore::default()));
        std::fs::write(root.path().join("stale.txt"), "x").unwrap();

        let run = pipeline.run_backup("https://github.com/org/repo");
        let timed_out =
            tokio::time::timeout(std::time::Duration::from_millis(50), run).await;

        assert!(timed_out.is_err());
        assert_eq!(cloner.calls(), 1);
        assert!(is_empty(root.path()));
    }
}
