//! In-memory fakes shared by unit tests

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::freshness::CommitDateLookup;
use crate::git::Cloner;
use crate::store::BackupStore;
use crate::{Error, Result};

/// Store keeping resources in a map
#[derive(Default)]
pub struct MemoryStore {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    list_failure: Mutex<Option<Error>>,
    put_failure: Mutex<Option<Error>>,
    puts: AtomicUsize,
}

impl MemoryStore {
    pub fn with_names(names: &[&str]) -> Self {
        let store = Self::default();
        {
            let mut files = store.files.lock().unwrap();
            for name in names {
                files.insert(name.to_string(), Vec::new());
            }
        }
        store
    }

    /// Fail the next `list` call with `err`
    pub fn fail_list(&self, err: Error) {
        *self.list_failure.lock().unwrap() = Some(err);
    }

    /// Fail the next `put` call with `err`
    pub fn fail_put(&self, err: Error) {
        *self.put_failure.lock().unwrap() = Some(err);
    }

    pub fn names(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }

    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(name).cloned()
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackupStore for MemoryStore {
    async fn list(&self) -> Result<Vec<String>> {
        if let Some(err) = self.list_failure.lock().unwrap().take() {
            return Err(err);
        }
        Ok(self.names())
    }

    async fn put(&self, name: &str, bytes: Bytes) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.put_failure.lock().unwrap().take() {
            return Err(err);
        }
        self.files.lock().unwrap().insert(name.to_string(), bytes.to_vec());
        Ok(())
    }
}

/// Commit-date source answering with one fixed instant
pub struct FixedCommitDate {
    date: Mutex<DateTime<Utc>>,
    calls: AtomicUsize,
}

impl FixedCommitDate {
    pub fn new(date: DateTime<Utc>) -> Self {
        Self {
            date: Mutex::new(date),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommitDateLookup for FixedCommitDate {
    async fn latest_commit_date(&self, _repo_url: &str) -> Result<DateTime<Utc>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.date.lock().unwrap())
    }
}

/// Cloner that writes a small fixed tree instead of talking to a remote
#[derive(Default)]
pub struct FakeCloner {
    delay: Option<Duration>,
    failure: Mutex<Option<Error>>,
    panic: AtomicBool,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl FakeCloner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` inside every clone
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Fail the next clone with `err`
    pub fn fail_next(&self, err: Error) {
        *self.failure.lock().unwrap() = Some(err);
    }

    /// Panic inside the next clone
    pub fn panic_next(&self) {
        self.panic.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of clones that were in flight at once
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// URLs in the order they were cloned
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Cloner for FakeCloner {
    async fn clone_repo(&self, repo_url: &str, destination: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(repo_url.to_string());
        if self.panic.swap(false, Ordering::SeqCst) {
            panic!("clone of {} panicked", repo_url);
        }

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failure.lock().unwrap().take();
        let result = match failure {
            Some(err) => Err(err),
            None => write_tree(destination),
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn write_tree(destination: &Path) -> Result<()> {
    std::fs::create_dir_all(destination.join("src"))?;
    std::fs::create_dir_all(destination.join(".git"))?;
    std::fs::write(destination.join("README.md"), "# repo\n")?;
    std::fs::write(destination.join("src").join("lib.rs"), "pub fn f() {}\n")?;
    std::fs::write(destination.join(".git").join("HEAD"), "ref: refs/heads/main\n")?;
    Ok(())
}
