//! FIFO of pending backup requests

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{Error, Result};

/// One repository waiting to be backed up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupRequest {
    /// Repository clone URL
    pub repo_url: String,
    /// When the request was accepted
    pub enqueued_at: DateTime<Utc>,
}

impl BackupRequest {
    pub fn new(repo_url: impl Into<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
            enqueued_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<BackupRequest>,
    closed: bool,
}

/// Unbounded, in-memory request queue shared by intake and the scheduler
#[derive(Debug, Default)]
pub struct BackupQueue {
    state: Mutex<QueueState>,
}

impl BackupQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a request; fails once the queue is closed
    pub fn push(&self, request: BackupRequest) -> Result<()> {
        let mut state = self.state();
        if state.closed {
            return Err(Error::QueueClosed);
        }
        state.items.push_back(request);
        Ok(())
    }

    /// Append requests in order, stopping at the first failure
    ///
    /// Returns how many were accepted.
    pub fn extend<I>(&self, requests: I) -> Result<usize>
    where
        I: IntoIterator<Item = BackupRequest>,
    {
        let mut count = 0;
        for request in requests {
            self.push(request)?;
            count += 1;
        }
        Ok(count)
    }

    /// Remove and return the oldest request
    pub fn pop_front(&self) -> Option<BackupRequest> {
        self.state().items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.state().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().items.is_empty()
    }

    /// Reject further pushes; queued requests stay poppable
    pub fn close(&self) {
        self.state().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}
