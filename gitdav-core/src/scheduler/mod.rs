//! Single-flight backup scheduler
//!
//! A periodic tick pops at most one request and runs it on its own task. The
//! execution gate keeps a second backup from starting while one is in flight;
//! ticks that find the gate taken do nothing.

mod gate;
mod queue;

pub use gate::{ExecutionGate, GatePermit};
pub use queue::{BackupQueue, BackupRequest};

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::config::SchedulerConfig;
use crate::service::{BackupReport, BackupService};
use crate::Result;

/// Smallest capacity of the completion channel
const MIN_REPORT_CAPACITY: usize = 16;

/// Snapshot of scheduler state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    /// Requests waiting in the queue
    pub queued: usize,
    /// Repository currently being backed up
    pub running: Option<String>,
    /// Whether the queue still accepts requests
    pub accepting: bool,
}

/// Polls the queue and dispatches one backup at a time
#[derive(Debug, Clone)]
pub struct Scheduler {
    queue: Arc<BackupQueue>,
    gate: ExecutionGate,
    service: Arc<BackupService>,
    reports: broadcast::Sender<BackupReport>,
    current: Arc<Mutex<Option<String>>>,
    tick_interval: Duration,
}

impl Scheduler {
    pub fn new(service: BackupService, config: SchedulerConfig) -> Self {
        let (reports, _) = broadcast::channel(config.report_history.max(MIN_REPORT_CAPACITY));
        Self {
            queue: Arc::new(BackupQueue::new()),
            gate: ExecutionGate::new(),
            service: Arc::new(service),
            reports,
            current: Arc::new(Mutex::new(None)),
            tick_interval: config.tick_interval,
        }
    }

    /// Queue one repository
    pub fn enqueue(&self, repo_url: impl Into<String>) -> Result<()> {
        let request = BackupRequest::new(repo_url);
        debug!(url = %request.repo_url, "Queued backup request");
        self.queue.push(request)
    }

    /// Queue repositories in order; stops at the first rejected one
    pub fn enqueue_all<I, S>(&self, repo_urls: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.queue
            .extend(repo_urls.into_iter().map(BackupRequest::new))
    }

    /// Receive a report for every finished request
    pub fn subscribe(&self) -> broadcast::Receiver<BackupReport> {
        self.reports.subscribe()
    }

    /// Stop accepting requests
    pub fn close(&self) {
        self.queue.close();
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            queued: self.queue.len(),
            running: self.current().clone(),
            accepting: !self.queue.is_closed(),
        }
    }

    fn current(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One scheduler tick
    ///
    /// Returns `None` when the queue is empty or a backup is already running.
    /// Otherwise pops exactly one request and spawns its backup; the task
    /// holds the gate until the backup ends.
    pub fn try_dispatch_next(&self) -> Option<JoinHandle<BackupReport>> {
        if self.queue.is_empty() {
            return None;
        }
        let permit = self.gate.try_acquire()?;
        let request = self.queue.pop_front()?;

        let waited = Utc::now() - request.enqueued_at;
        info!(
            url = %request.repo_url,
            queued = self.queue.len(),
            waited_ms = waited.num_milliseconds(),
            "Dispatching backup"
        );
        let running = RunningSlot::occupy(Arc::clone(&self.current), &request.repo_url);

        let service = Arc::clone(&self.service);
        let reports = self.reports.clone();

        Some(tokio::spawn(async move {
            let report = service.process(&request.repo_url).await;

            drop(running);
            drop(permit);

            // No subscribers is fine
            let _ = reports.send(report.clone());
            report
        }))
    }

    /// Tick until `shutdown` resolves, then close the queue
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(interval = ?self.tick_interval, "Scheduler started");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    if self.try_dispatch_next().is_none() {
                        debug!("Nothing to dispatch");
                    }
                }
            }
        }

        self.close();
        info!(remaining = self.queue.len(), "Scheduler stopped");
    }
}

/// Holds the repository shown as running; cleared on drop
struct RunningSlot {
    current: Arc<Mutex<Option<String>>>,
}

impl RunningSlot {
    fn occupy(current: Arc<Mutex<Option<String>>>, repo_url: &str) -> Self {
        *current.lock().unwrap_or_else(PoisonError::into_inner) = Some(repo_url.to_string());
        Self { current }
    }
}

impl Drop for RunningSlot {
    fn drop(&mut self) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
