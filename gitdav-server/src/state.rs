use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use gitdav_core::{BackupReport, Scheduler, TokenVerifier};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::warn;

/// Shared application state, cloned into every handler
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Scheduler,
    pub verifier: Arc<TokenVerifier>,
    pub history: ReportLog,
}

impl AppState {
    pub fn new(scheduler: Scheduler, verifier: TokenVerifier, history: ReportLog) -> Self {
        Self {
            scheduler,
            verifier: Arc::new(verifier),
            history,
        }
    }
}

/// Bounded ring of the most recent backup reports, newest last
#[derive(Debug, Clone)]
pub struct ReportLog {
    reports: Arc<Mutex<VecDeque<BackupReport>>>,
    capacity: usize,
}

impl ReportLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            reports: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    fn reports(&self) -> MutexGuard<'_, VecDeque<BackupReport>> {
        self.reports.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, report: BackupReport) {
        if self.capacity == 0 {
            return;
        }
        let mut reports = self.reports();
        while reports.len() >= self.capacity {
            reports.pop_front();
        }
        reports.push_back(report);
    }

    pub fn recent(&self) -> Vec<BackupReport> {
        self.reports().iter().cloned().collect()
    }

    /// Record every report published on `receiver` until the channel closes
    pub fn follow(&self, mut receiver: broadcast::Receiver<BackupReport>) -> JoinHandle<()> {
        let log = self.clone();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(report) => log.record(report),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Report history fell behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
