//! At most one backup in flight

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Binary, non-blocking execution token
#[derive(Debug, Clone)]
pub struct ExecutionGate {
    semaphore: Arc<Semaphore>,
}

/// Proof of holding the gate; released on drop
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl Default for ExecutionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionGate {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
        }
    }

    /// Take the gate if nobody holds it
    pub fn try_acquire(&self) -> Option<GatePermit> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| GatePermit { _permit: permit })
    }

    /// Whether a permit is currently held
    pub fn is_busy(&self) -> bool {
        self.semaphore.available_permits() == 0
    }
}
