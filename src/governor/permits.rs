//! Counting permit pool for blocking entry points.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GovernorError {
    #[error("permit pool is closed")]
    Closed,
}

/// Bounds how many blocking invocations of one unit run at once. A permit is
/// an owned guard: it goes back to the pool when dropped, on every exit path,
/// including a handler thread that outlives its timed-out request.
#[derive(Debug, Clone)]
pub struct PermitPool {
    capacity: usize,
    semaphore: Arc<Semaphore>,
}

impl PermitPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_use(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }

    /// Waits for a free permit.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, GovernorError> {
        if self.available() == 0 {
            debug!(
                component = "governor",
                event = "permit_wait",
                capacity = self.capacity,
                "all permits in use, waiting"
            );
        }
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| GovernorError::Closed)
    }

    pub fn try_acquire(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.semaphore).try_acquire_owned().ok()
    }

    /// Rejects current waiters and all later acquisitions.
    pub fn close(&self) {
        self.semaphore.close();
    }
}
