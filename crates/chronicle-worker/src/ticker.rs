//! Single-flight guard for the worker tick.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Admits at most one outstanding unit of work.
///
/// A tick that arrives while another is still running is skipped rather
/// than queued.
#[derive(Debug, Clone)]
pub struct SingleFlight {
    slot: Arc<Semaphore>,
}

impl Default for SingleFlight {
    fn default() -> Self {
        Self::new()
    }
}

impl SingleFlight {
    /// Create an idle guard.
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Semaphore::new(1)),
        }
    }

    /// Take the slot if it is free. The slot is released when the returned
    /// permit is dropped.
    pub fn try_enter(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.slot).try_acquire_owned().ok()
    }

    /// Whether a unit of work currently holds the slot.
    pub fn is_busy(&self) -> bool {
        self.slot.available_permits() == 0
    }

    /// Wait until the in-flight unit of work, if any, has finished.
    pub async fn wait_idle(&self) {
        // The slot is never closed.
        if let Ok(permit) = self.slot.acquire().await {
            drop(permit);
        }
    }
}
