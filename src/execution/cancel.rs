//! Cancellation of running rounds.

use crate::execution::orchestrator::RoundSync;
use std::sync::Arc;

/// Stops the worker pool from any thread.
///
/// Cancelling closes the round semaphores: workers waiting for a release
/// exit their loop, and a caller blocked in a round gets
/// [`RoundError::Cancelled`](crate::core::error::RoundError::Cancelled).
/// A worker in the middle of its pipeline call finishes that call first.
#[derive(Clone)]
pub struct CancelToken {
    sync: Arc<RoundSync>,
}

impl CancelToken {
    pub(crate) fn new(sync: Arc<RoundSync>) -> Self {
        Self { sync }
    }

    /// Request cancellation. Later calls have no effect.
    pub fn cancel(&self) {
        if self.sync.cancel() {
            log::warn!("Rounds cancelled");
        }
    }

    /// Check if the rounds were cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.sync.is_cancelled()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
