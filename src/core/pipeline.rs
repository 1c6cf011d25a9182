//! The contract between the worker pool and a layered pipeline.
//!
//! The pool never looks inside the pipeline. It only asks it to process one
//! layer at a time, from that layer's dedicated worker thread.

use crate::core::error::LayerId;
use crate::core::semaphore::CountingSemaphore;
use std::cell::Cell;

/// A pipeline whose state is partitioned into independent layers.
///
/// `process` is called concurrently for different layers, one call per layer
/// per round. Implementations must only touch the state of the layer they
/// are given; the round barrier is the only other synchronization.
///
/// Errors are the pipeline's own concern. A panic ends the calling worker
/// thread and the round it belongs to never completes.
pub trait LayerPipeline: Send + Sync + 'static {
    /// Run one round of work for `layer`.
    fn process(&self, layer: LayerId);

    /// Run one round of work for `layer`, marking the point at which its
    /// results become ready for inspection.
    ///
    /// Call [`FrameReady::post`] once the layer's inspectable state is final.
    /// If it is never called, the worker posts it after this method returns.
    fn process_staged(&self, layer: LayerId, _ready: &FrameReady<'_>) {
        self.process(layer);
    }
}

impl<F> LayerPipeline for F
where
    F: Fn(LayerId) + Send + Sync + 'static,
{
    fn process(&self, layer: LayerId) {
        self(layer)
    }
}

/// Handle a layer uses to signal its ready point within a round.
///
/// Posting is idempotent: only the first call counts.
pub struct FrameReady<'a> {
    semaphore: &'a CountingSemaphore,
    posted: Cell<bool>,
}

impl<'a> FrameReady<'a> {
    pub(crate) fn new(semaphore: &'a CountingSemaphore) -> Self {
        Self {
            semaphore,
            posted: Cell::new(false),
        }
    }

    /// Signal that this layer's results are ready for inspection.
    pub fn post(&self) {
        if !self.posted.replace(true) {
            self.semaphore.post_one();
        }
    }

    /// Whether this round's ready signal has been sent.
    pub fn is_posted(&self) -> bool {
        self.posted.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_ready_posts_once() {
        let sem = CountingSemaphore::new(0);
        let ready = FrameReady::new(&sem);
        assert!(!ready.is_posted());

        ready.post();
        ready.post();
        assert!(ready.is_posted());
        assert_eq!(sem.value(), 1);
    }

    #[test]
    fn test_closure_is_a_pipeline() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let pipeline = move |layer: LayerId| {
            counter.fetch_add(layer.index() + 1, Ordering::SeqCst);
        };

        let sem = CountingSemaphore::new(0);
        let ready = FrameReady::new(&sem);
        pipeline.process_staged(LayerId(2), &ready);

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // The default staging leaves the ready post to the caller.
        assert!(!ready.is_posted());
    }
}
