//! Layer worker.
//!
//! A worker is plain data: a layer index, the shared pipeline and the shared
//! round state. Its [`run`](LayerWorker::run) loop is the body of one
//! dedicated thread.

use crate::core::error::LayerId;
use crate::core::pipeline::LayerPipeline;
use crate::execution::options::RoundOptions;
use crate::execution::orchestrator::RoundSync;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

pub(crate) struct LayerWorker<P: LayerPipeline> {
    layer: LayerId,
    pipeline: Arc<P>,
    sync: Arc<RoundSync>,
}

impl<P: LayerPipeline> LayerWorker<P> {
    pub(crate) fn new(layer: LayerId, pipeline: Arc<P>, sync: Arc<RoundSync>) -> Self {
        Self {
            layer,
            pipeline,
            sync,
        }
    }

    /// Start the worker on its own named thread.
    pub(crate) fn spawn(self, options: &RoundOptions) -> std::io::Result<JoinHandle<()>> {
        let mut builder = thread::Builder::new().name(options.thread_name(self.layer.index()));
        if let Some(stack_size) = options.stack_size {
            builder = builder.stack_size(stack_size);
        }
        builder.spawn(move || self.run())
    }

    /// Wait for a release, process the layer, report completion. Repeat
    /// until the rounds are cancelled.
    ///
    /// A panic in the pipeline is not caught and ends the thread.
    pub(crate) fn run(self) {
        log::debug!("Layer {} worker started", self.layer);
        while self.sync.start_wait(self.layer).is_ok() {
            self.process_round();
        }
        log::debug!("Layer {} worker stopped", self.layer);
    }

    fn process_round(&self) {
        let started = Instant::now();

        let ready = self.sync.frame_ready();
        self.pipeline.process_staged(self.layer, &ready);
        if !ready.is_posted() {
            self.sync.frame_ready_post();
        }

        let elapsed = started.elapsed();
        log::trace!(
            "Layer {} finished round {} in {:?}",
            self.layer,
            self.sync.tracker().current_round(),
            elapsed
        );
        self.sync.tracker().layer_completed(self.layer, elapsed);
        self.sync.frame_done_post();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::FrameReady;
    use crate::execution::progress::RoundTracker;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
    }

    impl LayerPipeline for Counting {
        fn process(&self, _layer: LayerId) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct EarlyReady;

    impl LayerPipeline for EarlyReady {
        fn process(&self, _layer: LayerId) {}

        fn process_staged(&self, _layer: LayerId, ready: &FrameReady<'_>) {
            ready.post();
            ready.post();
        }
    }

    #[test]
    fn test_worker_processes_each_release_and_stops_on_cancel() {
        let sync = Arc::new(RoundSync::new(1, RoundTracker::new(1)));
        let pipeline = Arc::new(Counting {
            calls: AtomicUsize::new(0),
        });
        let handle = LayerWorker::new(LayerId(0), pipeline.clone(), sync.clone())
            .spawn(&RoundOptions::default())
            .unwrap();

        for _ in 0..3 {
            sync.start_post();
            sync.frame_ready_wait(1).unwrap();
            sync.frame_done_wait(1).unwrap();
        }
        assert_eq!(pipeline.calls.load(Ordering::SeqCst), 3);
        assert_eq!(sync.tracker().invocations(), vec![3]);

        sync.cancel();
        handle.join().unwrap();
    }

    #[test]
    fn test_worker_posts_ready_once_per_round() {
        let sync = Arc::new(RoundSync::new(1, RoundTracker::new(1)));
        let handle = LayerWorker::new(LayerId(0), Arc::new(EarlyReady), sync.clone())
            .spawn(&RoundOptions::default())
            .unwrap();

        sync.start_post();
        sync.frame_done_wait(1).unwrap();
        // The pipeline posted twice and the worker once more; only one counts.
        assert!(sync.frame_ready_try_wait(1));
        assert!(!sync.frame_ready_try_wait(1));

        sync.cancel();
        handle.join().unwrap();
    }

    #[test]
    fn test_worker_thread_is_named() {
        let sync = Arc::new(RoundSync::new(2, RoundTracker::new(2)));
        let names = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen = names.clone();
        let pipeline = Arc::new(move |_layer: LayerId| {
            seen.lock()
                .push(thread::current().name().map(str::to_string));
        });

        let options = RoundOptions::new().with_thread_name_prefix("octave");
        let handle = LayerWorker::new(LayerId(1), pipeline, sync.clone())
            .spawn(&options)
            .unwrap();

        sync.start_post();
        sync.frame_done_wait(1).unwrap();
        assert_eq!(names.lock().as_slice(), &[Some("octave-1".to_string())]);

        sync.cancel();
        handle.join().unwrap();
    }
}
