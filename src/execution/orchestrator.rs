//! Round orchestrator.
//!
//! The orchestrator owns one worker thread per layer and drives them in
//! lock-step rounds. A round releases every worker, waits until every layer
//! has reached its ready point, optionally inspects the pipeline, and waits
//! until every layer has finished. Rounds never overlap.

use crate::core::error::{LayerId, RoundError, RoundResult, SemaphoreClosed};
use crate::core::pipeline::{FrameReady, LayerPipeline};
use crate::core::semaphore::CountingSemaphore;
use crate::execution::cancel::CancelToken;
use crate::execution::options::RoundOptions;
use crate::execution::progress::{RoundEvent, RoundReport, RoundStats, RoundTracker};
use crate::execution::worker::LayerWorker;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Synchronization state shared by the orchestrator and its workers.
///
/// `start` holds one semaphore per layer so that a worker can only consume
/// its own release. `frame_ready` and `frame_done` are shared; only the
/// orchestrator waits on them.
pub(crate) struct RoundSync {
    start: Vec<CountingSemaphore>,
    frame_ready: CountingSemaphore,
    frame_done: CountingSemaphore,
    cancelled: AtomicBool,
    tracker: RoundTracker,
}

impl RoundSync {
    pub(crate) fn new(layers: usize, tracker: RoundTracker) -> Self {
        Self {
            start: (0..layers).map(|_| CountingSemaphore::new(0)).collect(),
            frame_ready: CountingSemaphore::new(0),
            frame_done: CountingSemaphore::new(0),
            cancelled: AtomicBool::new(false),
            tracker,
        }
    }

    pub(crate) fn layers(&self) -> usize {
        self.start.len()
    }

    pub(crate) fn tracker(&self) -> &RoundTracker {
        &self.tracker
    }

    // ========================================================================
    // Protocol accessors
    // ========================================================================

    /// Block `layer`'s worker until it is released for a round.
    pub(crate) fn start_wait(&self, layer: LayerId) -> Result<(), SemaphoreClosed> {
        self.start[layer.index()].wait_one()
    }

    /// Release every layer for one round.
    pub(crate) fn start_post(&self) {
        for slot in &self.start {
            slot.post_one();
        }
    }

    pub(crate) fn frame_ready_wait(&self, n: usize) -> Result<(), SemaphoreClosed> {
        self.frame_ready.wait(n)
    }

    pub(crate) fn frame_ready_wait_timeout(
        &self,
        n: usize,
        timeout: Duration,
    ) -> Result<bool, SemaphoreClosed> {
        self.frame_ready.wait_timeout(n, timeout)
    }

    #[cfg(test)]
    pub(crate) fn frame_ready_try_wait(&self, n: usize) -> bool {
        self.frame_ready.try_wait(n)
    }

    pub(crate) fn frame_ready_post(&self) {
        self.frame_ready.post_one();
    }

    /// Per-round handle through which a layer posts its ready signal.
    pub(crate) fn frame_ready(&self) -> FrameReady<'_> {
        FrameReady::new(&self.frame_ready)
    }

    pub(crate) fn frame_done_wait(&self, n: usize) -> Result<(), SemaphoreClosed> {
        self.frame_done.wait(n)
    }

    pub(crate) fn frame_done_wait_timeout(
        &self,
        n: usize,
        timeout: Duration,
    ) -> Result<bool, SemaphoreClosed> {
        self.frame_done.wait_timeout(n, timeout)
    }

    pub(crate) fn frame_done_post(&self) {
        self.frame_done.post_one();
    }

    // ========================================================================
    // Cancellation
    // ========================================================================

    /// Close every semaphore. Returns false if already cancelled.
    pub(crate) fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }
        for slot in &self.start {
            slot.close();
        }
        self.frame_ready.close();
        self.frame_done.close();
        self.tracker.emit(RoundEvent::Cancelled);
        true
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

struct WorkerHandle {
    layer: LayerId,
    thread: Option<JoinHandle<()>>,
}

/// Drives a fixed pool of per-layer worker threads in rounds.
///
/// # Example
///
/// ```
/// use pyramid_rounds::prelude::*;
/// use std::sync::atomic::{AtomicU64, Ordering};
/// use std::sync::Arc;
///
/// let calls = Arc::new(AtomicU64::new(0));
/// let counter = calls.clone();
/// let pipeline = Arc::new(move |_layer: LayerId| {
///     counter.fetch_add(1, Ordering::Relaxed);
/// });
///
/// let mut rounds = RoundOrchestrator::init(pipeline, 4).unwrap();
/// rounds.one_round().unwrap();
/// rounds.one_round().unwrap();
/// assert_eq!(calls.load(Ordering::Relaxed), 8);
/// rounds.shutdown().unwrap();
/// ```
pub struct RoundOrchestrator<P: LayerPipeline> {
    pipeline: Arc<P>,
    sync: Arc<RoundSync>,
    workers: Vec<WorkerHandle>,
    rounds_completed: u64,
    total_duration: Duration,
    last_round_duration: Option<Duration>,
    /// Set once a round timed out; its workers may still be running.
    stalled_round: Option<u64>,
}

impl<P: LayerPipeline> RoundOrchestrator<P> {
    /// Spawn `layers` workers bound to `pipeline` with default options.
    pub fn init(pipeline: Arc<P>, layers: usize) -> RoundResult<Self> {
        Self::init_with_options(pipeline, layers, RoundOptions::default())
    }

    /// Spawn `layers` workers bound to `pipeline`.
    ///
    /// Every worker blocks until the first round is released.
    pub fn init_with_options(
        pipeline: Arc<P>,
        layers: usize,
        options: RoundOptions,
    ) -> RoundResult<Self> {
        if layers == 0 {
            return Err(RoundError::InvalidLayerCount);
        }
        options.validate()?;

        let mut tracker = RoundTracker::new(layers);
        if let Some(callback) = &options.event_callback {
            let callback = callback.clone();
            tracker = tracker.with_callback(Box::new(move |event| callback(event)));
        }
        let sync = Arc::new(RoundSync::new(layers, tracker));

        let mut workers = Vec::with_capacity(layers);
        for index in 0..layers {
            let layer = LayerId(index);
            let worker = LayerWorker::new(layer, pipeline.clone(), sync.clone());
            match worker.spawn(&options) {
                Ok(thread) => workers.push(WorkerHandle {
                    layer,
                    thread: Some(thread),
                }),
                Err(source) => {
                    log::error!("Failed to spawn worker for layer {}: {}", layer, source);
                    // Releases the workers already started.
                    sync.cancel();
                    return Err(RoundError::Spawn { layer, source });
                }
            }
        }

        log::info!("Started {} layer workers", layers);
        sync.tracker().emit(RoundEvent::Initialized { layers });

        Ok(Self {
            pipeline,
            sync,
            workers,
            rounds_completed: 0,
            total_duration: Duration::ZERO,
            last_round_duration: None,
            stalled_round: None,
        })
    }

    /// Run one round: release every layer and wait until all have finished.
    ///
    /// Blocks indefinitely if a worker never finishes (for example because
    /// its pipeline call panicked). Only fails once the rounds are cancelled.
    pub fn one_round(&mut self) -> RoundResult<RoundReport> {
        self.one_round_inspect(|_| ()).map(|(report, ())| report)
    }

    /// Run one round, calling `inspect` once every layer has reached its
    /// ready point and before waiting for the layers to finish.
    ///
    /// `inspect` runs on the caller's thread while workers may still be
    /// finishing their layers, so it must only read state that is final at
    /// the ready point. If `inspect` panics the round is abandoned and every
    /// later round fails with [`RoundError::Stalled`].
    pub fn one_round_inspect<F, R>(&mut self, inspect: F) -> RoundResult<(RoundReport, R)>
    where
        F: FnOnce(&P) -> R,
    {
        let (round, started) = self.release()?;
        let layers = self.layers();

        self.sync.frame_ready_wait(layers)?;
        self.sync.tracker().emit(RoundEvent::FrameReady { round });
        // Stays set if `inspect` unwinds.
        self.stalled_round = Some(round);
        let value = inspect(&self.pipeline);
        self.stalled_round = None;

        self.sync.frame_done_wait(layers)?;
        Ok((self.finish_round(round, started), value))
    }

    /// Run one round, giving up after `timeout`.
    ///
    /// On expiry the round is abandoned and the orchestrator is stalled:
    /// every later round fails with [`RoundError::Stalled`]. The error is
    /// [`RoundError::WorkerPanicked`] if a worker thread died, otherwise
    /// [`RoundError::Timeout`].
    pub fn one_round_timeout(&mut self, timeout: Duration) -> RoundResult<RoundReport> {
        let (round, started) = self.release()?;
        let layers = self.layers();
        // None when the timeout is too large to be a deadline: wait without limit.
        let deadline = started.checked_add(timeout);

        let remaining = || {
            deadline.map_or(Duration::MAX, |deadline| {
                deadline.saturating_duration_since(Instant::now())
            })
        };
        let mut completed = self.sync.frame_ready_wait_timeout(layers, remaining())?;
        if completed {
            self.sync.tracker().emit(RoundEvent::FrameReady { round });
            completed = self.sync.frame_done_wait_timeout(layers, remaining())?;
        }

        if !completed {
            self.stalled_round = Some(round);
            log::warn!("Round {} did not complete within {:?}", round, timeout);
            if let Some(error) = self.reap_dead_worker() {
                return Err(error);
            }
            return Err(RoundError::Timeout {
                round,
                timeout_ms: timeout.as_millis() as u64,
            });
        }

        Ok(self.finish_round(round, started))
    }

    fn release(&mut self) -> RoundResult<(u64, Instant)> {
        if let Some(round) = self.stalled_round {
            return Err(RoundError::Stalled { round });
        }
        if self.sync.is_cancelled() {
            return Err(RoundError::Cancelled);
        }

        let round = self.rounds_completed;
        let layers = self.layers();
        self.sync.tracker().begin_round(round);
        self.sync.tracker().emit(RoundEvent::RoundStarted { round, layers });
        log::debug!("Releasing round {} to {} layers", round, layers);

        let started = Instant::now();
        self.sync.start_post();
        Ok((round, started))
    }

    fn finish_round(&mut self, round: u64, started: Instant) -> RoundReport {
        let duration = started.elapsed();
        self.rounds_completed += 1;
        self.total_duration += duration;
        self.last_round_duration = Some(duration);

        log::debug!("Round {} completed in {:?}", round, duration);
        self.sync.tracker().emit(RoundEvent::RoundCompleted {
            round,
            duration_ms: duration.as_millis() as u64,
        });

        RoundReport { round, duration }
    }

    /// Join the first worker thread that has already died.
    fn reap_dead_worker(&mut self) -> Option<RoundError> {
        for worker in &mut self.workers {
            let finished = worker
                .thread
                .as_ref()
                .is_some_and(|thread| thread.is_finished());
            if !finished {
                continue;
            }
            if let Some(Err(payload)) = worker.thread.take().map(JoinHandle::join) {
                let message = panic_message(payload);
                log::error!("Worker for layer {} panicked: {}", worker.layer, message);
                return Some(RoundError::WorkerPanicked {
                    layer: worker.layer,
                    message,
                });
            }
        }
        None
    }

    /// Token that cancels the rounds from any thread.
    pub fn cancel_token(&self) -> CancelToken {
        CancelToken::new(self.sync.clone())
    }

    /// Cancel the rounds and join every worker thread.
    ///
    /// Blocks until each worker is back at its release point, so a worker
    /// stuck inside its pipeline call keeps this from returning.
    pub fn shutdown(mut self) -> RoundResult<()> {
        if self.sync.cancel() {
            log::info!("Shutting down {} layer workers", self.layers());
        }

        let mut first_panic = None;
        for worker in std::mem::take(&mut self.workers) {
            let Some(thread) = worker.thread else {
                continue;
            };
            if let Err(payload) = thread.join() {
                let message = panic_message(payload);
                log::error!("Worker for layer {} panicked: {}", worker.layer, message);
                first_panic.get_or_insert(RoundError::WorkerPanicked {
                    layer: worker.layer,
                    message,
                });
            }
        }

        match first_panic {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Number of layers (and worker threads).
    pub fn layers(&self) -> usize {
        self.sync.layers()
    }

    /// The shared pipeline.
    pub fn pipeline(&self) -> &Arc<P> {
        &self.pipeline
    }

    /// Number of rounds completed so far.
    pub fn rounds_completed(&self) -> u64 {
        self.rounds_completed
    }

    /// Statistics over all completed rounds.
    pub fn stats(&self) -> RoundStats {
        RoundStats {
            rounds_completed: self.rounds_completed,
            total_duration: self.total_duration,
            last_round_duration: self.last_round_duration,
            layer_invocations: self.sync.tracker().invocations(),
        }
    }
}

impl<P: LayerPipeline> Drop for RoundOrchestrator<P> {
    fn drop(&mut self) {
        // Workers are not joined here; one may be stuck in its pipeline call.
        if self.sync.cancel() {
            log::debug!("Orchestrator dropped, cancelling {} layer workers", self.layers());
        }
    }
}

impl<P: LayerPipeline> std::fmt::Debug for RoundOrchestrator<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundOrchestrator")
            .field("layers", &self.layers())
            .field("rounds_completed", &self.rounds_completed)
            .field("stalled_round", &self.stalled_round)
            .field("cancelled", &self.sync.is_cancelled())
            .finish()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
