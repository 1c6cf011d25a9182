//! Round tracking and progress events.

use crate::core::error::LayerId;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A progress event emitted while rounds run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RoundEvent {
    /// The worker pool is running.
    Initialized {
        layers: usize,
    },
    /// Workers were released for a round.
    RoundStarted {
        round: u64,
        layers: usize,
    },
    /// A layer finished its work for a round. Sent from the worker thread.
    LayerCompleted {
        round: u64,
        layer: LayerId,
        duration_ms: u64,
    },
    /// Every layer reached its ready point.
    FrameReady {
        round: u64,
    },
    /// Every layer finished the round.
    RoundCompleted {
        round: u64,
        duration_ms: u64,
    },
    /// Rounds were cancelled.
    Cancelled,
}

/// Callback type for round events.
///
/// Invoked from the orchestrator's thread and from worker threads.
pub type RoundCallback = Box<dyn Fn(RoundEvent) + Send + Sync>;

/// Outcome of one completed round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoundReport {
    /// Zero-based index of the round.
    pub round: u64,
    /// Time from release to the last layer's completion.
    pub duration: Duration,
}

/// Aggregate statistics over all completed rounds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RoundStats {
    /// Number of rounds that completed.
    pub rounds_completed: u64,
    /// Total time spent inside rounds.
    pub total_duration: Duration,
    /// Duration of the most recent round.
    pub last_round_duration: Option<Duration>,
    /// Processing calls per layer, indexed by layer.
    pub layer_invocations: Vec<u64>,
}

impl RoundStats {
    /// Average round duration, if any round completed.
    pub fn average_round_duration(&self) -> Option<Duration> {
        if self.rounds_completed == 0 {
            return None;
        }
        Some(match u32::try_from(self.rounds_completed) {
            Ok(rounds) => self.total_duration / rounds,
            Err(_) => self.total_duration.div_f64(self.rounds_completed as f64),
        })
    }

    /// Total processing calls across all layers.
    pub fn total_invocations(&self) -> u64 {
        self.layer_invocations.iter().sum()
    }
}

/// Counts per-layer work and forwards events to the callback.
///
/// Shared between the orchestrator and its workers.
pub struct RoundTracker {
    /// Processing calls per layer.
    invocations: Vec<AtomicU64>,
    /// Index of the round currently released (or last released).
    current_round: AtomicU64,
    /// Event callback.
    callback: Option<RoundCallback>,
}

impl RoundTracker {
    /// Create a tracker for `layers` layers.
    pub fn new(layers: usize) -> Self {
        Self {
            invocations: (0..layers).map(|_| AtomicU64::new(0)).collect(),
            current_round: AtomicU64::new(0),
            callback: None,
        }
    }

    /// Set a callback for round events.
    pub fn with_callback(mut self, callback: RoundCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Record the index of the round about to be released.
    ///
    /// Must happen before the release so workers observe it.
    pub fn begin_round(&self, round: u64) {
        self.current_round.store(round, Ordering::Release);
    }

    /// Index of the round most recently released.
    pub fn current_round(&self) -> u64 {
        self.current_round.load(Ordering::Acquire)
    }

    /// Record one processing call for `layer`.
    pub fn layer_completed(&self, layer: LayerId, duration: Duration) {
        self.invocations[layer.index()].fetch_add(1, Ordering::Relaxed);
        self.emit(RoundEvent::LayerCompleted {
            round: self.current_round(),
            layer,
            duration_ms: duration.as_millis() as u64,
        });
    }

    /// Processing calls recorded for each layer.
    pub fn invocations(&self) -> Vec<u64> {
        self.invocations
            .iter()
            .map(|count| count.load(Ordering::Relaxed))
            .collect()
    }

    /// Forward an event to the callback, if any.
    pub fn emit(&self, event: RoundEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }
}

impl std::fmt::Debug for RoundTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundTracker")
            .field("invocations", &self.invocations())
            .field("current_round", &self.current_round())
            .field("callback", &self.callback.as_ref().map(|_| "<callback>"))
            .finish()
    }
}
