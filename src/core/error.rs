//! Error types for pyramid-rounds.
//!
//! Uses thiserror for structured errors with context. Errors are designed to:
//! - Name the layer (worker thread) that caused them
//! - Separate fatal conditions from an orderly cancellation
//! - Serialize layer identities for reporting

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Index of a pipeline layer, in `[0, layers)`.
///
/// Each layer is driven by exactly one worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LayerId(pub usize);

impl LayerId {
    /// Create a layer ID from its index.
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// The raw index of this layer.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl From<usize> for LayerId {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A wait was interrupted because its semaphore was closed.
///
/// Semaphores are only closed by cancellation; a semaphore that is never
/// closed never produces this error.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("semaphore closed")]
pub struct SemaphoreClosed;

/// Errors from driving rounds.
#[derive(Error, Debug)]
pub enum RoundError {
    #[error("Layer count must be at least 1")]
    InvalidLayerCount,

    #[error("Failed to spawn worker thread for layer {layer}: {source}")]
    Spawn {
        layer: LayerId,
        #[source]
        source: std::io::Error,
    },

    #[error("Rounds cancelled")]
    Cancelled,

    #[error("Round {round} did not complete within {timeout_ms} ms")]
    Timeout { round: u64, timeout_ms: u64 },

    #[error("Orchestrator stalled: round {round} never completed")]
    Stalled { round: u64 },

    #[error("Worker for layer {layer} panicked: {message}")]
    WorkerPanicked { layer: LayerId, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SemaphoreClosed> for RoundError {
    fn from(_: SemaphoreClosed) -> Self {
        RoundError::Cancelled
    }
}

impl From<toml::de::Error> for RoundError {
    fn from(error: toml::de::Error) -> Self {
        RoundError::Config(error.to_string())
    }
}

impl RoundError {
    /// Check if this error leaves the worker pool unusable.
    ///
    /// Cancellation is an orderly stop; configuration and spawn errors
    /// happen before any round runs.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RoundError::Timeout { .. }
                | RoundError::Stalled { .. }
                | RoundError::WorkerPanicked { .. }
        )
    }

    /// Get the layer that caused this error, if applicable.
    pub fn layer(&self) -> Option<LayerId> {
        match self {
            RoundError::Spawn { layer, .. } | RoundError::WorkerPanicked { layer, .. } => {
                Some(*layer)
            }
            _ => None,
        }
    }
}

/// Result type alias for round operations.
pub type RoundResult<T> = Result<T, RoundError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_id_display() {
        assert_eq!(LayerId::new(3).to_string(), "3");
        assert_eq!(LayerId::from(7).index(), 7);
    }

    #[test]
    fn test_closed_semaphore_maps_to_cancelled() {
        let error: RoundError = SemaphoreClosed.into();
        assert!(matches!(error, RoundError::Cancelled));
        assert!(!error.is_fatal());
    }

    #[test]
    fn test_fatal_errors_name_their_layer() {
        let error = RoundError::WorkerPanicked {
            layer: LayerId(2),
            message: "boom".to_string(),
        };
        assert!(error.is_fatal());
        assert_eq!(error.layer(), Some(LayerId(2)));
        assert!(error.to_string().contains("layer 2"));

        let timeout = RoundError::Timeout {
            round: 4,
            timeout_ms: 50,
        };
        assert!(timeout.is_fatal());
        assert_eq!(timeout.layer(), None);
    }
}
