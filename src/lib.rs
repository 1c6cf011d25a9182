//! # pyramid-rounds - Lock-step Layer Workers
//!
//! pyramid-rounds drives a multi-layer image pipeline (for example the octaves
//! of an image pyramid) with one dedicated worker thread per layer. An
//! orchestrator releases every worker at the start of a round and blocks until
//! every layer has finished before the next round can begin.
//!
//! ## Features
//!
//! - **Round Barrier**: rounds never overlap; each layer runs exactly once per round
//! - **Counting Semaphores**: wait/post primitives with no lost wakeups
//! - **Ready Point**: layers can signal mid-round that their results may be inspected
//! - **Cancellation**: a token that releases every blocked thread for shutdown
//! - **Timeouts**: opt-in bounded rounds that name a worker that died
//!
//! ## Quick Start
//!
//! ```rust
//! use pyramid_rounds::prelude::*;
//! use std::sync::Arc;
//!
//! let pyramid = Arc::new(OctavePyramid::new(3, 128));
//! let mut rounds = RoundOrchestrator::init(pyramid.clone(), 3).unwrap();
//!
//! for frame in 0..2 {
//!     // Workers are idle between rounds, so the host may touch every layer.
//!     pyramid.load_frame(&ring_target(96, 64, frame), frame);
//!     rounds.one_round().unwrap();
//! }
//!
//! assert_eq!(pyramid.summaries().len(), 3);
//! rounds.shutdown().unwrap();
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: counting semaphore, the pipeline contract, error types
//! - [`execution`]: orchestrator, layer workers, options, events, cancellation
//! - [`pyramid`]: an octave pyramid pipeline used by the CLI
//!
//! ## Writing a Pipeline
//!
//! Implement [`LayerPipeline`](core::pipeline::LayerPipeline). Each call must
//! only touch the state of the layer it is given:
//!
//! ```rust
//! use pyramid_rounds::prelude::*;
//! use parking_lot::Mutex;
//!
//! struct Accumulate {
//!     totals: Vec<Mutex<u64>>,
//! }
//!
//! impl LayerPipeline for Accumulate {
//!     fn process(&self, layer: LayerId) {
//!         *self.totals[layer.index()].lock() += 1;
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod core;
pub mod execution;
pub mod pyramid;

/// Prelude module for convenient imports.
///
/// Import everything commonly needed with:
/// ```rust
/// use pyramid_rounds::prelude::*;
/// ```
pub mod prelude {
    // Core
    pub use crate::core::error::{LayerId, RoundError, RoundResult, SemaphoreClosed};
    pub use crate::core::pipeline::{FrameReady, LayerPipeline};
    pub use crate::core::semaphore::CountingSemaphore;

    // Execution
    pub use crate::execution::cancel::CancelToken;
    pub use crate::execution::options::RoundOptions;
    pub use crate::execution::orchestrator::RoundOrchestrator;
    pub use crate::execution::progress::{RoundCallback, RoundEvent, RoundReport, RoundStats};

    // Pyramid pipeline
    pub use crate::pyramid::{ring_target, DemoConfig, OctavePyramid, OctaveSummary};
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use std::sync::Arc;

    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
        assert_eq!(super::NAME, "pyramid-rounds");
    }

    #[test]
    fn test_pyramid_rounds_end_to_end() {
        let pyramid = Arc::new(OctavePyramid::new(3, 100));
        let mut rounds = RoundOrchestrator::init(pyramid.clone(), 3).unwrap();

        for frame in 0..4 {
            pyramid.load_frame(&ring_target(120, 80, frame), frame);
            let (report, ready) = rounds
                .one_round_inspect(|pyramid| pyramid.ready_layers())
                .unwrap();
            assert_eq!(report.round, frame);
            assert_eq!(ready, 3);

            let summaries = pyramid.summaries();
            assert_eq!(summaries.len(), 3);
            assert!(summaries.iter().all(|summary| summary.frame == frame));
        }

        assert_eq!(rounds.stats().layer_invocations, vec![4, 4, 4]);
        rounds.shutdown().unwrap();
    }
}
