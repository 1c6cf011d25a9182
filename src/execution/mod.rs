//! Round execution module.
//!
//! This module runs the per-layer worker pool in lock-step rounds.

pub mod cancel;
pub mod options;
pub mod orchestrator;
pub mod progress;
mod worker;

pub use cancel::CancelToken;
pub use options::RoundOptions;
pub use orchestrator::RoundOrchestrator;
pub use progress::{RoundEvent, RoundReport, RoundStats};
