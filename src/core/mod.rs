//! Core types and traits for pyramid-rounds.
//!
//! This module contains the building blocks the worker pool is made of:
//! - The counting semaphore
//! - The layered pipeline contract
//! - Error types

pub mod error;
pub mod pipeline;
pub mod semaphore;

// Re-export commonly used types
pub use error::{LayerId, RoundError, RoundResult, SemaphoreClosed};
pub use pipeline::{FrameReady, LayerPipeline};
pub use semaphore::CountingSemaphore;
