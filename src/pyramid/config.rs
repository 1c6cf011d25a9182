//! Configuration for the octave pyramid demo.

use crate::core::error::{RoundError, RoundResult};
use crate::execution::options::RoundOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Settings for a pyramid run, loadable from TOML.
///
/// ```toml
/// layers = 4
/// rounds = 10
/// width = 640
/// height = 480
/// edge_threshold = 128
/// round_timeout_ms = 2000
///
/// [workers]
/// thread_name_prefix = "octave"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Number of octaves, one worker thread each.
    pub layers: usize,
    /// Number of frames (rounds) to process.
    pub rounds: u64,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Gradient magnitude above which a pixel counts as an edge.
    pub edge_threshold: u16,
    /// Per-round time limit; rounds are unbounded without it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_timeout_ms: Option<u64>,
    /// Worker pool options.
    pub workers: RoundOptions,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            layers: 4,
            rounds: 10,
            width: 640,
            height: 480,
            edge_threshold: 128,
            round_timeout_ms: None,
            workers: RoundOptions::default(),
        }
    }
}

impl DemoConfig {
    /// Parse a configuration from TOML. Missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> RoundResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> RoundResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Render the configuration as TOML.
    pub fn to_toml_string(&self) -> RoundResult<String> {
        toml::to_string_pretty(self).map_err(|e| RoundError::Config(e.to_string()))
    }

    /// Check for values the demo cannot run with.
    pub fn validate(&self) -> RoundResult<()> {
        if self.layers == 0 {
            return Err(RoundError::InvalidLayerCount);
        }
        if self.width == 0 || self.height == 0 {
            return Err(RoundError::Config(format!(
                "frame size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.round_timeout_ms == Some(0) {
            return Err(RoundError::Config(
                "round_timeout_ms must be positive".to_string(),
            ));
        }
        self.workers.validate()
    }

    /// Per-round time limit, if configured.
    pub fn round_timeout(&self) -> Option<Duration> {
        self.round_timeout_ms.map(Duration::from_millis)
    }
}
