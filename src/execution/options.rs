//! Worker pool options.

use crate::core::error::{RoundError, RoundResult};
use crate::execution::progress::{RoundCallback, RoundEvent};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Default prefix for worker thread names.
pub const DEFAULT_THREAD_PREFIX: &str = "layer";

/// Options for spawning the worker pool.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundOptions {
    /// Worker threads are named `<prefix>-<layer>`.
    pub thread_name_prefix: String,
    /// Stack size for worker threads in bytes (None = platform default).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_size: Option<usize>,
    /// Callback for round events.
    #[serde(skip)]
    pub event_callback: Option<Arc<RoundCallback>>,
}

impl std::fmt::Debug for RoundOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundOptions")
            .field("thread_name_prefix", &self.thread_name_prefix)
            .field("stack_size", &self.stack_size)
            .field("event_callback", &self.event_callback.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl Default for RoundOptions {
    fn default() -> Self {
        Self {
            thread_name_prefix: DEFAULT_THREAD_PREFIX.to_string(),
            stack_size: None,
            event_callback: None,
        }
    }
}

impl RoundOptions {
    /// Create a new options builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker thread name prefix.
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the worker thread stack size in bytes.
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Set the round event callback.
    pub fn with_events<F>(mut self, callback: F) -> Self
    where
        F: Fn(RoundEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(Arc::new(Box::new(callback)));
        self
    }

    /// Parse options from TOML.
    pub fn from_toml_str(source: &str) -> RoundResult<Self> {
        let options: Self = toml::from_str(source)?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> RoundResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Check the options for values the pool cannot use.
    pub fn validate(&self) -> RoundResult<()> {
        if self.thread_name_prefix.is_empty() {
            return Err(RoundError::Config(
                "thread_name_prefix must not be empty".to_string(),
            ));
        }
        if self.thread_name_prefix.contains('\0') {
            return Err(RoundError::Config(
                "thread_name_prefix must not contain NUL".to_string(),
            ));
        }
        if self.stack_size == Some(0) {
            return Err(RoundError::Config("stack_size must be positive".to_string()));
        }
        Ok(())
    }

    /// Name of the worker thread for `layer`.
    pub(crate) fn thread_name(&self, layer: usize) -> String {
        format!("{}-{}", self.thread_name_prefix, layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_options_builder() {
        let options = RoundOptions::new()
            .with_thread_name_prefix("octave")
            .with_stack_size(1 << 20)
            .with_events(|_| {});

        assert_eq!(options.thread_name(2), "octave-2");
        assert_eq!(options.stack_size, Some(1 << 20));
        assert!(options.event_callback.is_some());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_options_from_toml() {
        let options = RoundOptions::from_toml_str(
            r#"
            thread_name_prefix = "octave"
            stack_size = 262144
            "#,
        )
        .unwrap();
        assert_eq!(options.thread_name_prefix, "octave");
        assert_eq!(options.stack_size, Some(262_144));

        let defaults = RoundOptions::from_toml_str("").unwrap();
        assert_eq!(defaults.thread_name_prefix, DEFAULT_THREAD_PREFIX);
        assert_eq!(defaults.stack_size, None);
    }

    #[test]
    fn test_invalid_options_rejected() {
        assert!(matches!(
            RoundOptions::from_toml_str("thread_name_prefix = \"\""),
            Err(RoundError::Config(_))
        ));
        assert!(matches!(
            RoundOptions::from_toml_str("stack_size = 0"),
            Err(RoundError::Config(_))
        ));
        assert!(matches!(
            RoundOptions::from_toml_str("stack_size = \"big\""),
            Err(RoundError::Config(_))
        ));
    }

    #[test]
    fn test_options_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "thread_name_prefix = \"pyr\"").unwrap();

        let options = RoundOptions::from_file(file.path()).unwrap();
        assert_eq!(options.thread_name(0), "pyr-0");

        assert!(matches!(
            RoundOptions::from_file("/nonexistent/rounds.toml"),
            Err(RoundError::Io(_))
        ));
    }
}
