//! Worker configuration.
//!
//! Configuration is loaded in the following order (later overrides
//! earlier):
//! 1. Default values
//! 2. YAML config file (if specified via MACHINA_CONFIG or `from_file`)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file {}: {1}", .0.display())]
    Parse(PathBuf, String),
}

/// Tunables for the asynchronous execution policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Name given to the worker thread.
    pub thread_name: String,

    /// Initial capacity of the event queue.
    pub queue_capacity: usize,

    /// Log unhandled root events at warn level (debug level otherwise).
    pub warn_unhandled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            thread_name: "machina-worker".to_string(),
            queue_capacity: 64,
            warn_unhandled: true,
        }
    }
}

impl WorkerConfig {
    /// Loads configuration from file (if MACHINA_CONFIG is set), then
    /// applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = if let Ok(path) = std::env::var("MACHINA_CONFIG") {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: WorkerConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Applies `MACHINA_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(name) = std::env::var("MACHINA_THREAD_NAME") {
            self.thread_name = name;
        }
        if let Ok(capacity) = std::env::var("MACHINA_QUEUE_CAPACITY") {
            if let Ok(parsed) = capacity.parse() {
                self.queue_capacity = parsed;
            }
        }
        if let Ok(flag) = std::env::var("MACHINA_WARN_UNHANDLED") {
            if let Ok(parsed) = flag.parse() {
                self.warn_unhandled = parsed;
            }
        }
    }
}
