//! Player configuration with persistence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("Failed to read config: {0}")]
  Io(#[from] std::io::Error),
  #[error("Invalid config JSON: {0}")]
  Json(#[from] serde_json::Error),
  #[error("Invalid config: {0}")]
  Invalid(String),
}

/// Player configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerConfig {
  /// Custom mpg123 executable path (None = auto-detect).
  #[serde(default)]
  pub mpg123_path: Option<String>,

  /// Additional mpg123 command-line arguments, passed after `-R`.
  #[serde(default)]
  pub extra_args: Vec<String>,

  /// How long `quit` waits for mpg123 to exit before killing it.
  #[serde(default = "default_shutdown_timeout_ms")]
  pub shutdown_timeout_ms: u64,

  /// Number of player events buffered for subscribers.
  #[serde(default = "default_event_capacity")]
  pub event_capacity: usize,
}

fn default_shutdown_timeout_ms() -> u64 {
  2000
}

fn default_event_capacity() -> usize {
  64
}

impl Default for PlayerConfig {
  fn default() -> Self {
    Self {
      mpg123_path: None,
      extra_args: Vec::new(),
      shutdown_timeout_ms: default_shutdown_timeout_ms(),
      event_capacity: default_event_capacity(),
    }
  }
}

impl PlayerConfig {
  /// Default config file location, `<config dir>/mpg123-remote/config.json`.
  pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("mpg123-remote").join("config.json"))
  }

  /// Load and validate a config file. A missing file yields the defaults.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let config = match std::fs::read_to_string(path) {
      Ok(text) => serde_json::from_str::<Self>(&text)?,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        log::debug!("No config at {}, using defaults", path.display());
        Self::default()
      }
      Err(e) => return Err(e.into()),
    };
    config.validate().map_err(ConfigError::Invalid)?;
    Ok(config)
  }

  /// Validate configuration values.
  pub fn validate(&self) -> Result<(), String> {
    if let Some(path) = &self.mpg123_path {
      if path.trim().is_empty() {
        return Err("mpg123 path cannot be empty".to_string());
      }
    }
    if !(100..=60_000).contains(&self.shutdown_timeout_ms) {
      return Err("Shutdown timeout must be between 100 and 60000 ms".to_string());
    }
    if self.event_capacity == 0 {
      return Err("Event capacity must be at least 1".to_string());
    }
    Ok(())
  }

  pub fn shutdown_timeout(&self) -> Duration {
    Duration::from_millis(self.shutdown_timeout_ms)
  }
}
