//! Daemon configuration.
//!
//! Settings are read from a JSON file (`~/.meditimer/config.json` unless
//! overridden). Every field has a default, so a missing file or a partial
//! file is fine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::TimerConfig;

/// Directory under `$HOME` holding the socket, state and config files.
pub const APP_DIR: &str = ".meditimer";

fn app_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Default socket path.
pub fn default_socket_path() -> PathBuf {
    app_dir().join("meditimer.sock")
}

/// Default state file path.
pub fn default_state_path() -> PathBuf {
    app_dir().join("state.json")
}

/// Default config file path.
pub fn default_config_path() -> PathBuf {
    app_dir().join("config.json")
}

/// Errors raised while loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config {path:?}: {source}")]
    Read {
        /// Config file path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The file is not valid JSON for this schema.
    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        /// Config file path
        path: PathBuf,
        /// Underlying error
        source: serde_json::Error,
    },

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Configuration of the daemon process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Unix socket the daemon listens on
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// File the timer snapshot is persisted to
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// Engine settings
    #[serde(default)]
    pub timer: TimerConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            state_path: default_state_path(),
            timer: TimerConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Loads the configuration from `path`, or defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Loads from `path` if given, otherwise from the default location.
    ///
    /// # Errors
    ///
    /// See [`DaemonConfig::load`].
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Self::load(&default_config_path()),
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.socket_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("socket_path is empty".to_string()));
        }
        if self.state_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("state_path is empty".to_string()));
        }
        self.timer.validate().map_err(ConfigError::Invalid)
    }

    /// Returns the configuration with a different socket path.
    #[must_use]
    pub fn with_socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = path.into();
        self
    }

    /// Returns the configuration with a different state file.
    #[must_use]
    pub fn with_state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = path.into();
        self
    }
}
