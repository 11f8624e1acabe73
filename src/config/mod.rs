//! Capture configuration.
//!
//! Values come from a TOML file (or string), then `LIVECAP_*` environment
//! variables, and are validated before use.
//!
//! ```toml
//! read_buffer_size = 65536
//! default_timeout = "30s"
//! poll_interval = "250ms"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::reader::DEFAULT_READ_BUFFER_SIZE;


pub const ENV_READ_BUFFER_SIZE: &str = "LIVECAP_READ_BUFFER_SIZE";
pub const ENV_DEFAULT_TIMEOUT: &str = "LIVECAP_DEFAULT_TIMEOUT";
pub const ENV_POLL_INTERVAL: &str = "LIVECAP_POLL_INTERVAL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptureConfig {
    /// Capacity of each stream reader's buffer, in bytes
    pub read_buffer_size: usize,
    /// Applied to commands that don't carry their own timeout
    #[serde(with = "humantime_serde")]
    pub default_timeout: Option<Duration>,
    /// How often the CLI polls for new lines
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            default_timeout: None,
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl CaptureConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: CaptureConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("Loaded capture config from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Apply `LIVECAP_*` overrides from the process environment
    pub fn merge_env_vars(&mut self) -> Result<(), ConfigError> {
        self.merge_vars(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup. Split out so tests need not touch
    /// the real environment.
    pub fn merge_vars<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_READ_BUFFER_SIZE) {
            self.read_buffer_size =
                value
                    .trim()
                    .parse::<usize>()
                    .map_err(|e| ConfigError::InvalidValue {
                        key: ENV_READ_BUFFER_SIZE.to_string(),
                        message: e.to_string(),
                    })?;
        }

        if let Some(value) = lookup(ENV_DEFAULT_TIMEOUT) {
            self.default_timeout = if value.trim().is_empty() {
                None
            } else {
                Some(parse_duration_value(ENV_DEFAULT_TIMEOUT, &value)?)
            };
        }

        if let Some(value) = lookup(ENV_POLL_INTERVAL) {
            self.poll_interval = parse_duration_value(ENV_POLL_INTERVAL, &value)?;
        }

        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_buffer_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "read_buffer_size".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "poll_interval".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.default_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::InvalidValue {
                key: "default_timeout".to_string(),
                message: "must be greater than zero when set".to_string(),
            });
        }
        Ok(())
    }
}

/// Parse a human-readable duration such as `"250ms"` or `"1m 30s"`
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value.trim()).map_err(|e| e.to_string())
}

fn parse_duration_value(key: &str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).map_err(|message| ConfigError::InvalidValue {
        key: key.to_string(),
        message,
    })
}
