//! # Runner Configuration
//!
//! Defaults come from environment variables, falling back to built-in
//! values when a variable is unset or unparsable. A TOML file may
//! override any subset of fields.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_PROBE_TIMEOUT_SECS: f64 = 30.0;
pub const DEFAULT_ATTRIBUTE_PREFIX: &str = "STIG_ATTR_";
const MAX_DEFAULT_THREADS: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Per-probe timeout in seconds; 0 disables the bound
    pub probe_timeout_secs: f64,

    /// Worker threads evaluating controls
    pub max_threads: usize,

    /// Environment variables `<prefix><NAME>` override attribute `name`
    pub attribute_prefix: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: env::var("STIG_PROBE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PROBE_TIMEOUT_SECS),
            max_threads: env::var("STIG_MAX_THREADS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or_else(|| num_cpus::get().clamp(1, MAX_DEFAULT_THREADS)),
            attribute_prefix: env::var("STIG_ATTRIBUTE_PREFIX")
                .unwrap_or_else(|_| DEFAULT_ATTRIBUTE_PREFIX.to_string()),
        }
    }
}

impl RunnerConfig {
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout_secs = timeout.as_secs_f64();
        self
    }

    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads.max(1);
        self
    }

    pub fn with_attribute_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.attribute_prefix = prefix.into();
        self
    }

    pub fn probe_timeout(&self) -> Option<Duration> {
        if self.probe_timeout_secs > 0.0 {
            Duration::try_from_secs_f64(self.probe_timeout_secs).ok()
        } else {
            None
        }
    }

    /// Load from TOML; missing fields keep their defaults
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config: RunnerConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.probe_timeout_secs.is_finite() || self.probe_timeout_secs < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "probe_timeout_secs".to_string(),
                reason: format!("{} is not a valid timeout", self.probe_timeout_secs),
            });
        }
        if self.max_threads == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_threads".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {reason}")]
    FileRead { path: String, reason: String },

    #[error("Failed to parse config '{path}': {reason}")]
    Parse { path: String, reason: String },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}
