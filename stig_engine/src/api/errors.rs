//! # Runner Errors
//!
//! Failures that stop a run before any control executes. Once controls
//! start, every failure is captured in a control result instead.

use super::config::ConfigError;
use crate::attributes::AttributeError;
use crate::profile::ProfileError;

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    #[error("Attribute override error: {0}")]
    Overrides(#[from] AttributeError),
}

impl RunnerError {
    pub fn user_message(&self) -> String {
        match self {
            RunnerError::Config(e) => format!("Invalid runner configuration: {}", e),
            RunnerError::Profile(e) => format!("Could not load profile: {}", e),
            RunnerError::Overrides(e) => format!("Could not read attribute overrides: {}", e),
        }
    }
}
