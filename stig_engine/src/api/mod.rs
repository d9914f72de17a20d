//! # Public API
//!
//! High-level entry points for running profiles: configuration, the
//! parallel [`ProfileRunner`] and its cancellation handle.

pub mod config;
pub mod errors;
pub mod runner;

pub use config::{ConfigError, RunnerConfig};
pub use errors::RunnerError;
pub use runner::{CancellationToken, ProfileRunner};
