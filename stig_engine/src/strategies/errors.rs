// src/strategies/errors.rs
//! Error types for resource providers and the provider registry

use crate::types::ErrorKind;

/// Failures at the probe boundary
///
/// Connectivity problems are kept distinct from query problems so the
/// report shows whether the target was unreachable or the check itself
/// was wrong. A valid empty result is never an error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProbeError {
    #[error("Resource '{kind}' unavailable: {reason}")]
    Unavailable { kind: String, reason: String },

    #[error("Probe '{kind}' timed out after {timeout_ms}ms")]
    Timeout { kind: String, timeout_ms: u64 },

    #[error("Query against '{kind}' failed: {reason} (query: {query})")]
    QueryFailed {
        kind: String,
        query: String,
        reason: String,
    },

    #[error("Access denied for '{kind}': {reason}")]
    AccessDenied { kind: String, reason: String },

    #[error("Invalid parameters for '{kind}': {reason}")]
    InvalidParameters { kind: String, reason: String },

    #[error("No provider registered for probe kind '{kind}'")]
    UnknownKind { kind: String },
}

impl ProbeError {
    pub fn unavailable(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        ProbeError::Unavailable {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    pub fn query_failed(
        kind: impl Into<String>,
        query: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ProbeError::QueryFailed {
            kind: kind.into(),
            query: query.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_parameters(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        ProbeError::InvalidParameters {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    pub fn error_kind(&self) -> ErrorKind {
        match self {
            ProbeError::Unavailable { .. } | ProbeError::Timeout { .. } => {
                ErrorKind::ResourceUnavailable
            }
            ProbeError::QueryFailed { .. }
            | ProbeError::AccessDenied { .. }
            | ProbeError::InvalidParameters { .. } => ErrorKind::ResourceQueryError,
            ProbeError::UnknownKind { .. } => ErrorKind::ControlDefinitionError,
        }
    }

    /// Connectivity failures are worth retrying; query failures are not
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProbeError::Unavailable { .. } | ProbeError::Timeout { .. }
        )
    }
}

/// Registry management errors
#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    #[error("Probe kind '{kind}' already registered")]
    DuplicateKind { kind: String },

    #[error("Unknown probe kind: {kind}")]
    UnknownKind { kind: String },
}

impl From<StrategyError> for ProbeError {
    fn from(error: StrategyError) -> Self {
        match error {
            StrategyError::DuplicateKind { kind } | StrategyError::UnknownKind { kind } => {
                ProbeError::UnknownKind { kind }
            }
        }
    }
}
