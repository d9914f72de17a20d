use serde::{Deserialize, Serialize};
use std::fmt;

/// Error taxonomy carried on ERROR results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    AttributeUnresolved,
    AttributeTypeMismatch,
    /// Connectivity failure or timeout
    ResourceUnavailable,
    /// Malformed query or permission denied
    ResourceQueryError,
    MatcherApplicationError,
    ControlDefinitionError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AttributeUnresolved => "AttributeUnresolved",
            ErrorKind::AttributeTypeMismatch => "AttributeTypeMismatch",
            ErrorKind::ResourceUnavailable => "ResourceUnavailable",
            ErrorKind::ResourceQueryError => "ResourceQueryError",
            ErrorKind::MatcherApplicationError => "MatcherApplicationError",
            ErrorKind::ControlDefinitionError => "ControlDefinitionError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Malformed control definitions
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DefinitionError {
    #[error("Control '{control_id}' has no assertion body and no skip justification")]
    MissingBody { control_id: String },

    #[error("Empty group at '{path}'")]
    EmptyGroup { path: String },

    #[error("Matcher '{matcher}' at '{path}' requires an expected value")]
    MissingExpected { path: String, matcher: String },

    #[error("Unknown binding '{name}' referenced at '{path}'")]
    UnknownBinding { path: String, name: String },

    #[error("for_each at '{path}' has an empty binding name")]
    EmptyBindingName { path: String },

    #[error("Probe at '{path}' has no kind")]
    EmptyProbeKind { path: String },

    #[error("Invalid pattern '{pattern}' at '{path}': {reason}")]
    InvalidPattern {
        path: String,
        pattern: String,
        reason: String,
    },

    #[error("Unknown probe kind '{kind}'")]
    UnknownProbeKind { kind: String },

    #[error("Malformed control definition: {reason}")]
    Malformed { reason: String },
}

impl DefinitionError {
    pub fn error_kind(&self) -> ErrorKind {
        ErrorKind::ControlDefinitionError
    }
}
