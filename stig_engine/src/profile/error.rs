use crate::attributes::AttributeError;

/// Profile discovery and loading errors
///
/// A control file that fails to parse is not an error here; it loads as a
/// defective control that reports ERROR when run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProfileError {
    #[error("Profile path not found: {path}")]
    NotFound { path: String },

    #[error("Failed to read '{path}': {reason}")]
    Io { path: String, reason: String },

    #[error("Invalid profile metadata in '{path}': {reason}")]
    Metadata { path: String, reason: String },

    #[error("Control '{id}' is defined more than once")]
    DuplicateControl { id: String },

    #[error("Control '{control_id}' declares a conflicting attribute: {source}")]
    ConflictingAttribute {
        control_id: String,
        #[source]
        source: AttributeError,
    },

    #[error("Profile attribute values: {0}")]
    AttributeValues(#[source] AttributeError),

    #[error("No controls found under '{path}'")]
    Empty { path: String },
}
