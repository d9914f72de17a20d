// src/attributes/error.rs
//! Attribute resolution errors

use crate::types::{ErrorKind, ValueType};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AttributeError {
    #[error("Attribute '{name}' has no override, environment, profile or default value")]
    Unresolved { name: String },

    #[error("Attribute '{name}' from {source_name} has type {found}, default is {expected}")]
    TypeMismatch {
        name: String,
        expected: ValueType,
        found: ValueType,
        source_name: String,
    },

    #[error("Attribute '{name}' declared twice with different defaults")]
    ConflictingDeclaration { name: String },

    #[error("Cannot read attribute file '{path}': {reason}")]
    FileRead { path: String, reason: String },

    #[error("Cannot parse attribute file '{path}': {reason}")]
    FileParse { path: String, reason: String },
}

impl AttributeError {
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            AttributeError::TypeMismatch { .. } => ErrorKind::AttributeTypeMismatch,
            AttributeError::ConflictingDeclaration { .. }
            | AttributeError::FileRead { .. }
            | AttributeError::FileParse { .. } => ErrorKind::ControlDefinitionError,
            AttributeError::Unresolved { .. } => ErrorKind::AttributeUnresolved,
        }
    }
}
