// src/strategies/traits.rs
//! Resource provider contract
//!
//! Each probe kind (`database-query`, `os-registry-key`, `os-service`,
//! `shell-command`, ...) is served by one provider. The runner connects
//! lazily, fetches any number of queries through the handle and releases
//! the handle when the control finishes.

use crate::strategies::errors::ProbeError;
use crate::types::ProbeValue;
use serde::Serialize;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Resolved connection parameters for one probe
pub type ProbeParameters = BTreeMap<String, ProbeValue>;

/// Opaque provider connection state
pub type ProviderHandle = Arc<dyn Any + Send + Sync>;

// ============================================================================
// Provider Trait
// ============================================================================

/// Adapter exposing one kind of external probe
///
/// Reads must be idempotent: calling `fetch` twice with the same query on
/// an unchanged target yields the same value.
pub trait ResourceProvider: Send + Sync {
    /// Probe kind served by this provider
    fn kind(&self) -> &str;

    /// Open (or describe) a connection for the given parameters
    fn connect(&self, parameters: &ProbeParameters) -> Result<ProviderHandle, ProbeError>;

    /// Run one read-only query through an open handle
    fn fetch(&self, handle: &ProviderHandle, query: &str) -> Result<ProbeValue, ProbeError>;

    /// Release a handle; called on every exit path of a control
    fn release(&self, _handle: ProviderHandle) {}

    /// Short human-readable description for listings
    fn describe(&self) -> String {
        self.kind().to_string()
    }
}

/// Downcast a handle to the provider's concrete connection type
pub fn handle_as<T: Any + Send + Sync>(
    handle: &ProviderHandle,
    kind: &str,
) -> Result<Arc<T>, ProbeError> {
    Arc::clone(handle)
        .downcast::<T>()
        .map_err(|_| ProbeError::invalid_parameters(kind, "handle belongs to another provider"))
}

// ============================================================================
// Probe Request
// ============================================================================

/// A fully resolved `(kind, parameters, query)` triple
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeRequest {
    pub kind: String,
    pub parameters: ProbeParameters,
    pub query: String,
}

impl ProbeRequest {
    pub fn new(kind: impl Into<String>, parameters: ProbeParameters, query: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            parameters,
            query: query.into(),
        }
    }

    /// Stable identity used for memoization and fixture lookup
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!("{}|{:?}|{}", self.kind, self.parameters, self.query)
        })
    }

    /// Identity of the connection this request needs
    pub fn connection_key(&self) -> String {
        let parameters = serde_json::to_string(&self.parameters)
            .unwrap_or_else(|_| format!("{:?}", self.parameters));
        format!("{}|{}", self.kind, parameters)
    }
}

/// Read a string parameter, accepting numbers as text
pub fn string_parameter(parameters: &ProbeParameters, key: &str) -> Option<String> {
    match parameters.get(key)? {
        ProbeValue::Null => None,
        ProbeValue::String(s) if s.is_empty() => None,
        value => Some(value.to_text()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_parameter_order_independent() {
        let mut a = ProbeParameters::new();
        a.insert("host".to_string(), ProbeValue::from("db01"));
        a.insert("port".to_string(), ProbeValue::Integer(1433));

        let mut b = ProbeParameters::new();
        b.insert("port".to_string(), ProbeValue::Integer(1433));
        b.insert("host".to_string(), ProbeValue::from("db01"));

        let left = ProbeRequest::new("database-query", a, "SELECT 1");
        let right = ProbeRequest::new("database-query", b, "SELECT 1");
        assert_eq!(left.fingerprint(), right.fingerprint());
        assert_eq!(left.connection_key(), right.connection_key());

        let other = ProbeRequest::new("database-query", ProbeParameters::new(), "SELECT 2");
        assert_ne!(left.fingerprint(), other.fingerprint());
    }

    #[test]
    fn test_handle_downcast() {
        let handle: ProviderHandle = Arc::new(String::from("conn"));
        assert_eq!(*handle_as::<String>(&handle, "x").unwrap(), "conn");
        assert!(handle_as::<u32>(&handle, "x").is_err());
    }

    #[test]
    fn test_string_parameter() {
        let mut parameters = ProbeParameters::new();
        parameters.insert("port".to_string(), ProbeValue::Integer(1433));
        parameters.insert("user".to_string(), ProbeValue::from(""));
        assert_eq!(string_parameter(&parameters, "port"), Some("1433".to_string()));
        assert_eq!(string_parameter(&parameters, "user"), None);
        assert_eq!(string_parameter(&parameters, "host"), None);
    }
}
