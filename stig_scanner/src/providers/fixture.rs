//! Recorded probe results
//!
//! A fixture file holds previously captured probe answers:
//!
//! ```json
//! { "probes": [
//!     { "kind": "database-query", "query": "SELECT ...",
//!       "value": { "columns": ["name"], "rows": [["sa"]] } },
//!     { "kind": "os-service", "query": "SQLBrowser",
//!       "error": { "kind": "unavailable", "reason": "host unreachable" } }
//! ] }
//! ```
//!
//! An entry with `parameters` matches only that exact connection; without
//! them it matches any connection for the same kind and query. Queries are
//! compared with whitespace collapsed. A request with no recorded answer
//! fails as unavailable.

use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use stig_engine::strategies::{
    handle_as, ProbeError, ProbeParameters, ProviderHandle, ResourceProvider,
};
use stig_engine::types::ProbeValue;

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("Failed to read fixtures '{path}': {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse fixtures '{path}': {reason}")]
    Parse { path: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordedErrorKind {
    Unavailable,
    Timeout,
    QueryFailed,
    AccessDenied,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordedError {
    pub kind: RecordedErrorKind,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FixtureEntry {
    pub kind: String,
    #[serde(default)]
    pub parameters: Option<ProbeParameters>,
    pub query: String,
    #[serde(default)]
    pub value: ProbeValue,
    #[serde(default)]
    pub error: Option<RecordedError>,
}

impl FixtureEntry {
    fn answer(&self) -> Result<ProbeValue, ProbeError> {
        let error = match &self.error {
            Some(error) => error,
            None => return Ok(self.value.clone()),
        };
        let reason = error.reason.clone();
        Err(match error.kind {
            RecordedErrorKind::Unavailable => ProbeError::unavailable(&self.kind, reason),
            RecordedErrorKind::Timeout => ProbeError::Timeout {
                kind: self.kind.clone(),
                timeout_ms: 0,
            },
            RecordedErrorKind::QueryFailed => ProbeError::query_failed(&self.kind, &self.query, reason),
            RecordedErrorKind::AccessDenied => ProbeError::AccessDenied {
                kind: self.kind.clone(),
                reason,
            },
        })
    }
}

#[derive(Debug, Deserialize)]
struct FixtureFile {
    #[serde(default)]
    probes: Vec<FixtureEntry>,
}

/// All recorded answers, shared by the per-kind providers
#[derive(Debug, Clone, Default)]
pub struct FixtureSet {
    entries: Vec<FixtureEntry>,
}

impl FixtureSet {
    pub fn new(entries: Vec<FixtureEntry>) -> Self {
        Self { entries }
    }

    /// Load one fixture file, or every `.json` file of a directory in name order
    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let read_error = |e: std::io::Error| FixtureError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        };

        let files = if path.is_dir() {
            let mut files: Vec<_> = std::fs::read_dir(path)
                .map_err(read_error)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
                .collect();
            files.sort();
            files
        } else {
            vec![path.to_path_buf()]
        };

        let mut entries = Vec::new();
        for file in files {
            let content = std::fs::read_to_string(&file).map_err(|e| FixtureError::Read {
                path: file.display().to_string(),
                reason: e.to_string(),
            })?;
            let parsed: FixtureFile =
                serde_json::from_str(&content).map_err(|e| FixtureError::Parse {
                    path: file.display().to_string(),
                    reason: e.to_string(),
                })?;
            entries.extend(parsed.probes);
        }

        log::debug!("Loaded {} recorded probes from {}", entries.len(), path.display());
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct probe kinds with at least one entry
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.entries.iter().map(|e| e.kind.clone()).collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }

    pub fn lookup(&self, kind: &str, parameters: &ProbeParameters, query: &str) -> Option<&FixtureEntry> {
        let query = normalize_query(query);
        let query = query.as_str();
        let candidates = || {
            self.entries
                .iter()
                .filter(move |e| e.kind == kind && normalize_query(&e.query) == query)
        };
        candidates()
            .find(|e| e.parameters.as_ref() == Some(parameters))
            .or_else(|| candidates().find(|e| e.parameters.is_none()))
    }
}

fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Answers one probe kind from a [`FixtureSet`]
pub struct FixtureProvider {
    kind: String,
    fixtures: Arc<FixtureSet>,
}

impl FixtureProvider {
    pub fn new(kind: impl Into<String>, fixtures: Arc<FixtureSet>) -> Self {
        Self {
            kind: kind.into(),
            fixtures,
        }
    }
}

impl ResourceProvider for FixtureProvider {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn connect(&self, parameters: &ProbeParameters) -> Result<ProviderHandle, ProbeError> {
        Ok(Arc::new(parameters.clone()))
    }

    fn fetch(&self, handle: &ProviderHandle, query: &str) -> Result<ProbeValue, ProbeError> {
        let parameters = handle_as::<ProbeParameters>(handle, &self.kind)?;
        match self.fixtures.lookup(&self.kind, &parameters, query) {
            Some(entry) => entry.answer(),
            None => Err(ProbeError::unavailable(
                &self.kind,
                format!("no recorded value for query '{}'", normalize_query(query)),
            )),
        }
    }

    fn describe(&self) -> String {
        format!("recorded {} results", self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    const FIXTURES: &str = r#"{
        "probes": [
            { "kind": "database-query", "query": "SELECT name  FROM sys.databases",
              "value": { "columns": ["name"], "rows": [["master"], ["model"]] } },
            { "kind": "database-query", "parameters": { "host": "db02" },
              "query": "SELECT name FROM sys.databases",
              "value": { "columns": ["name"], "rows": [] } },
            { "kind": "os-service", "query": "SQLBrowser",
              "error": { "kind": "access_denied", "reason": "not an administrator" } }
        ]
    }"#;

    fn fixtures() -> Arc<FixtureSet> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", FIXTURES).unwrap();
        Arc::new(FixtureSet::load(file.path()).unwrap())
    }

    fn fetch(kind: &str, parameters: ProbeParameters, query: &str) -> Result<ProbeValue, ProbeError> {
        let provider = FixtureProvider::new(kind, fixtures());
        let handle = provider.connect(&parameters).unwrap();
        provider.fetch(&handle, query)
    }

    #[test]
    fn test_wildcard_entry_matches_any_connection() {
        let mut parameters = ProbeParameters::new();
        parameters.insert("host".to_string(), ProbeValue::from("db01"));

        let value = fetch("database-query", parameters, "SELECT name FROM\n  sys.databases").unwrap();
        assert_matches!(value, ProbeValue::Table(table) if table.len() == 2);
    }

    #[test]
    fn test_exact_parameters_win() {
        let mut parameters = ProbeParameters::new();
        parameters.insert("host".to_string(), ProbeValue::from("db02"));

        let value = fetch("database-query", parameters, "SELECT name FROM sys.databases").unwrap();
        assert_matches!(value, ProbeValue::Table(table) if table.is_empty());
    }

    #[test]
    fn test_recorded_error() {
        assert_matches!(
            fetch("os-service", ProbeParameters::new(), "SQLBrowser"),
            Err(ProbeError::AccessDenied { .. })
        );
    }

    #[test]
    fn test_missing_entry_is_unavailable() {
        assert_matches!(
            fetch("os-service", ProbeParameters::new(), "MSSQLSERVER"),
            Err(ProbeError::Unavailable { .. })
        );
    }

    #[test]
    fn test_load_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), FIXTURES).unwrap();
        std::fs::write(dir.path().join("b.json"), r#"{"probes": []}"#).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let set = FixtureSet::load(dir.path()).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.kinds(), vec!["database-query", "os-service"]);
    }

    #[test]
    fn test_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert_matches!(FixtureSet::load(file.path()), Err(FixtureError::Parse { .. }));
    }
}
