//! # STIG Scanner
//!
//! Concrete resource providers for SQL Server 2014 hosts and the registry
//! factories used by the `stig-scan` binary.

pub mod commands;
pub mod providers;

use providers::{
    CommandProvider, FixtureError, FixtureProvider, FixtureSet, RegistryKeyProvider,
    ServiceProvider, SqlCmdProvider, PROBE_KINDS,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use stig_engine::strategies::{ProviderRegistry, RegistryBuilder, StrategyError};

#[derive(Debug, thiserror::Error)]
pub enum ScannerError {
    #[error("Provider registration failed: {0}")]
    Registry(#[from] StrategyError),

    #[error(transparent)]
    Fixtures(#[from] FixtureError),
}

/// Create a registry with the live providers
///
/// All providers share one allowlisted executor; `command_timeout` bounds
/// each spawned process independently of the runner's probe timeout.
pub fn create_provider_registry(command_timeout: Duration) -> Result<ProviderRegistry, ScannerError> {
    let executor = commands::create_mssql_command_executor(command_timeout);

    let registry = RegistryBuilder::new()
        .with_provider(SqlCmdProvider::new(executor.clone()))
        .with_provider(RegistryKeyProvider::new(executor.clone()))
        .with_provider(ServiceProvider::new(executor.clone()))
        .with_provider(CommandProvider::new(executor))
        .build()?;
    Ok(registry)
}

/// Create a registry answering every probe from recorded fixtures
pub fn create_fixture_registry(path: &Path) -> Result<ProviderRegistry, ScannerError> {
    let fixtures = Arc::new(FixtureSet::load(path)?);

    let mut kinds: Vec<String> = PROBE_KINDS.iter().map(|kind| kind.to_string()).collect();
    kinds.extend(fixtures.kinds());
    kinds.sort();
    kinds.dedup();

    let mut builder = RegistryBuilder::new();
    for kind in kinds {
        builder = builder.with_provider(FixtureProvider::new(kind, Arc::clone(&fixtures)));
    }
    log::info!(
        "Replaying {} recorded probes from {}",
        fixtures.len(),
        path.display()
    );
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;
    use std::path::PathBuf;
    use stig_engine::prelude::*;

    #[test]
    fn test_registry_creation() {
        let registry = create_provider_registry(Duration::from_secs(5)).unwrap();
        let stats = registry.get_statistics();

        assert_eq!(stats.total_kinds, 4);
        for kind in PROBE_KINDS {
            assert!(registry.has_kind(kind), "missing provider for {}", kind);
        }
    }

    #[test]
    fn test_fixture_registry_adds_recorded_kinds() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"probes": [{{"kind": "file-content", "query": "/etc/hosts", "value": ""}}]}}"#
        )
        .unwrap();

        let registry = create_fixture_registry(file.path()).unwrap();
        assert!(registry.has_kind("database-query"));
        assert!(registry.has_kind("file-content"));
        assert_eq!(registry.list_kinds().len(), 5);
    }

    fn bundled_profile() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../profiles/mssql2014")
    }

    fn run_bundled(overrides: AttributeOverrides) -> Report {
        let profile_path = bundled_profile();
        let registry = create_fixture_registry(&profile_path.join("fixtures")).unwrap();
        let profile = load_profile(&profile_path).unwrap();
        ProfileRunner::new(Arc::new(registry))
            .with_config(RunnerConfig::default().with_max_threads(3))
            .run_profile(&profile, &overrides)
    }

    fn status(report: &Report, id: &str) -> ControlStatus {
        report.result(id).map(ControlResult::status).unwrap()
    }

    #[test]
    fn test_bundled_profile_against_recorded_host() {
        let report = run_bundled(AttributeOverrides::new());

        let ids: Vec<&str> = report.results.iter().map(ControlResult::control_id).collect();
        assert_eq!(
            ids,
            vec![
                "V-67769", "V-67825", "V-67833", "V-67863", "V-67873", "V-67875", "V-67897",
                "V-67901", "V-67913", "V-67931", "V-67935"
            ]
        );

        assert_eq!(status(&report, "V-67769"), ControlStatus::Passed);
        assert_eq!(status(&report, "V-67825"), ControlStatus::Passed);
        assert_eq!(status(&report, "V-67833"), ControlStatus::Failed);
        assert_eq!(status(&report, "V-67863"), ControlStatus::Failed);
        assert_eq!(status(&report, "V-67897"), ControlStatus::Passed);
        assert_eq!(status(&report, "V-67901"), ControlStatus::Passed);
        assert_eq!(status(&report, "V-67931"), ControlStatus::Passed);
        for manual in ["V-67873", "V-67875", "V-67913"] {
            assert_eq!(status(&report, manual), ControlStatus::Skipped);
        }

        let denied = report.result("V-67935").unwrap();
        assert_eq!(denied.status(), ControlStatus::Error);
        assert_eq!(denied.error_kind(), Some(ErrorKind::ResourceQueryError));

        assert_eq!(report.summary.by_status.passed, 5);
        assert_eq!(report.summary.by_status.failed, 2);
        assert!(!report.summary.is_clean());
    }

    #[test]
    fn test_unauthorized_principals_are_named() {
        let report = run_bundled(AttributeOverrides::new());
        let result = report.result("V-67863").unwrap();
        assert_eq!(result.severity(), Severity::High);

        let failing: Vec<&str> = result
            .details()
            .iter()
            .filter(|detail| detail.verdict == Verdict::Failed)
            .map(|detail| detail.description.as_str())
            .collect();
        assert_eq!(failing, vec!["sa", "app_shared"]);
        assert!(result
            .details()
            .iter()
            .any(|detail| detail.path == "all > Enabled server principals [sa] > sa"));
    }

    #[test]
    fn test_component_in_use_passes_without_service_state() {
        let mut overrides = AttributeOverrides::new();
        overrides.insert(
            "sql_server_distributed_replay_controller_used".to_string(),
            ProbeValue::Boolean(true),
        );
        overrides.insert("server_audit_implemented".to_string(), ProbeValue::Boolean(false));

        let report = run_bundled(overrides);
        assert_eq!(status(&report, "V-67833"), ControlStatus::Passed);
        // audit branch excluded, so the denied audit query never runs
        assert_eq!(status(&report, "V-67935"), ControlStatus::Passed);
    }

    #[test]
    fn test_fixture_registry_missing_file() {
        assert_matches!(
            create_fixture_registry(Path::new("/nonexistent/fixtures.json")).err(),
            Some(ScannerError::Fixtures(FixtureError::Read { .. }))
        );
    }
}
