//! # Profile Runner
//!
//! Runs every control of a profile on a bounded worker pool:
//!
//! - attributes are resolved once, before any control starts, and shared
//!   read-only by all workers
//! - workers claim controls in declared order; results are reported in
//!   that order regardless of completion order
//! - cancellation stops workers from claiming further controls; in-flight
//!   controls finish and unclaimed ones are listed as abandoned

use super::config::RunnerConfig;
use super::errors::RunnerError;
use crate::attributes::{read_values_file, AttributeOverrides, AttributeStore, ResolvedAttributes};
use crate::execution::ControlRunner;
use crate::profile::{load_profile, Profile};
use crate::results::{ControlResult, HostContext, Report, Reporter};
use crate::strategies::ProviderRegistry;
use crate::types::Control;
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Cooperative cancellation flag shared with the caller
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Cancel from a background thread once `deadline` elapses
    pub fn cancel_after(&self, deadline: Duration) -> thread::JoinHandle<()> {
        let token = self.clone();
        thread::spawn(move || {
            thread::sleep(deadline);
            if !token.is_cancelled() {
                warn!("Run deadline of {:?} reached, cancelling", deadline);
                token.cancel();
            }
        })
    }
}

pub struct ProfileRunner {
    registry: Arc<ProviderRegistry>,
    config: RunnerConfig,
    cancellation: CancellationToken,
    host: Option<HostContext>,
    environment: Option<Vec<(String, String)>>,
}

impl ProfileRunner {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            config: RunnerConfig::default(),
            cancellation: CancellationToken::new(),
            host: None,
            environment: None,
        }
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_host(mut self, host: HostContext) -> Self {
        self.host = Some(host);
        self
    }

    /// Read attribute variables from this list instead of the process environment
    pub fn with_environment(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.environment = Some(vars.into_iter().collect());
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Load a profile, read an optional override file and run everything
    pub fn run_path(
        &self,
        profile_path: &Path,
        overrides_file: Option<&Path>,
    ) -> Result<Report, RunnerError> {
        self.config.validate()?;
        let profile = load_profile(profile_path)?;
        let overrides = match overrides_file {
            Some(path) => read_values_file(path)?,
            None => AttributeOverrides::new(),
        };
        Ok(self.run_profile(&profile, &overrides))
    }

    pub fn run_profile(&self, profile: &Profile, overrides: &AttributeOverrides) -> Report {
        let attributes =
            self.resolve_attributes(profile.attribute_store(), profile.controls(), overrides);
        self.run_controls(profile.name(), profile.controls(), Arc::new(attributes))
    }

    /// Resolve every declared or referenced attribute once for the run
    pub fn resolve_attributes(
        &self,
        store: &AttributeStore,
        controls: &[Control],
        overrides: &AttributeOverrides,
    ) -> ResolvedAttributes {
        let prefix = &self.config.attribute_prefix;
        let store = match &self.environment {
            Some(vars) => store.clone().capture_environment_from(prefix, vars.iter().cloned()),
            None => store.clone().capture_environment(prefix),
        };
        let referenced: BTreeSet<String> = controls
            .iter()
            .flat_map(Control::referenced_attributes)
            .collect();
        let resolved = store.resolve_all(&referenced, overrides);
        debug!("Resolved {} attributes", resolved.len());
        resolved
    }

    pub fn run_controls(
        &self,
        profile_name: &str,
        controls: &[Control],
        attributes: Arc<ResolvedAttributes>,
    ) -> Report {
        let runner = ControlRunner::new(Arc::clone(&self.registry), attributes)
            .with_probe_timeout(self.config.probe_timeout());
        let mut reporter = Reporter::new(profile_name);
        if let Some(host) = &self.host {
            reporter = reporter.with_host(host.clone());
        }

        info!(
            "Running {} controls from '{}' on up to {} threads",
            controls.len(),
            profile_name,
            self.config.max_threads
        );

        let outcomes = self.execute(&runner, controls);
        let mut abandoned = Vec::new();
        for (control, outcome) in controls.iter().zip(outcomes) {
            match outcome {
                Some(result) => reporter.record(result),
                None => abandoned.push(control.id.clone()),
            }
        }

        if !abandoned.is_empty() {
            warn!(
                "Run cancelled: {} control(s) abandoned before starting",
                abandoned.len()
            );
            reporter.mark_abandoned(abandoned);
        }
        reporter.finish()
    }

    /// Evaluate controls on the worker pool; `None` marks unclaimed controls
    fn execute(&self, runner: &ControlRunner, controls: &[Control]) -> Vec<Option<ControlResult>> {
        let threads = self.config.max_threads.clamp(1, controls.len().max(1));
        let next = AtomicUsize::new(0);
        let slots: Mutex<Vec<Option<ControlResult>>> = Mutex::new(vec![None; controls.len()]);

        thread::scope(|scope| {
            for worker in 0..threads {
                let next = &next;
                let slots = &slots;
                let cancellation = &self.cancellation;
                scope.spawn(move || loop {
                    if cancellation.is_cancelled() {
                        debug!("Worker {} stopping: run cancelled", worker);
                        break;
                    }
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(control) = controls.get(index) else {
                        break;
                    };
                    let result = runner.run(control);
                    let mut guard = slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    guard[index] = Some(result);
                });
            }
        });

        slots
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attribute;
    use crate::profile::ProfileMetadata;
    use crate::results::ControlStatus;
    use crate::strategies::{
        ProbeError, ProbeParameters, ProviderHandle, RegistryBuilder, ResourceProvider,
    };
    use crate::types::{ErrorKind, ProbeValue, Table};
    use std::collections::HashMap;
    use std::path::PathBuf;

    /// Canned query answers with optional latency
    struct CannedDatabase {
        answers: HashMap<String, ProbeValue>,
        delay: Duration,
        calls: Arc<AtomicUsize>,
        cancel_on_fetch: Option<CancellationToken>,
        panic_on_fetch: bool,
    }

    impl CannedDatabase {
        fn new(answers: &[(&str, ProbeValue)]) -> Self {
            Self {
                answers: answers
                    .iter()
                    .map(|(query, value)| (query.to_string(), value.clone()))
                    .collect(),
                delay: Duration::ZERO,
                calls: Arc::new(AtomicUsize::new(0)),
                cancel_on_fetch: None,
                panic_on_fetch: false,
            }
        }
    }

    impl ResourceProvider for CannedDatabase {
        fn kind(&self) -> &str {
            "database-query"
        }

        fn connect(&self, _parameters: &ProbeParameters) -> Result<ProviderHandle, ProbeError> {
            Ok(Arc::new(()))
        }

        fn fetch(&self, _handle: &ProviderHandle, query: &str) -> Result<ProbeValue, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(token) = &self.cancel_on_fetch {
                token.cancel();
            }
            thread::sleep(self.delay);
            if self.panic_on_fetch {
                panic!("driver crashed");
            }
            self.answers
                .get(query)
                .cloned()
                .ok_or_else(|| ProbeError::query_failed("database-query", query, "invalid object name"))
        }
    }

    fn control(json: &str) -> Control {
        serde_json::from_str(json).unwrap()
    }

    fn profile(controls: Vec<Control>) -> Profile {
        Profile::from_controls(
            ProfileMetadata {
                name: "mssql2014".to_string(),
                ..ProfileMetadata::default()
            },
            PathBuf::from("mssql2014"),
            controls,
        )
        .unwrap()
    }

    fn runner(database: CannedDatabase, threads: usize) -> ProfileRunner {
        let registry = RegistryBuilder::new().with_provider(database).build().unwrap();
        ProfileRunner::new(Arc::new(registry)).with_config(
            RunnerConfig::default()
                .with_max_threads(threads)
                .with_probe_timeout(Duration::from_secs(5))
                .with_attribute_prefix("STIG_RUNNER_TEST_UNSET_"),
        )
        .with_environment(Vec::new())
    }

    /// Trace-or-audit check: passes when either mechanism is in place
    const AUDIT_OR_TRACE: &str = r#"{
        "id": "V-67769",
        "impact": 0.5,
        "attributes": [
            {"name": "server_audit_implemented", "default": false},
            {"name": "server_trace_implemented", "default": false}
        ],
        "body": {
            "combinator": "one_of",
            "children": [
                {"when": {
                    "guard": {
                        "subject": {"attribute": {"name": "server_trace_implemented"}},
                        "matcher": {"kind": "equals"},
                        "expected": true
                    },
                    "then": {"assertion": {
                        "description": "Trace defined",
                        "subject": {"probe": {"kind": "database-query", "query": "SELECT id FROM sys.traces"}},
                        "matcher": {"kind": "not", "matcher": {"kind": "empty"}}
                    }}
                }},
                {"when": {
                    "guard": {
                        "subject": {"attribute": {"name": "server_audit_implemented"}},
                        "matcher": {"kind": "equals"},
                        "expected": true
                    },
                    "then": {"assertion": {
                        "description": "Audit defined",
                        "subject": {"probe": {"kind": "database-query", "query": "SELECT name FROM sys.server_audits"}},
                        "matcher": {"kind": "not", "matcher": {"kind": "empty"}}
                    }}
                }}
            ]
        }
    }"#;

    const SLOW_QUERY: &str = r#"{
        "id": "V-67825",
        "body": {"combinator": "all", "children": [
            {"assertion": {
                "subject": {"probe": {"kind": "database-query", "query": "SELECT slow"}},
                "matcher": {"kind": "empty"}
            }}
        ]}
    }"#;

    const MANUAL: &str = r#"{
        "id": "V-67873",
        "skip": "Manual review of audit key protection",
        "attributes": [{"name": "user"}]
    }"#;

    fn membership(id: &str, query: &str) -> Control {
        control(&format!(
            r#"{{
                "id": "{}",
                "attributes": [
                    {{"name": "authorized_roles", "default": ["public", "sysadmin"]}}
                ],
                "body": {{"combinator": "all", "children": [
                    {{"assertion": {{
                        "subject": {{"probe": {{"kind": "database-query", "query": "{}", "select": [{{"field": "name"}}]}}}},
                        "matcher": {{"kind": "in"}},
                        "expected": {{"attribute": "authorized_roles"}}
                    }}}}
                ]}}
            }}"#,
            id, query
        ))
    }

    fn traces() -> ProbeValue {
        ProbeValue::Table(Table::new(["id"]).with_row(vec![ProbeValue::Integer(1)]))
    }

    #[test]
    fn test_trace_satisfies_one_of_without_audit_probe() {
        let database = CannedDatabase::new(&[("SELECT id FROM sys.traces", traces())]);
        let calls = Arc::clone(&database.calls);
        let runner = runner(database, 2);
        let overrides = AttributeOverrides::from([
            ("server_audit_implemented".to_string(), ProbeValue::Boolean(false)),
            ("server_trace_implemented".to_string(), ProbeValue::Boolean(true)),
        ]);

        let report = runner.run_profile(&profile(vec![control(AUDIT_OR_TRACE)]), &overrides);
        let result = report.result("V-67769").unwrap();
        assert_eq!(result.status(), ControlStatus::Passed);
        assert!(result.details().iter().all(|d| !d.path.contains("Audit defined")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_timeout_waits_for_slow_probe() {
        let mut database = CannedDatabase::new(&[("SELECT slow", ProbeValue::Null)]);
        database.delay = Duration::from_millis(100);
        let registry = RegistryBuilder::new().with_provider(database).build().unwrap();
        let runner = ProfileRunner::new(Arc::new(registry))
            .with_config(RunnerConfig::default().with_probe_timeout(Duration::ZERO));

        let report = runner.run_profile(&profile(vec![control(SLOW_QUERY)]), &AttributeOverrides::new());
        assert_eq!(report.results[0].status(), ControlStatus::Passed);
    }

    #[test]
    fn test_probe_timeout_errors_only_that_control() {
        let mut database = CannedDatabase::new(&[("SELECT slow", ProbeValue::Null)]);
        database.delay = Duration::from_millis(500);
        let registry = RegistryBuilder::new().with_provider(database).build().unwrap();
        let runner = ProfileRunner::new(Arc::new(registry)).with_config(
            RunnerConfig::default()
                .with_max_threads(2)
                .with_probe_timeout(Duration::from_millis(20)),
        );

        let report = runner.run_profile(
            &profile(vec![control(SLOW_QUERY), control(MANUAL)]),
            &AttributeOverrides::new(),
        );
        assert_eq!(report.results[0].status(), ControlStatus::Error);
        assert_eq!(report.results[0].error_kind(), Some(ErrorKind::ResourceUnavailable));
        assert_eq!(report.results[1].status(), ControlStatus::Skipped);
    }

    #[test]
    fn test_manual_control_skipped_regardless_of_attributes() {
        let database = CannedDatabase::new(&[]);
        let calls = Arc::clone(&database.calls);
        let report = runner(database, 1)
            .run_profile(&profile(vec![control(MANUAL)]), &AttributeOverrides::new());

        let result = &report.results[0];
        assert_eq!(result.status(), ControlStatus::Skipped);
        assert_eq!(result.skip_reason(), Some("Manual review of audit key protection"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_membership_against_attribute_list() {
        let database = CannedDatabase::new(&[
            (
                "SELECT name FROM guest_login",
                ProbeValue::Table(Table::single_row(vec![("name".to_string(), "guest".into())])),
            ),
            (
                "SELECT name FROM public_login",
                ProbeValue::Table(Table::single_row(vec![("name".to_string(), "public".into())])),
            ),
        ]);
        let controls = vec![
            membership("V-67897", "SELECT name FROM guest_login"),
            membership("V-67901", "SELECT name FROM public_login"),
        ];
        let report = runner(database, 2).run_profile(&profile(controls), &AttributeOverrides::new());

        assert_eq!(report.result("V-67897").unwrap().status(), ControlStatus::Failed);
        assert_eq!(report.result("V-67901").unwrap().status(), ControlStatus::Passed);
    }

    #[test]
    fn test_results_follow_declared_order_across_threads() {
        let database = CannedDatabase::new(&[("SELECT id FROM sys.traces", traces())]);
        let controls: Vec<Control> = (0..12)
            .map(|i| {
                control(&AUDIT_OR_TRACE.replace("V-67769", &format!("V-{}", 100 - i)))
            })
            .collect();
        let overrides = AttributeOverrides::from([(
            "server_trace_implemented".to_string(),
            ProbeValue::Boolean(true),
        )]);

        let report = runner(database, 4).run_profile(&profile(controls), &overrides);
        let ids: Vec<&str> = report.results.iter().map(|r| r.control_id()).collect();
        let expected: Vec<String> = (0..12).map(|i| format!("V-{}", 100 - i)).collect();
        assert_eq!(ids, expected.iter().map(String::as_str).collect::<Vec<_>>());
        assert_eq!(report.summary.by_status.passed, 12);
        assert!(!report.cancelled);
    }

    #[test]
    fn test_rerun_yields_identical_results() {
        let database = CannedDatabase::new(&[("SELECT id FROM sys.traces", traces())]);
        let runner = runner(database, 3);
        let profile = profile(vec![control(AUDIT_OR_TRACE), control(MANUAL), control(SLOW_QUERY)]);
        let overrides = AttributeOverrides::from([(
            "server_trace_implemented".to_string(),
            ProbeValue::Boolean(true),
        )]);

        let first = runner.run_profile(&profile, &overrides);
        let second = runner.run_profile(&profile, &overrides);
        assert_eq!(first.results, second.results);
        assert_ne!(first.run_id, second.run_id);
    }

    #[test]
    fn test_unresolved_attribute_does_not_abort_run() {
        let database = CannedDatabase::new(&[]);
        let needs_user = control(
            r#"{"id": "V-67935", "attributes": [{"name": "user"}], "body": {"combinator": "all", "children": [
                {"assertion": {"subject": {"attribute": {"name": "user"}}, "matcher": {"kind": "empty"}}}
            ]}}"#,
        );
        let report = runner(database, 2)
            .run_profile(&profile(vec![needs_user, control(MANUAL)]), &AttributeOverrides::new());

        assert_eq!(report.results[0].error_kind(), Some(ErrorKind::AttributeUnresolved));
        assert_eq!(report.results[1].status(), ControlStatus::Skipped);
    }

    #[test]
    fn test_cancelled_before_start_abandons_everything() {
        let runner = runner(CannedDatabase::new(&[]), 2);
        runner.cancellation_token().cancel();

        let report = runner.run_profile(&profile(vec![control(MANUAL)]), &AttributeOverrides::new());
        assert!(report.cancelled);
        assert!(report.results.is_empty());
        assert_eq!(report.abandoned, vec!["V-67873".to_string()]);
    }

    #[test]
    fn test_cancel_mid_run_keeps_finished_results() {
        let token = CancellationToken::new();
        let mut database = CannedDatabase::new(&[("SELECT slow", ProbeValue::Null)]);
        database.cancel_on_fetch = Some(token.clone());
        let registry = RegistryBuilder::new().with_provider(database).build().unwrap();
        let runner = ProfileRunner::new(Arc::new(registry))
            .with_config(RunnerConfig::default().with_max_threads(1))
            .with_cancellation(token);

        let controls = vec![
            control(SLOW_QUERY),
            control(MANUAL),
            control(&SLOW_QUERY.replace("V-67825", "V-67833")),
        ];
        let report = runner.run_profile(&profile(controls), &AttributeOverrides::new());

        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].status(), ControlStatus::Passed);
        assert_eq!(report.abandoned, vec!["V-67873".to_string(), "V-67833".to_string()]);
    }

    #[test]
    fn test_environment_overrides_profile_default() {
        let database = CannedDatabase::new(&[("SELECT id FROM sys.traces", traces())]);
        let registry = RegistryBuilder::new().with_provider(database).build().unwrap();
        let runner = ProfileRunner::new(Arc::new(registry))
            .with_config(RunnerConfig::default().with_attribute_prefix("STIG_RUNNER_ENV_"))
            .with_environment(vec![(
                "STIG_RUNNER_ENV_SERVER_TRACE_IMPLEMENTED".to_string(),
                "true".to_string(),
            )]);

        let profile = profile(vec![control(AUDIT_OR_TRACE)]);
        let attributes =
            runner.resolve_attributes(profile.attribute_store(), profile.controls(), &AttributeOverrides::new());
        assert_eq!(
            attributes.get("server_trace_implemented").unwrap(),
            &ProbeValue::Boolean(true)
        );
    }

    #[test]
    fn test_provider_panic_errors_only_that_control() {
        for timeout in [Duration::ZERO, Duration::from_secs(5)] {
            let mut database = CannedDatabase::new(&[]);
            database.panic_on_fetch = true;
            let registry = RegistryBuilder::new().with_provider(database).build().unwrap();
            let runner = ProfileRunner::new(Arc::new(registry))
                .with_config(
                    RunnerConfig::default()
                        .with_max_threads(1)
                        .with_probe_timeout(timeout),
                )
                .with_environment(Vec::new());

            let report = runner.run_profile(
                &profile(vec![control(SLOW_QUERY), control(MANUAL)]),
                &AttributeOverrides::new(),
            );
            assert_eq!(report.results.len(), 2);
            assert_eq!(report.results[0].status(), ControlStatus::Error);
            assert_eq!(report.results[0].error_kind(), Some(ErrorKind::ResourceUnavailable));
            assert_eq!(report.results[1].status(), ControlStatus::Skipped);
        }
    }

    #[test]
    fn test_run_path_reports_missing_profile() {
        let runner = runner(CannedDatabase::new(&[]), 1);
        let err = runner.run_path(Path::new("/nonexistent/profile"), None).unwrap_err();
        assert!(matches!(err, RunnerError::Profile(_)));
    }

    #[test]
    fn test_store_resolution_includes_declared_attributes() {
        let mut store = AttributeStore::new();
        store
            .register(Attribute::new("max_connections", "").with_default(100i64))
            .unwrap();
        let runner = runner(CannedDatabase::new(&[]), 1);
        let resolved = runner.resolve_attributes(&store, &[], &AttributeOverrides::new());
        assert_eq!(resolved.get("max_connections").unwrap(), &ProbeValue::Integer(100));
    }
}
