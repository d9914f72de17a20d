//! # Control Runner
//!
//! Evaluates one control against the shared provider registry and the
//! run's resolved attributes:
//!
//! 1. manual controls short-circuit to SKIPPED without touching providers
//! 2. definition defects, unknown probe kinds and unresolved attributes
//!    end the control in ERROR before any probe runs
//! 3. the assertion tree is walked in declared order, guards and
//!    expansions deciding which subtrees contribute
//! 4. the root verdict becomes the control status
//!
//! Nothing here panics or aborts the run; every failure is packaged into
//! the returned [`ControlResult`].

use super::combinator::{GroupEvaluation, Verdict};
use super::comparisons::MatcherError;
use super::evaluator::evaluate;
use super::selectors;
use super::session::ProbeSession;
use crate::attributes::{AttributeError, ResolvedAttributes};
use crate::results::{AssertionDetail, ControlResult, ControlResultBuilder};
use crate::strategies::{ProbeError, ProbeParameters, ProbeRequest, ProviderRegistry};
use crate::types::{
    Assertion, AssertionGroup, Combinator, Control, DefinitionError, ErrorKind, Node, Operand,
    ProbeValue, Subject,
};
use log::{debug, info};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Justification recorded when every branch of a tree was excluded
pub const NO_APPLICABLE_ASSERTIONS: &str = "no applicable assertions";

pub struct ControlRunner {
    registry: Arc<ProviderRegistry>,
    attributes: Arc<ResolvedAttributes>,
    probe_timeout: Option<Duration>,
}

impl ControlRunner {
    pub fn new(registry: Arc<ProviderRegistry>, attributes: Arc<ResolvedAttributes>) -> Self {
        Self {
            registry,
            attributes,
            probe_timeout: None,
        }
    }

    /// Bound every provider call; `None` waits indefinitely
    pub fn with_probe_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn attributes(&self) -> &ResolvedAttributes {
        &self.attributes
    }

    /// Evaluate one control
    pub fn run(&self, control: &Control) -> ControlResult {
        let start = Instant::now();
        let result = self.run_inner(control);
        info!(
            "Control {} finished {} in {}ms ({} probe calls)",
            control.id,
            result.status(),
            start.elapsed().as_millis(),
            result.probe_calls()
        );
        result
    }

    fn run_inner(&self, control: &Control) -> ControlResult {
        let builder = ControlResultBuilder::for_control(control);

        if let Some(reason) = &control.defect {
            return builder.error(
                ErrorKind::ControlDefinitionError,
                DefinitionError::Malformed {
                    reason: reason.clone(),
                }
                .to_string(),
            );
        }

        if let Some(justification) = &control.skip {
            debug!("Control {} is manual: {}", control.id, justification);
            return builder.skipped(justification.clone());
        }

        if let Err(e) = control.validate() {
            return builder.error(e.error_kind(), e.to_string());
        }

        if let Some(kind) = control
            .probe_kinds()
            .into_iter()
            .find(|kind| !self.registry.has_kind(kind))
        {
            let error = DefinitionError::UnknownProbeKind { kind };
            return builder.error(error.error_kind(), error.to_string());
        }

        if let Some(e) = self
            .attributes
            .first_failure(&control.referenced_attributes())
        {
            return builder.error(e.error_kind(), e.to_string());
        }

        let body = match &control.body {
            Some(body) => body,
            None => {
                let error = DefinitionError::MissingBody {
                    control_id: control.id.clone(),
                };
                return builder.error(error.error_kind(), error.to_string());
            }
        };

        let mut walker = TreeWalker::new(
            ProbeSession::new(&self.registry, self.probe_timeout),
            &self.attributes,
        );
        let verdict = walker.group(body, "");
        let (details, probe_calls) = walker.finish();

        let first_error = details
            .iter()
            .find(|detail| detail.verdict == Verdict::Error)
            .map(|detail| {
                (
                    detail
                        .error_kind
                        .unwrap_or(ErrorKind::MatcherApplicationError),
                    format!(
                        "{}: {}",
                        detail.path,
                        detail.message.as_deref().unwrap_or("error")
                    ),
                )
            });

        let builder = builder
            .with_details(details)
            .with_probe_calls(probe_calls);

        match verdict {
            Some(Verdict::Passed) => builder.passed(),
            Some(Verdict::Failed) => builder.failed(),
            Some(Verdict::Error) => {
                let (kind, message) = first_error.unwrap_or((
                    ErrorKind::MatcherApplicationError,
                    "assertion tree evaluated to ERROR".to_string(),
                ));
                builder.error(kind, message)
            }
            None => builder.skipped(NO_APPLICABLE_ASSERTIONS),
        }
    }
}

// ============================================================================
// Tree walking
// ============================================================================

/// Failure of a single leaf, classified by the error taxonomy
#[derive(Debug, Clone, PartialEq)]
struct LeafFailure {
    kind: ErrorKind,
    message: String,
}

impl LeafFailure {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<AttributeError> for LeafFailure {
    fn from(e: AttributeError) -> Self {
        LeafFailure::new(e.error_kind(), e.to_string())
    }
}

impl From<ProbeError> for LeafFailure {
    fn from(e: ProbeError) -> Self {
        LeafFailure::new(e.error_kind(), e.to_string())
    }
}

impl From<MatcherError> for LeafFailure {
    fn from(e: MatcherError) -> Self {
        LeafFailure::new(e.error_kind(), e.to_string())
    }
}

struct AssertionOutcome {
    actual: ProbeValue,
    expected: ProbeValue,
    result: Result<bool, LeafFailure>,
}

struct TreeWalker<'a> {
    session: ProbeSession<'a>,
    attributes: &'a ResolvedAttributes,
    /// Active `for_each` bindings, innermost last
    bindings: Vec<(String, ProbeValue)>,
    details: Vec<AssertionDetail>,
}

impl<'a> TreeWalker<'a> {
    fn new(session: ProbeSession<'a>, attributes: &'a ResolvedAttributes) -> Self {
        Self {
            session,
            attributes,
            bindings: Vec::new(),
            details: Vec::new(),
        }
    }

    /// Release handles and hand back collected details
    fn finish(mut self) -> (Vec<AssertionDetail>, usize) {
        let calls = self.session.provider_calls();
        self.session.close();
        (std::mem::take(&mut self.details), calls)
    }

    fn group(&mut self, group: &AssertionGroup, parent: &str) -> Option<Verdict> {
        let path = join_path(parent, &self.substitute(&group.label()));
        self.children(group.combinator, &group.children, &path)
    }

    fn children(&mut self, combinator: Combinator, children: &[Node], path: &str) -> Option<Verdict> {
        let mut evaluation = GroupEvaluation::new(combinator);
        for child in children {
            if let Some(verdict) = self.node(child, path) {
                evaluation.record(verdict);
            }
        }
        evaluation.conclude()
    }

    fn node(&mut self, node: &Node, parent: &str) -> Option<Verdict> {
        match node {
            Node::Assertion(assertion) => Some(self.assertion(assertion, parent)),
            Node::Group(group) => self.group(group, parent),
            Node::When(branch) => {
                let path = join_path(parent, &self.substitute(&branch.label()));
                let outcome = self.apply(&branch.guard);
                match outcome.result {
                    Ok(true) => self.node(&branch.then, &path),
                    Ok(false) => {
                        debug!("Branch '{}' excluded", path);
                        None
                    }
                    Err(failure) => {
                        let description = self.substitute(&branch.guard.label());
                        self.record_failure(
                            &path,
                            description,
                            &branch.guard.subject,
                            branch.guard.matcher.to_string(),
                            failure,
                        );
                        Some(Verdict::Error)
                    }
                }
            }
            Node::ForEach(branch) => {
                let path = join_path(parent, &self.substitute(&branch.label()));
                let items = match self.resolve_subject(&branch.over) {
                    Ok(ProbeValue::List(items)) => items,
                    Ok(ProbeValue::Null) => Vec::new(),
                    Ok(other) => {
                        let failure = LeafFailure::new(
                            ErrorKind::MatcherApplicationError,
                            format!("cannot iterate over a {} value", other.value_type()),
                        );
                        self.record_failure(
                            &path,
                            branch.label(),
                            &branch.over,
                            "each".to_string(),
                            failure,
                        );
                        return Some(Verdict::Error);
                    }
                    Err(failure) => {
                        self.record_failure(
                            &path,
                            branch.label(),
                            &branch.over,
                            "each".to_string(),
                            failure,
                        );
                        return Some(Verdict::Error);
                    }
                };

                let mut evaluation = GroupEvaluation::new(branch.combinator);
                for item in items {
                    let item_path = format!("{} [{}]", path, item.to_text());
                    self.bindings.push((branch.bind.clone(), item));
                    let verdict = self.children(Combinator::All, &branch.body, &item_path);
                    self.bindings.pop();
                    if let Some(verdict) = verdict {
                        evaluation.record(verdict);
                    }
                }
                evaluation.conclude()
            }
        }
    }

    fn assertion(&mut self, assertion: &Assertion, parent: &str) -> Verdict {
        let description = self.substitute(&assertion.label());
        let path = join_path(parent, &description);
        let outcome = self.apply(assertion);

        let (verdict, message, error_kind) = match outcome.result {
            Ok(true) => (Verdict::Passed, None, None),
            Ok(false) => (Verdict::Failed, None, None),
            Err(failure) => (Verdict::Error, Some(failure.message), Some(failure.kind)),
        };
        debug!("{} -> {}", path, verdict);

        let subject = self.substitute(&assertion.subject.to_string());
        self.details.push(AssertionDetail {
            path,
            description,
            verdict,
            subject,
            matcher: assertion.matcher.to_string(),
            expected: outcome.expected,
            actual: outcome.actual,
            message,
            error_kind,
        });
        verdict
    }

    fn apply(&mut self, assertion: &Assertion) -> AssertionOutcome {
        let actual = match self.resolve_subject(&assertion.subject) {
            Ok(value) => value,
            Err(failure) => {
                return AssertionOutcome {
                    actual: ProbeValue::Null,
                    expected: ProbeValue::Null,
                    result: Err(failure),
                }
            }
        };

        let expected = match assertion.expected.as_ref().map(|op| self.resolve_operand(op)) {
            Some(Ok(value)) => Some(value),
            Some(Err(failure)) => {
                return AssertionOutcome {
                    actual,
                    expected: ProbeValue::Null,
                    result: Err(failure),
                }
            }
            None => None,
        };

        let result = evaluate(&actual, &assertion.matcher, expected.as_ref()).map_err(LeafFailure::from);
        AssertionOutcome {
            actual,
            expected: expected.unwrap_or_default(),
            result,
        }
    }

    fn record_failure(
        &mut self,
        path: &str,
        description: String,
        subject: &Subject,
        matcher: String,
        failure: LeafFailure,
    ) {
        let subject = self.substitute(&subject.to_string());
        self.details.push(AssertionDetail {
            path: path.to_string(),
            description,
            verdict: Verdict::Error,
            subject,
            matcher,
            expected: ProbeValue::Null,
            actual: ProbeValue::Null,
            message: Some(failure.message),
            error_kind: Some(failure.kind),
        });
    }

    fn resolve_subject(&mut self, subject: &Subject) -> Result<ProbeValue, LeafFailure> {
        let raw = match subject {
            Subject::Attribute { name, .. } => self.attributes.get(name)?.clone(),
            Subject::Binding { name, .. } => self.binding(name)?.clone(),
            Subject::Probe {
                kind,
                parameters,
                query,
                ..
            } => {
                let mut resolved = ProbeParameters::new();
                for (key, operand) in parameters {
                    resolved.insert(key.clone(), self.resolve_operand(operand)?);
                }
                let request = ProbeRequest::new(kind.clone(), resolved, self.substitute(query));
                self.session.fetch(&request)?
            }
        };
        Ok(selectors::apply(raw, subject.selectors())?)
    }

    fn resolve_operand(&self, operand: &Operand) -> Result<ProbeValue, LeafFailure> {
        match operand {
            Operand::Attribute { attribute } => Ok(self.attributes.get(attribute)?.clone()),
            Operand::Binding { binding } => self.binding(binding).cloned(),
            Operand::Literal(ProbeValue::String(text)) => {
                Ok(ProbeValue::String(self.substitute(text)))
            }
            Operand::Literal(value) => Ok(value.clone()),
        }
    }

    fn binding(&self, name: &str) -> Result<&ProbeValue, LeafFailure> {
        self.bindings
            .iter()
            .rev()
            .find(|(bound, _)| bound == name)
            .map(|(_, value)| value)
            .ok_or_else(|| {
                LeafFailure::new(
                    ErrorKind::ControlDefinitionError,
                    format!("binding '{}' is not in scope", name),
                )
            })
    }

    /// Replace `${name}` with the text of the innermost binding of that name
    fn substitute(&self, text: &str) -> String {
        if self.bindings.is_empty() || !text.contains("${") {
            return text.to_string();
        }
        let mut out = text.to_string();
        for (name, value) in self.bindings.iter().rev() {
            out = out.replace(&format!("${{{}}}", name), &value.to_text());
        }
        out
    }
}

fn join_path(parent: &str, label: &str) -> String {
    if parent.is_empty() {
        label.to_string()
    } else {
        format!("{} > {}", parent, label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{Attribute, AttributeOverrides, AttributeStore};
    use crate::results::ControlStatus;
    use crate::strategies::{ProviderHandle, RegistryBuilder, ResourceProvider};
    use crate::types::{ConditionalBranch, ForEachBranch, Matcher, Selector, Table};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted database provider counting every fetch
    struct ScriptedQueries {
        answers: HashMap<String, Result<ProbeValue, ProbeError>>,
        delay: Duration,
        calls: Arc<AtomicUsize>,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedQueries {
        fn new() -> Self {
            Self {
                answers: HashMap::new(),
                delay: Duration::ZERO,
                calls: Arc::new(AtomicUsize::new(0)),
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn answer(mut self, query: &str, value: ProbeValue) -> Self {
            self.answers.insert(query.to_string(), Ok(value));
            self
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    impl ResourceProvider for ScriptedQueries {
        fn kind(&self) -> &str {
            "database-query"
        }

        fn connect(&self, _parameters: &ProbeParameters) -> Result<ProviderHandle, ProbeError> {
            Ok(Arc::new(()))
        }

        fn fetch(&self, _handle: &ProviderHandle, query: &str) -> Result<ProbeValue, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(query.to_string());
            std::thread::sleep(self.delay);
            self.answers
                .get(query)
                .cloned()
                .unwrap_or_else(|| Err(ProbeError::query_failed("database-query", query, "no such table")))
        }
    }

    fn attributes(pairs: &[(&str, ProbeValue)]) -> Arc<ResolvedAttributes> {
        Arc::new(
            pairs
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
        )
    }

    fn runner(provider: ScriptedQueries, attrs: Arc<ResolvedAttributes>) -> ControlRunner {
        let registry = RegistryBuilder::new().with_provider(provider).build().unwrap();
        ControlRunner::new(Arc::new(registry), attrs)
    }

    fn attr_is_true(name: &str) -> Assertion {
        Assertion::new(Subject::attribute(name), Matcher::equals()).expecting(true)
    }

    fn audit_query() -> Subject {
        Subject::probe("database-query", "SELECT audited_result FROM audit_details")
    }

    /// Trace/audit control in the shape of the SQL Server audit checks
    fn trace_or_audit_control() -> Control {
        let audit_branch = ConditionalBranch::new(
            attr_is_true("server_audit_implemented"),
            Node::Group(
                AssertionGroup::all(vec![
                    Node::Assertion(
                        Assertion::new(audit_query(), Matcher::Empty.negate())
                            .with_description("Defined audits"),
                    ),
                    Node::Assertion(
                        Assertion::new(
                            audit_query()
                                .select(Selector::Column("audited_result".to_string()))
                                .select(Selector::Distinct)
                                .select(Selector::Join),
                            Matcher::matches(),
                        )
                        .expecting("SUCCESS AND FAILURE|FAILURE")
                        .with_description("Audited result"),
                    ),
                ])
                .with_description("SQL Server Audit"),
            ),
        );
        let trace_branch = ConditionalBranch::new(
            attr_is_true("server_trace_implemented"),
            Node::Assertion(
                Assertion::new(
                    Subject::probe("database-query", "SELECT id FROM sys.traces"),
                    Matcher::Empty.negate(),
                )
                .with_description("Defined traces"),
            ),
        );

        Control::new(
            "V-67931",
            AssertionGroup::one_of(vec![
                Node::When(trace_branch),
                Node::When(audit_branch),
            ]),
        )
    }

    #[test]
    fn test_one_of_passes_via_trace_without_touching_audit() {
        let provider = ScriptedQueries::new().answer(
            "SELECT id FROM sys.traces",
            ProbeValue::Table(Table::new(["id"]).with_row(vec![ProbeValue::Integer(2)])),
        );
        let seen = Arc::clone(&provider.seen);
        let runner = runner(
            provider,
            attributes(&[
                ("server_audit_implemented", ProbeValue::Boolean(false)),
                ("server_trace_implemented", ProbeValue::Boolean(true)),
            ]),
        );

        let result = runner.run(&trace_or_audit_control());
        assert_eq!(result.status(), ControlStatus::Passed);
        assert_eq!(result.details().len(), 1);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["SELECT id FROM sys.traces".to_string()]
        );
    }

    #[test]
    fn test_identical_probes_fetch_once() {
        let rows = Table::new(["audited_result"])
            .with_row(vec![ProbeValue::from("SUCCESS AND FAILURE")]);
        let provider = ScriptedQueries::new().answer(
            "SELECT audited_result FROM audit_details",
            ProbeValue::Table(rows),
        );
        let calls = Arc::clone(&provider.calls);
        let runner = runner(
            provider,
            attributes(&[
                ("server_audit_implemented", ProbeValue::Boolean(true)),
                ("server_trace_implemented", ProbeValue::Boolean(false)),
            ]),
        );

        let result = runner.run(&trace_or_audit_control());
        assert_eq!(result.status(), ControlStatus::Passed);
        assert_eq!(result.details().len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.probe_calls(), 1);
    }

    #[test]
    fn test_timed_out_probe_is_error() {
        let provider = ScriptedQueries::new()
            .answer("SELECT 1", ProbeValue::Integer(1))
            .slow(Duration::from_millis(500));
        let runner = runner(provider, attributes(&[]))
            .with_probe_timeout(Some(Duration::from_millis(20)));
        let control = Control::new(
            "V-1",
            AssertionGroup::all(vec![Node::Assertion(Assertion::new(
                Subject::probe("database-query", "SELECT 1"),
                Matcher::Empty.negate(),
            ))]),
        );

        let result = runner.run(&control);
        assert_eq!(result.status(), ControlStatus::Error);
        assert_eq!(result.error_kind(), Some(ErrorKind::ResourceUnavailable));
        assert_eq!(result.details()[0].verdict, Verdict::Error);
    }

    #[test]
    fn test_manual_control_makes_no_probe_calls() {
        let provider = ScriptedQueries::new();
        let calls = Arc::clone(&provider.calls);
        let runner = runner(provider, attributes(&[]));
        let control = trace_or_audit_control().with_skip("Manual check of key backups");

        let result = runner.run(&control);
        assert_eq!(result.status(), ControlStatus::Skipped);
        assert_eq!(result.skip_reason(), Some("Manual check of key backups"));
        assert_eq!(result.probe_calls(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unresolved_attribute_is_error_not_failure() {
        let runner = runner(ScriptedQueries::new(), attributes(&[]));
        let result = runner.run(&trace_or_audit_control());
        assert_eq!(result.status(), ControlStatus::Error);
        assert_eq!(result.error_kind(), Some(ErrorKind::AttributeUnresolved));
        assert!(result.details().is_empty());
    }

    #[test]
    fn test_type_mismatch_reported_with_kind() {
        let mut store = AttributeStore::new();
        store
            .register(Attribute::new("server_trace_implemented", "").with_default(false))
            .unwrap();
        store
            .register(Attribute::new("server_audit_implemented", "").with_default(false))
            .unwrap();
        let overrides = AttributeOverrides::from([(
            "server_trace_implemented".to_string(),
            ProbeValue::from("yes"),
        )]);
        let resolved = Arc::new(store.resolve_all(std::iter::empty(), &overrides));

        let result = runner(ScriptedQueries::new(), resolved).run(&trace_or_audit_control());
        assert_eq!(result.error_kind(), Some(ErrorKind::AttributeTypeMismatch));
    }

    #[test]
    fn test_unknown_probe_kind_is_definition_error() {
        let runner = runner(ScriptedQueries::new(), attributes(&[]));
        let control = Control::new(
            "V-2",
            AssertionGroup::all(vec![Node::Assertion(Assertion::new(
                Subject::probe("ldap-search", "(cn=*)"),
                Matcher::Empty,
            ))]),
        );
        let result = runner.run(&control);
        assert_eq!(result.error_kind(), Some(ErrorKind::ControlDefinitionError));
    }

    #[test]
    fn test_defective_control_is_error() {
        let runner = runner(ScriptedQueries::new(), attributes(&[]));
        let result = runner.run(&Control::defective("V-3", "expected value at line 4"));
        assert_eq!(result.status(), ControlStatus::Error);
        assert_eq!(result.error_kind(), Some(ErrorKind::ControlDefinitionError));
    }

    #[test]
    fn test_all_branches_excluded_is_skipped() {
        let runner = runner(
            ScriptedQueries::new(),
            attributes(&[
                ("server_audit_implemented", ProbeValue::Boolean(false)),
                ("server_trace_implemented", ProbeValue::Boolean(false)),
            ]),
        );
        let result = runner.run(&trace_or_audit_control());
        assert_eq!(result.status(), ControlStatus::Skipped);
        assert_eq!(result.skip_reason(), Some(NO_APPLICABLE_ASSERTIONS));
    }

    #[test]
    fn test_query_error_in_one_of_does_not_mask_pass() {
        let provider = ScriptedQueries::new();
        let runner = runner(
            provider,
            attributes(&[("server_reporting_services_used", ProbeValue::Boolean(true))]),
        );
        let control = Control::new(
            "V-67825",
            AssertionGroup::one_of(vec![
                Node::Assertion(attr_is_true("server_reporting_services_used")),
                Node::Assertion(Assertion::new(
                    Subject::probe("database-query", "SELECT broken"),
                    Matcher::Empty,
                )),
            ]),
        );
        let result = runner.run(&control);
        assert_eq!(result.status(), ControlStatus::Passed);
        assert_eq!(result.details()[1].error_kind, Some(ErrorKind::ResourceQueryError));
    }

    #[test]
    fn test_for_each_expands_bound_queries() {
        let traces = Table::new(["id"])
            .with_row(vec![ProbeValue::Integer(1)])
            .with_row(vec![ProbeValue::Integer(2)]);
        let provider = ScriptedQueries::new()
            .answer("SELECT id FROM sys.traces", ProbeValue::Table(traces))
            .answer(
                "SELECT eventid FROM fn_trace_geteventinfo(1)",
                ProbeValue::Table(Table::new(["eventid"]).with_row(vec![ProbeValue::from("14")])),
            )
            .answer(
                "SELECT eventid FROM fn_trace_geteventinfo(2)",
                ProbeValue::Table(
                    Table::new(["eventid"])
                        .with_row(vec![ProbeValue::from("14")])
                        .with_row(vec![ProbeValue::from("20")]),
                ),
            );
        let runner = runner(provider, attributes(&[]));

        let events = Subject::probe(
            "database-query",
            "SELECT eventid FROM fn_trace_geteventinfo(${trace_id})",
        )
        .select(Selector::Column("eventid".to_string()));
        let control = Control::new(
            "V-67931",
            AssertionGroup::all(vec![Node::ForEach(ForEachBranch {
                description: Some("Trace event coverage".to_string()),
                over: Subject::probe("database-query", "SELECT id FROM sys.traces")
                    .select(Selector::Column("id".to_string())),
                bind: "trace_id".to_string(),
                combinator: Combinator::OneOf,
                body: vec![Node::Assertion(
                    Assertion::new(events, Matcher::Includes)
                        .expecting("20")
                        .with_description("Events in trace ${trace_id}"),
                )],
            })]),
        );

        let result = runner.run(&control);
        assert_eq!(result.status(), ControlStatus::Passed);
        let paths: Vec<&str> = result.details().iter().map(|d| d.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "all > Trace event coverage [1] > Events in trace 1",
                "all > Trace event coverage [2] > Events in trace 2",
            ]
        );
        assert_eq!(result.details()[0].verdict, Verdict::Failed);
    }

    #[test]
    fn test_empty_expansion_contributes_nothing() {
        let provider = ScriptedQueries::new()
            .answer("SELECT id FROM sys.traces", ProbeValue::Table(Table::new(["id"])));
        let runner = runner(provider, attributes(&[("trace_expected", ProbeValue::Boolean(true))]));
        let control = Control::new(
            "V-1",
            AssertionGroup::all(vec![
                Node::Assertion(attr_is_true("trace_expected")),
                Node::ForEach(ForEachBranch {
                    description: None,
                    over: Subject::probe("database-query", "SELECT id FROM sys.traces")
                        .select(Selector::Column("id".to_string())),
                    bind: "trace_id".to_string(),
                    combinator: Combinator::All,
                    body: vec![Node::Assertion(
                        Assertion::new(Subject::binding("trace_id"), Matcher::Empty),
                    )],
                }),
            ]),
        );
        let result = runner.run(&control);
        assert_eq!(result.status(), ControlStatus::Passed);
        assert_eq!(result.details().len(), 1);
    }

    #[test]
    fn test_guard_error_is_error_leaf() {
        let runner = runner(ScriptedQueries::new(), attributes(&[]));
        let guard = Assertion::new(
            Subject::probe("database-query", "SELECT edition"),
            Matcher::Empty,
        );
        let control = Control::new(
            "V-1",
            AssertionGroup::all(vec![Node::When(ConditionalBranch::new(
                guard,
                Node::Assertion(Assertion::new(Subject::probe("database-query", "x"), Matcher::Empty)),
            ))]),
        );
        let result = runner.run(&control);
        assert_eq!(result.status(), ControlStatus::Error);
        assert_eq!(result.error_kind(), Some(ErrorKind::ResourceQueryError));
    }

    #[test]
    fn test_rerun_is_deterministic() {
        let rows = Table::new(["audited_result"]).with_row(vec![ProbeValue::from("SUCCESS")]);
        let provider = ScriptedQueries::new()
            .answer("SELECT audited_result FROM audit_details", ProbeValue::Table(rows));
        let runner = runner(
            provider,
            attributes(&[
                ("server_audit_implemented", ProbeValue::Boolean(true)),
                ("server_trace_implemented", ProbeValue::Boolean(false)),
            ]),
        );
        let control = trace_or_audit_control();
        let first = runner.run(&control);
        let second = runner.run(&control);
        assert_eq!(first.status(), ControlStatus::Failed);
        assert_eq!(first, second);
    }
}
