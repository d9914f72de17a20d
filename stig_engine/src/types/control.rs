//! # Control Definitions
//!
//! Declarative shape of a compliance control: metadata, attribute
//! declarations and the assertion tree evaluated by the control runner.
//! Every type here deserializes from the JSON/TOML profile format.

use super::common::ProbeValue;
use super::error::DefinitionError;
use crate::attributes::Attribute;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

fn default_impact() -> f64 {
    0.5
}

// ============================================================================
// CONTROL
// ============================================================================

/// A single compliance control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Control {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default = "default_impact")]
    pub impact: f64,

    /// Explicit severity, overrides the impact mapping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,

    /// Opaque metadata (gtitle, gid, rid, stig_id, cci, nist, ...)
    #[serde(default)]
    pub tags: BTreeMap<String, serde_json::Value>,

    /// Opaque narrative text (desc, check, fix)
    #[serde(default)]
    pub narrative: BTreeMap<String, String>,

    #[serde(default)]
    pub attributes: Vec<Attribute>,

    /// Manual or out-of-scope justification; the tree is never walked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<AssertionGroup>,

    /// Set by the profile loader when the definition could not be parsed
    #[serde(skip)]
    pub defect: Option<String>,
}

impl Control {
    pub fn new(id: impl Into<String>, body: AssertionGroup) -> Self {
        Self {
            id: id.into(),
            title: None,
            impact: default_impact(),
            severity: None,
            tags: BTreeMap::new(),
            narrative: BTreeMap::new(),
            attributes: Vec::new(),
            skip: None,
            body: Some(body),
            defect: None,
        }
    }

    /// Manual control that is always reported SKIPPED
    pub fn manual(id: impl Into<String>, justification: impl Into<String>) -> Self {
        Self {
            body: None,
            skip: Some(justification.into()),
            ..Self::new(id, AssertionGroup::all(Vec::new()))
        }
    }

    /// Placeholder for a definition that failed to load
    pub fn defective(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            body: None,
            defect: Some(reason.into()),
            ..Self::new(id, AssertionGroup::all(Vec::new()))
        }
    }

    pub fn with_impact(mut self, impact: f64) -> Self {
        self.impact = impact;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.tags.insert(key.into(), value);
        self
    }

    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_skip(mut self, justification: impl Into<String>) -> Self {
        self.skip = Some(justification.into());
        self
    }

    pub fn severity(&self) -> Severity {
        self.severity
            .unwrap_or_else(|| Severity::from_impact(self.impact))
    }

    pub fn is_manual(&self) -> bool {
        self.skip.is_some()
    }

    /// Structural validation of the assertion tree
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if let Some(reason) = &self.defect {
            return Err(DefinitionError::Malformed {
                reason: reason.clone(),
            });
        }
        match &self.body {
            Some(body) => body.validate(&self.id, &BTreeSet::new()),
            None if self.skip.is_some() => Ok(()),
            None => Err(DefinitionError::MissingBody {
                control_id: self.id.clone(),
            }),
        }
    }

    /// Every attribute name the control reads: declarations plus references
    pub fn referenced_attributes(&self) -> BTreeSet<String> {
        let mut names: BTreeSet<String> =
            self.attributes.iter().map(|a| a.name.clone()).collect();
        if let Some(body) = &self.body {
            body.visit_nodes(&mut |node| node.collect_attributes(&mut names));
        }
        names
    }

    /// Probe kinds used anywhere in the tree
    pub fn probe_kinds(&self) -> BTreeSet<String> {
        let mut kinds = BTreeSet::new();
        if let Some(body) = &self.body {
            body.visit_nodes(&mut |node| node.collect_probe_kinds(&mut kinds));
        }
        kinds
    }
}

// ============================================================================
// SEVERITY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::None,
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn from_impact(impact: f64) -> Self {
        if impact <= 0.0 {
            Severity::None
        } else if impact < 0.4 {
            Severity::Low
        } else if impact < 0.7 {
            Severity::Medium
        } else if impact < 0.9 {
            Severity::High
        } else {
            Severity::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ASSERTION TREE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combinator {
    #[default]
    All,
    OneOf,
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Combinator::All => write!(f, "all"),
            Combinator::OneOf => write!(f, "one_of"),
        }
    }
}

/// Ordered children combined by one combinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub combinator: Combinator,
    pub children: Vec<Node>,
}

impl AssertionGroup {
    pub fn all(children: Vec<Node>) -> Self {
        Self {
            description: None,
            combinator: Combinator::All,
            children,
        }
    }

    pub fn one_of(children: Vec<Node>) -> Self {
        Self {
            description: None,
            combinator: Combinator::OneOf,
            children,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn label(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| self.combinator.to_string())
    }

    fn validate(&self, path: &str, bindings: &BTreeSet<String>) -> Result<(), DefinitionError> {
        let path = join_path(path, &self.label());
        if self.children.is_empty() {
            return Err(DefinitionError::EmptyGroup { path });
        }
        for child in &self.children {
            child.validate(&path, bindings)?;
        }
        Ok(())
    }

    fn visit_nodes(&self, visit: &mut dyn FnMut(&Node)) {
        for child in &self.children {
            child.visit(visit);
        }
    }
}

/// Tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Assertion(Assertion),
    Group(AssertionGroup),
    When(ConditionalBranch),
    ForEach(ForEachBranch),
}

impl Node {
    pub fn label(&self) -> String {
        match self {
            Node::Assertion(assertion) => assertion.label(),
            Node::Group(group) => group.label(),
            Node::When(branch) => branch.label(),
            Node::ForEach(branch) => branch.label(),
        }
    }

    fn validate(&self, path: &str, bindings: &BTreeSet<String>) -> Result<(), DefinitionError> {
        match self {
            Node::Assertion(assertion) => assertion.validate(path, bindings),
            Node::Group(group) => group.validate(path, bindings),
            Node::When(branch) => {
                let path = join_path(path, &branch.label());
                branch.guard.validate(&path, bindings)?;
                branch.then.validate(&path, bindings)
            }
            Node::ForEach(branch) => {
                let path = join_path(path, &branch.label());
                if branch.bind.trim().is_empty() {
                    return Err(DefinitionError::EmptyBindingName { path });
                }
                branch.over.validate(&path, bindings)?;
                if branch.body.is_empty() {
                    return Err(DefinitionError::EmptyGroup { path });
                }
                let mut scoped = bindings.clone();
                scoped.insert(branch.bind.clone());
                for child in &branch.body {
                    child.validate(&path, &scoped)?;
                }
                Ok(())
            }
        }
    }

    fn visit(&self, visit: &mut dyn FnMut(&Node)) {
        visit(self);
        match self {
            Node::Assertion(_) => {}
            Node::Group(group) => group.visit_nodes(visit),
            Node::When(branch) => branch.then.visit(visit),
            Node::ForEach(branch) => {
                for child in &branch.body {
                    child.visit(visit);
                }
            }
        }
    }

    fn collect_attributes(&self, names: &mut BTreeSet<String>) {
        match self {
            Node::Assertion(assertion) => assertion.collect_attributes(names),
            Node::When(branch) => branch.guard.collect_attributes(names),
            Node::ForEach(branch) => branch.over.collect_attributes(names),
            Node::Group(_) => {}
        }
    }

    fn collect_probe_kinds(&self, kinds: &mut BTreeSet<String>) {
        let subject = match self {
            Node::Assertion(assertion) => &assertion.subject,
            Node::When(branch) => &branch.guard.subject,
            Node::ForEach(branch) => &branch.over,
            Node::Group(_) => return,
        };
        if let Subject::Probe { kind, .. } = subject {
            kinds.insert(kind.clone());
        }
    }
}

/// Subtree included only when the guard assertion holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalBranch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub guard: Assertion,
    pub then: Box<Node>,
}

impl ConditionalBranch {
    pub fn new(guard: Assertion, then: Node) -> Self {
        Self {
            description: None,
            guard,
            then: Box::new(then),
        }
    }

    pub fn label(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| format!("when {}", self.guard.label()))
    }
}

/// Body repeated once per element of a list-valued subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForEachBranch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub over: Subject,
    pub bind: String,
    /// How expansions combine; each expansion's body is an ALL group
    #[serde(default)]
    pub combinator: Combinator,
    pub body: Vec<Node>,
}

impl ForEachBranch {
    pub fn label(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| format!("each {}", self.bind))
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

/// Leaf check: a matcher applied to a subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub subject: Subject,
    pub matcher: Matcher,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Operand>,
}

impl Assertion {
    pub fn new(subject: Subject, matcher: Matcher) -> Self {
        Self {
            description: None,
            subject,
            matcher,
            expected: None,
        }
    }

    pub fn expecting(mut self, expected: impl Into<Operand>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn label(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| format!("{} {}", self.subject, self.matcher))
    }

    fn validate(&self, path: &str, bindings: &BTreeSet<String>) -> Result<(), DefinitionError> {
        let path = join_path(path, &self.label());
        self.subject.validate(&path, bindings)?;
        if self.matcher.requires_expected() && self.expected.is_none() {
            return Err(DefinitionError::MissingExpected {
                path,
                matcher: self.matcher.to_string(),
            });
        }
        if let Some(Operand::Binding { binding }) = &self.expected {
            if !bindings.contains(binding) {
                return Err(DefinitionError::UnknownBinding {
                    path,
                    name: binding.clone(),
                });
            }
        }
        if let (Some(case_insensitive), Some(Operand::Literal(ProbeValue::String(pattern)))) =
            (self.matcher.pattern_flag(), &self.expected)
        {
            regex::RegexBuilder::new(pattern)
                .case_insensitive(case_insensitive)
                .build()
                .map_err(|e| DefinitionError::InvalidPattern {
                    path: path.clone(),
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    fn collect_attributes(&self, names: &mut BTreeSet<String>) {
        self.subject.collect_attributes(names);
        if let Some(Operand::Attribute { attribute }) = &self.expected {
            names.insert(attribute.clone());
        }
    }
}

/// Where an assertion's subject value comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Attribute {
        name: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        select: Vec<Selector>,
    },
    Probe {
        kind: String,
        #[serde(default)]
        parameters: BTreeMap<String, Operand>,
        #[serde(default)]
        query: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        select: Vec<Selector>,
    },
    /// Current element of an enclosing `for_each`
    Binding {
        name: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        select: Vec<Selector>,
    },
}

impl Subject {
    pub fn attribute(name: impl Into<String>) -> Self {
        Subject::Attribute {
            name: name.into(),
            select: Vec::new(),
        }
    }

    pub fn probe(kind: impl Into<String>, query: impl Into<String>) -> Self {
        Subject::Probe {
            kind: kind.into(),
            parameters: BTreeMap::new(),
            query: query.into(),
            select: Vec::new(),
        }
    }

    pub fn binding(name: impl Into<String>) -> Self {
        Subject::Binding {
            name: name.into(),
            select: Vec::new(),
        }
    }

    /// Append a selector to the chain
    pub fn select(mut self, selector: Selector) -> Self {
        match &mut self {
            Subject::Attribute { select, .. }
            | Subject::Probe { select, .. }
            | Subject::Binding { select, .. } => select.push(selector),
        }
        self
    }

    /// Add a probe parameter; ignored for non-probe subjects
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Operand>) -> Self {
        if let Subject::Probe { parameters, .. } = &mut self {
            parameters.insert(key.into(), value.into());
        }
        self
    }

    pub fn selectors(&self) -> &[Selector] {
        match self {
            Subject::Attribute { select, .. }
            | Subject::Probe { select, .. }
            | Subject::Binding { select, .. } => select,
        }
    }

    fn validate(&self, path: &str, bindings: &BTreeSet<String>) -> Result<(), DefinitionError> {
        match self {
            Subject::Binding { name, .. } if !bindings.contains(name) => {
                Err(DefinitionError::UnknownBinding {
                    path: path.to_string(),
                    name: name.clone(),
                })
            }
            Subject::Probe {
                kind, parameters, ..
            } => {
                if kind.trim().is_empty() {
                    return Err(DefinitionError::EmptyProbeKind {
                        path: path.to_string(),
                    });
                }
                for operand in parameters.values() {
                    if let Operand::Binding { binding } = operand {
                        if !bindings.contains(binding) {
                            return Err(DefinitionError::UnknownBinding {
                                path: path.to_string(),
                                name: binding.clone(),
                            });
                        }
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn collect_attributes(&self, names: &mut BTreeSet<String>) {
        match self {
            Subject::Attribute { name, .. } => {
                names.insert(name.clone());
            }
            Subject::Probe { parameters, .. } => {
                for operand in parameters.values() {
                    if let Operand::Attribute { attribute } = operand {
                        names.insert(attribute.clone());
                    }
                }
            }
            Subject::Binding { .. } => {}
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Attribute { name, .. } => write!(f, "attribute '{}'", name)?,
            Subject::Probe { kind, query, .. } if query.is_empty() => write!(f, "{}", kind)?,
            Subject::Probe { kind, query, .. } => write!(f, "{}({})", kind, query.trim())?,
            Subject::Binding { name, .. } => write!(f, "${{{}}}", name)?,
        }
        for selector in self.selectors() {
            write!(f, ".{}", selector)?;
        }
        Ok(())
    }
}

/// Refinement applied to a raw subject value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    /// Table column as a list
    Column(String),
    /// Named field of a single-row table
    Field(String),
    /// Trimmed non-empty lines of a string
    Lines,
    /// First-occurrence unique elements
    Distinct,
    /// Element or row count
    Count,
    /// List rendered as one string
    Join,
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Column(name) => write!(f, "column('{}')", name),
            Selector::Field(name) => write!(f, "field('{}')", name),
            Selector::Lines => write!(f, "lines"),
            Selector::Distinct => write!(f, "distinct"),
            Selector::Count => write!(f, "count"),
            Selector::Join => write!(f, "join"),
        }
    }
}

/// Expected value or probe parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Attribute { attribute: String },
    Binding { binding: String },
    Literal(ProbeValue),
}

impl Operand {
    pub fn attribute(name: impl Into<String>) -> Self {
        Operand::Attribute {
            attribute: name.into(),
        }
    }

    pub fn binding(name: impl Into<String>) -> Self {
        Operand::Binding {
            binding: name.into(),
        }
    }
}

impl From<ProbeValue> for Operand {
    fn from(value: ProbeValue) -> Self {
        Operand::Literal(value)
    }
}

macro_rules! literal_operand {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Operand {
                fn from(value: $ty) -> Self {
                    Operand::Literal(ProbeValue::from(value))
                }
            }
        )*
    };
}

literal_operand!(&str, String, bool, i64, f64, Vec<&str>, Vec<String>);

// ============================================================================
// MATCHERS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericOp {
    Gt,
    Ge,
    Lt,
    Le,
}

impl fmt::Display for NumericOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            NumericOp::Gt => ">",
            NumericOp::Ge => ">=",
            NumericOp::Lt => "<",
            NumericOp::Le => "<=",
        };
        f.write_str(symbol)
    }
}

/// Closed matcher vocabulary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Matcher {
    Equals {
        #[serde(default)]
        case_insensitive: bool,
    },
    /// Subject is a member of the expected list
    In,
    /// Subject list contains the expected value
    Includes,
    Matches {
        #[serde(default)]
        case_insensitive: bool,
    },
    Empty,
    Compare {
        op: NumericOp,
    },
    Not {
        matcher: Box<Matcher>,
    },
}

impl Matcher {
    pub fn equals() -> Self {
        Matcher::Equals {
            case_insensitive: false,
        }
    }

    pub fn matches() -> Self {
        Matcher::Matches {
            case_insensitive: false,
        }
    }

    pub fn negate(self) -> Self {
        Matcher::Not {
            matcher: Box::new(self),
        }
    }

    pub fn requires_expected(&self) -> bool {
        match self {
            Matcher::Empty => false,
            Matcher::Not { matcher } => matcher.requires_expected(),
            _ => true,
        }
    }

    /// Case flag of a regex matcher, looking through negation
    fn pattern_flag(&self) -> Option<bool> {
        match self {
            Matcher::Matches { case_insensitive } => Some(*case_insensitive),
            Matcher::Not { matcher } => matcher.pattern_flag(),
            _ => None,
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Equals {
                case_insensitive: false,
            } => write!(f, "equals"),
            Matcher::Equals {
                case_insensitive: true,
            } => write!(f, "equals (case-insensitive)"),
            Matcher::In => write!(f, "in"),
            Matcher::Includes => write!(f, "includes"),
            Matcher::Matches {
                case_insensitive: false,
            } => write!(f, "matches"),
            Matcher::Matches {
                case_insensitive: true,
            } => write!(f, "matches (case-insensitive)"),
            Matcher::Empty => write!(f, "empty"),
            Matcher::Compare { op } => write!(f, "{}", op),
            Matcher::Not { matcher } => write!(f, "not {}", matcher),
        }
    }
}

fn join_path(parent: &str, label: &str) -> String {
    if parent.is_empty() {
        label.to_string()
    } else {
        format!("{} > {}", parent, label)
    }
}
