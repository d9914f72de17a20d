//! # Control Result Types
//!
//! Per-control outcomes. A [`ControlResult`] is produced once by
//! [`ControlResultBuilder`] and exposes only read accessors
//! afterwards. Results carry no timestamps, so evaluating an unchanged
//! target twice yields equal results.

use crate::execution::Verdict;
use crate::types::{Control, ErrorKind, ProbeValue, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlStatus {
    Passed,
    Failed,
    Skipped,
    Error,
}

impl ControlStatus {
    pub const ALL: [ControlStatus; 4] = [
        ControlStatus::Passed,
        ControlStatus::Failed,
        ControlStatus::Skipped,
        ControlStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlStatus::Passed => "PASSED",
            ControlStatus::Failed => "FAILED",
            ControlStatus::Skipped => "SKIPPED",
            ControlStatus::Error => "ERROR",
        }
    }
}

impl From<Verdict> for ControlStatus {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Passed => ControlStatus::Passed,
            Verdict::Failed => ControlStatus::Failed,
            Verdict::Error => ControlStatus::Error,
        }
    }
}

impl fmt::Display for ControlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Outcome of one evaluated assertion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionDetail {
    /// Position in the tree, labels joined with " > "
    pub path: String,
    pub description: String,
    pub verdict: Verdict,
    pub subject: String,
    pub matcher: String,
    #[serde(default)]
    pub expected: ProbeValue,
    #[serde(default)]
    pub actual: ProbeValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

/// Why a control ended in ERROR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Finalized outcome of one control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResult {
    control_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    severity: Severity,
    impact: f64,
    status: ControlStatus,
    #[serde(default)]
    details: Vec<AssertionDetail>,
    #[serde(default)]
    tags: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    skip_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<ControlError>,
    #[serde(default)]
    probe_calls: usize,
}

impl ControlResult {
    pub fn control_id(&self) -> &str {
        &self.control_id
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn impact(&self) -> f64 {
        self.impact
    }

    pub fn status(&self) -> ControlStatus {
        self.status
    }

    pub fn details(&self) -> &[AssertionDetail] {
        &self.details
    }

    pub fn tags(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.tags
    }

    pub fn skip_reason(&self) -> Option<&str> {
        self.skip_reason.as_deref()
    }

    pub fn error(&self) -> Option<&ControlError> {
        self.error.as_ref()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Provider fetches performed while evaluating this control
    pub fn probe_calls(&self) -> usize {
        self.probe_calls
    }

    pub fn is_compliant(&self) -> bool {
        matches!(self.status, ControlStatus::Passed | ControlStatus::Skipped)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Assembles a [`ControlResult`]
#[derive(Debug, Clone)]
pub struct ControlResultBuilder {
    control_id: String,
    title: Option<String>,
    severity: Severity,
    impact: f64,
    tags: BTreeMap<String, serde_json::Value>,
    details: Vec<AssertionDetail>,
    probe_calls: usize,
}

impl ControlResultBuilder {
    pub fn for_control(control: &Control) -> Self {
        Self {
            control_id: control.id.clone(),
            title: control.title.clone(),
            severity: control.severity(),
            impact: control.impact,
            tags: control.tags.clone(),
            details: Vec::new(),
            probe_calls: 0,
        }
    }

    pub fn with_details(mut self, details: Vec<AssertionDetail>) -> Self {
        self.details = details;
        self
    }

    pub fn with_probe_calls(mut self, probe_calls: usize) -> Self {
        self.probe_calls = probe_calls;
        self
    }

    pub fn passed(self) -> ControlResult {
        self.finish(ControlStatus::Passed, None, None)
    }

    pub fn failed(self) -> ControlResult {
        self.finish(ControlStatus::Failed, None, None)
    }

    pub fn skipped(self, reason: impl Into<String>) -> ControlResult {
        self.finish(ControlStatus::Skipped, Some(reason.into()), None)
    }

    pub fn error(self, kind: ErrorKind, message: impl Into<String>) -> ControlResult {
        let error = ControlError {
            kind,
            message: message.into(),
        };
        self.finish(ControlStatus::Error, None, Some(error))
    }

    fn finish(
        self,
        status: ControlStatus,
        skip_reason: Option<String>,
        error: Option<ControlError>,
    ) -> ControlResult {
        ControlResult {
            control_id: self.control_id,
            title: self.title,
            severity: self.severity,
            impact: self.impact,
            status,
            details: self.details,
            tags: self.tags,
            skip_reason,
            error,
            probe_calls: self.probe_calls,
        }
    }
}

/// Host the scan ran on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostContext {
    pub hostname: String,
    pub os_info: String,
}

impl HostContext {
    pub fn from_system() -> Self {
        Self {
            hostname: hostname::get()
                .unwrap_or_else(|_| std::ffi::OsString::from("unknown"))
                .to_string_lossy()
                .to_string(),
            os_info: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
        }
    }

    pub fn new(hostname: impl Into<String>, os_info: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            os_info: os_info.into(),
        }
    }
}
