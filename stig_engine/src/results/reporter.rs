//! # Reporter
//!
//! Collects control results in execution order and produces the final
//! [`Report`] with summary counts and run metadata. A saved report can be
//! read back and re-rendered without re-running probes.

use super::error::ReportError;
use super::types::{ControlResult, ControlStatus, HostContext};
use crate::types::Severity;
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Counts per control status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub error: usize,
}

impl StatusCounts {
    pub fn add(&mut self, status: ControlStatus) {
        match status {
            ControlStatus::Passed => self.passed += 1,
            ControlStatus::Failed => self.failed += 1,
            ControlStatus::Skipped => self.skipped += 1,
            ControlStatus::Error => self.error += 1,
        }
    }

    pub fn get(&self, status: ControlStatus) -> usize {
        match status {
            ControlStatus::Passed => self.passed,
            ControlStatus::Failed => self.failed,
            ControlStatus::Skipped => self.skipped,
            ControlStatus::Error => self.error,
        }
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped + self.error
    }
}

/// Counts per severity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub none: usize,
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
}

impl SeverityCounts {
    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::None => self.none += 1,
            Severity::Low => self.low += 1,
            Severity::Medium => self.medium += 1,
            Severity::High => self.high += 1,
            Severity::Critical => self.critical += 1,
        }
    }

    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::None => self.none,
            Severity::Low => self.low,
            Severity::Medium => self.medium,
            Severity::High => self.high,
            Severity::Critical => self.critical,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub by_status: StatusCounts,
    pub by_severity: SeverityCounts,
    /// Severity counts of FAILED controls only
    pub failed_by_severity: SeverityCounts,
}

impl Summary {
    pub fn from_results(results: &[ControlResult]) -> Self {
        let mut summary = Summary::default();
        for result in results {
            summary.total += 1;
            summary.by_status.add(result.status());
            summary.by_severity.add(result.severity());
            if result.status() == ControlStatus::Failed {
                summary.failed_by_severity.add(result.severity());
            }
        }
        summary
    }

    /// No FAILED and no ERROR results
    pub fn is_clean(&self) -> bool {
        self.by_status.failed == 0 && self.by_status.error == 0
    }
}

/// Complete run report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub run_id: String,
    pub profile: String,
    pub host: HostContext,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(default)]
    pub cancelled: bool,
    /// Controls never started because the run was cancelled
    #[serde(default)]
    pub abandoned: Vec<String>,
    pub results: Vec<ControlResult>,
    pub summary: Summary,
}

impl Report {
    pub fn to_json(&self) -> Result<String, ReportError> {
        serde_json::to_string_pretty(self).map_err(ReportError::Serialize)
    }

    pub fn from_json(json: &str) -> Result<Self, ReportError> {
        serde_json::from_str(json).map_err(|source| ReportError::Parse {
            path: "<memory>".to_string(),
            source,
        })
    }

    pub fn write(&self, path: &Path) -> Result<(), ReportError> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|source| ReportError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn read(path: &Path) -> Result<Self, ReportError> {
        let content = std::fs::read_to_string(path).map_err(|source| ReportError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ReportError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn result(&self, control_id: &str) -> Option<&ControlResult> {
        self.results.iter().find(|r| r.control_id() == control_id)
    }

    pub fn results_with_status(&self, status: ControlStatus) -> Vec<&ControlResult> {
        self.results.iter().filter(|r| r.status() == status).collect()
    }

    pub fn duration_seconds(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Accumulates results of one run
#[derive(Debug)]
pub struct Reporter {
    run_id: Uuid,
    profile: String,
    host: HostContext,
    started_at: DateTime<Utc>,
    results: Vec<ControlResult>,
    abandoned: Vec<String>,
    cancelled: bool,
}

impl Reporter {
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            profile: profile.into(),
            host: HostContext::from_system(),
            started_at: Utc::now(),
            results: Vec::new(),
            abandoned: Vec::new(),
            cancelled: false,
        }
    }

    pub fn with_host(mut self, host: HostContext) -> Self {
        self.host = host;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Append a result in execution order
    pub fn record(&mut self, result: ControlResult) {
        self.results.push(result);
    }

    pub fn mark_abandoned(&mut self, control_ids: impl IntoIterator<Item = String>) {
        self.cancelled = true;
        self.abandoned.extend(control_ids);
    }

    pub fn results(&self) -> &[ControlResult] {
        &self.results
    }

    pub fn counts_by_status(&self) -> StatusCounts {
        Summary::from_results(&self.results).by_status
    }

    pub fn counts_by_severity(&self) -> SeverityCounts {
        Summary::from_results(&self.results).by_severity
    }

    pub fn finish(self) -> Report {
        let summary = Summary::from_results(&self.results);
        info!(
            "Run {} finished: {} controls, {} passed, {} failed, {} skipped, {} error",
            self.run_id,
            summary.total,
            summary.by_status.passed,
            summary.by_status.failed,
            summary.by_status.skipped,
            summary.by_status.error
        );
        Report {
            run_id: self.run_id.to_string(),
            profile: self.profile,
            host: self.host,
            started_at: self.started_at,
            finished_at: Utc::now(),
            cancelled: self.cancelled,
            abandoned: self.abandoned,
            results: self.results,
            summary,
        }
    }
}
