//! Plain-text rendering of reports

use super::reporter::Report;
use super::types::{ControlResult, ControlStatus};
use crate::execution::Verdict;
use crate::types::Severity;
use std::fmt::Write;

/// One line per control plus failing assertion details and totals
pub fn render_summary(report: &Report) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Profile: {}  Run: {}  Host: {}",
        report.profile, report.run_id, report.host.hostname
    );
    let _ = writeln!(out);

    for result in &report.results {
        out.push_str(&render_result(result));
    }

    if report.cancelled {
        let _ = writeln!(
            out,
            "\nRun cancelled; {} control(s) not started: {}",
            report.abandoned.len(),
            report.abandoned.join(", ")
        );
    }

    let counts = &report.summary.by_status;
    let _ = writeln!(
        out,
        "\n{} controls: {} passed, {} failed, {} skipped, {} error",
        report.summary.total, counts.passed, counts.failed, counts.skipped, counts.error
    );

    let severities: Vec<String> = Severity::ALL
        .iter()
        .rev()
        .filter_map(|severity| {
            let count = report.summary.failed_by_severity.get(*severity);
            (count > 0).then(|| format!("{} {}", count, severity))
        })
        .collect();
    if !severities.is_empty() {
        let _ = writeln!(out, "Failed by severity: {}", severities.join(", "));
    }
    out
}

pub fn render_result(result: &ControlResult) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "[{:<7}] {} ({})",
        result.status(),
        result.control_id(),
        result.severity()
    );
    if let Some(title) = result.title() {
        let _ = write!(out, " {}", title);
    }
    let _ = writeln!(out);

    match result.status() {
        ControlStatus::Skipped => {
            if let Some(reason) = result.skip_reason() {
                let _ = writeln!(out, "    skipped: {}", first_line(reason));
            }
        }
        ControlStatus::Error if result.details().is_empty() => {
            if let Some(error) = result.error() {
                let _ = writeln!(out, "    {}: {}", error.kind, error.message);
            }
        }
        ControlStatus::Passed => {}
        _ => {
            for detail in result.details() {
                match detail.verdict {
                    Verdict::Passed => {}
                    Verdict::Failed => {
                        let _ = writeln!(
                            out,
                            "    FAIL {}: expected {} {}, got {}",
                            detail.path, detail.matcher, detail.expected, detail.actual
                        );
                    }
                    Verdict::Error => {
                        let _ = writeln!(
                            out,
                            "    ERROR {}: {}",
                            detail.path,
                            detail.message.as_deref().unwrap_or("unknown error")
                        );
                    }
                }
            }
        }
    }
    out
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default().trim()
}
