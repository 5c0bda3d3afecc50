//! Report rendering: human-readable text and the JSON artifact.

use std::fmt::Write as _;
use std::path::Path;

use crate::domain::OutcomeStatus;
use crate::error::Result;
use crate::report::BuildReport;

/// Render a report for terminals and CI logs.
///
/// Every contribution gets one status line; failures are listed beneath it,
/// one per stage, with reason and detail.
pub fn render_text(report: &BuildReport) -> String {
    let mut out = String::new();
    let stages: Vec<&str> = report.stages.iter().map(|s| s.name()).collect();
    let _ = writeln!(out, "contribkit run {}", report.run_id);
    let _ = writeln!(out, "stages: {}", stages.join(" -> "));
    out.push('\n');

    let width = report
        .contributions
        .iter()
        .map(|c| c.id.as_str().len())
        .max()
        .unwrap_or(0);

    for contribution in &report.contributions {
        let status = if !contribution.started {
            "SKIP"
        } else if contribution.has_failure() {
            "FAIL"
        } else {
            "PASS"
        };

        let marks: Vec<String> = contribution
            .outcomes
            .iter()
            .map(|o| format!("{} {}", o.stage, if o.is_pass() { "✓" } else { "✗" }))
            .collect();
        let trail = if contribution.started {
            marks.join("  ")
        } else {
            "not started".to_string()
        };
        let _ = writeln!(
            out,
            "{status}  {:<width$}  {trail}",
            contribution.id.as_str()
        );

        for outcome in &contribution.outcomes {
            if let OutcomeStatus::Fail { reason, detail } = &outcome.status {
                let _ = writeln!(out, "      [{}] {reason}", outcome.stage);
                for line in detail.lines() {
                    let _ = writeln!(out, "        {line}");
                }
            }
        }
    }

    out.push('\n');
    let _ = writeln!(
        out,
        "Summary: {} contribution(s), {} passed, {} failed, {} not started",
        report.contributions.len(),
        report.passed_count(),
        report.failed_count(),
        report.not_started_count()
    );
    let _ = writeln!(out, "Verdict: {}", report.verdict);
    out
}

/// Write the machine-readable report as pretty JSON.
pub fn write_report_json(report: &BuildReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_vec_pretty(report)?)?;
    Ok(())
}
