//! Structured observability hooks for pipeline lifecycle events.
//!
//! - contribution-scoped spans via the [`ContributionSpan`] RAII guard
//! - emitters for run start/finish and per-stage outcomes
//!
//! Filter with `CONTRIBKIT_LOG` or `RUST_LOG`; pass `--json` to the binary for JSON lines.

use tracing::{info, warn};

use crate::domain::{ContributionId, ValidationOutcome};
use crate::report::Verdict;

/// RAII guard that enters a contribution-scoped span.
pub struct ContributionSpan {
    _span: tracing::span::EnteredSpan,
}

impl ContributionSpan {
    pub fn enter(id: &ContributionId) -> Self {
        let span = tracing::info_span!("contribkit.contribution", contribution = %id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: run started.
pub fn emit_run_started(run_id: &str, contributions: usize, stages: &str) {
    info!(
        event = "run.started",
        run_id = %run_id,
        contributions = contributions,
        stages = %stages,
    );
}

/// Emit event: one stage finished for one contribution.
pub fn emit_stage_finished(id: &ContributionId, outcome: &ValidationOutcome) {
    match outcome.failure() {
        None => info!(
            event = "stage.finished",
            contribution = %id,
            stage = %outcome.stage,
            passed = true,
        ),
        Some((reason, detail)) => warn!(
            event = "stage.finished",
            contribution = %id,
            stage = %outcome.stage,
            passed = false,
            reason = %reason,
            detail = %detail,
        ),
    }
}

/// Emit event: run finished.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, verdict: Verdict, failed: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        verdict = %verdict,
        failed = failed,
    );
}

/// Emit event: launching stopped early (interrupt or fail-fast).
pub fn emit_run_cancelled(run_id: &str, remaining: usize) {
    warn!(event = "run.cancelled", run_id = %run_id, remaining = remaining);
}
