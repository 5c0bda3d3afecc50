//! Per-run report aggregation and the overall verdict.
//!
//! The aggregator is created with the in-scope contributions up front and only
//! ever appends to a contribution's outcome history. It is the sole writer of
//! the verdict.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{ContributionId, Stage, ValidationOutcome};
use crate::error::{PipelineError, Result};

/// Exit code for a passing run.
pub const EXIT_PASS: u8 = 0;
/// Exit code for fatal pipeline errors (bad arguments, missing root, ...).
pub const EXIT_PIPELINE_ERROR: u8 = 1;
/// Earliest failure was structural.
pub const EXIT_STRUCTURAL_FAILURE: u8 = 10;
/// Earliest failure was a build.
pub const EXIT_BUILD_FAILURE: u8 = 20;
/// Earliest failure was functional.
pub const EXIT_FUNCTIONAL_FAILURE: u8 = 30;
/// No failures, but the run was interrupted before every contribution started.
pub const EXIT_INTERRUPTED: u8 = 40;

/// Overall pass/fail verdict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Pass => f.write_str("PASS"),
            Verdict::Fail => f.write_str("FAIL"),
        }
    }
}

/// Outcome history of one in-scope contribution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContributionReport {
    pub id: ContributionId,

    /// Whether the pipeline was launched for this contribution.
    pub started: bool,

    /// Outcomes in the order the stages ran.
    pub outcomes: Vec<ValidationOutcome>,
}

impl ContributionReport {
    fn pending(id: ContributionId) -> Self {
        Self {
            id,
            started: false,
            outcomes: Vec::new(),
        }
    }

    pub fn has_failure(&self) -> bool {
        self.outcomes.iter().any(ValidationOutcome::is_fail)
    }

    /// Earliest failing outcome, if any.
    pub fn first_failure(&self) -> Option<&ValidationOutcome> {
        self.outcomes.iter().find(|o| o.is_fail())
    }

    pub fn outcome_for(&self, stage: Stage) -> Option<&ValidationOutcome> {
        self.outcomes.iter().find(|o| o.stage == stage)
    }

    /// Started, no failures.
    pub fn passed(&self) -> bool {
        self.started && !self.has_failure()
    }
}

/// Aggregate result of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// Stages the caller requested, in execution order.
    pub stages: Vec<Stage>,

    /// In-scope contributions in registry order.
    pub contributions: Vec<ContributionReport>,

    pub verdict: Verdict,
}

impl BuildReport {
    pub fn contribution(&self, id: &ContributionId) -> Option<&ContributionReport> {
        self.contributions.iter().find(|c| &c.id == id)
    }

    pub fn passed_count(&self) -> usize {
        self.contributions.iter().filter(|c| c.passed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.contributions.iter().filter(|c| c.has_failure()).count()
    }

    pub fn not_started_count(&self) -> usize {
        self.contributions.iter().filter(|c| !c.started).count()
    }

    /// Whether some in-scope contribution was never launched.
    pub fn interrupted(&self) -> bool {
        self.not_started_count() > 0
    }

    /// Process exit code: 0 on pass, otherwise the range of the earliest
    /// failing stage across all contributions.
    pub fn exit_code(&self) -> u8 {
        let earliest = self
            .contributions
            .iter()
            .filter_map(|c| c.first_failure())
            .map(|o| o.stage)
            .min();

        match earliest {
            Some(Stage::StructuralPre) => EXIT_STRUCTURAL_FAILURE,
            Some(Stage::Build) => EXIT_BUILD_FAILURE,
            Some(Stage::FunctionalPost) => EXIT_FUNCTIONAL_FAILURE,
            None if self.interrupted() => EXIT_INTERRUPTED,
            None => EXIT_PASS,
        }
    }
}

/// Recompute the verdict from contribution histories.
///
/// Fails iff some contribution has a failing outcome, or some in-scope
/// contribution never started.
pub fn verdict(contributions: &[ContributionReport]) -> Verdict {
    if contributions
        .iter()
        .any(|c| c.has_failure() || !c.started)
    {
        Verdict::Fail
    } else {
        Verdict::Pass
    }
}

/// Append-only collector of per-contribution outcomes.
#[derive(Debug)]
pub struct ReportAggregator {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    stages: Vec<Stage>,
    entries: Vec<ContributionReport>,
    index: HashMap<ContributionId, usize>,
}

impl ReportAggregator {
    /// Start a report covering `scope`, in the given order.
    pub fn new(scope: impl IntoIterator<Item = ContributionId>, stages: Vec<Stage>) -> Self {
        let entries: Vec<ContributionReport> =
            scope.into_iter().map(ContributionReport::pending).collect();
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            stages,
            entries,
            index,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn entry_mut(&mut self, id: &ContributionId) -> Result<&mut ContributionReport> {
        let i = *self
            .index
            .get(id)
            .ok_or_else(|| PipelineError::NotFound(format!("{id} is not in scope for this run")))?;
        Ok(&mut self.entries[i])
    }

    /// Mark a contribution as launched.
    pub fn mark_started(&mut self, id: &ContributionId) -> Result<()> {
        self.entry_mut(id)?.started = true;
        Ok(())
    }

    /// Append one outcome to a contribution's history.
    pub fn append(&mut self, id: &ContributionId, outcome: ValidationOutcome) -> Result<()> {
        let entry = self.entry_mut(id)?;
        entry.started = true;
        entry.outcomes.push(outcome);
        Ok(())
    }

    /// Append a finished worker's outcomes, preserving their order.
    pub fn merge(&mut self, id: &ContributionId, outcomes: Vec<ValidationOutcome>) -> Result<()> {
        let entry = self.entry_mut(id)?;
        entry.started = true;
        entry.outcomes.extend(outcomes);
        Ok(())
    }

    /// Freeze the report and compute the verdict.
    pub fn finalize(self) -> BuildReport {
        let verdict = verdict(&self.entries);
        BuildReport {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            stages: self.stages,
            contributions: self.entries,
            verdict,
        }
    }
}

/// Build a finalized report from `(id, outcome)` pairs over `scope`.
///
/// Every id in `scope` is treated as started; outcomes for ids outside
/// `scope` are rejected.
pub fn aggregate<I>(scope: &[ContributionId], stages: Vec<Stage>, outcomes: I) -> Result<BuildReport>
where
    I: IntoIterator<Item = (ContributionId, ValidationOutcome)>,
{
    let mut aggregator = ReportAggregator::new(scope.iter().cloned(), stages);
    for id in scope {
        aggregator.mark_started(id)?;
    }
    for (id, outcome) in outcomes {
        aggregator.append(&id, outcome)?;
    }
    Ok(aggregator.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FailReason;

    fn id(s: &str) -> ContributionId {
        ContributionId::new(s)
    }

    #[test]
    fn test_empty_scope_passes() {
        let report = aggregate(&[], vec![Stage::StructuralPre], Vec::new()).unwrap();
        assert_eq!(report.verdict, Verdict::Pass);
        assert_eq!(report.exit_code(), EXIT_PASS);
    }

    #[test]
    fn test_append_preserves_history() {
        let mut agg = ReportAggregator::new([id("alpha")], vec![Stage::StructuralPre, Stage::Build]);
        agg.append(&id("alpha"), ValidationOutcome::pass(Stage::StructuralPre))
            .unwrap();
        agg.append(
            &id("alpha"),
            ValidationOutcome::fail(Stage::Build, FailReason::ToolchainTimeout, "1800s"),
        )
        .unwrap();

        let report = agg.finalize();
        let alpha = report.contribution(&id("alpha")).unwrap();
        assert_eq!(alpha.outcomes.len(), 2);
        assert!(alpha.outcomes[0].is_pass());
        assert_eq!(alpha.first_failure().unwrap().stage, Stage::Build);
        assert_eq!(report.exit_code(), EXIT_BUILD_FAILURE);
    }

    #[test]
    fn test_out_of_scope_append_rejected() {
        let mut agg = ReportAggregator::new([id("alpha")], vec![Stage::Build]);
        let err = agg
            .append(&id("zeta"), ValidationOutcome::pass(Stage::Build))
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[test]
    fn test_not_started_fails_verdict() {
        let mut agg = ReportAggregator::new([id("alpha"), id("beta")], vec![Stage::StructuralPre]);
        agg.merge(&id("alpha"), vec![ValidationOutcome::pass(Stage::StructuralPre)])
            .unwrap();
        let report = agg.finalize();

        assert_eq!(report.verdict, Verdict::Fail);
        assert!(report.interrupted());
        assert_eq!(report.not_started_count(), 1);
        assert_eq!(report.exit_code(), EXIT_INTERRUPTED);
    }

    #[test]
    fn test_exit_code_uses_earliest_stage() {
        let report = aggregate(
            &[id("alpha"), id("beta")],
            vec![Stage::StructuralPre, Stage::Build, Stage::FunctionalPost],
            vec![
                (
                    id("alpha"),
                    ValidationOutcome::fail(
                        Stage::FunctionalPost,
                        FailReason::ShapeMismatch,
                        "ndim",
                    ),
                ),
                (
                    id("beta"),
                    ValidationOutcome::fail(
                        Stage::StructuralPre,
                        FailReason::MissingFile,
                        "README.md",
                    ),
                ),
            ],
        )
        .unwrap();
        assert_eq!(report.exit_code(), EXIT_STRUCTURAL_FAILURE);
        assert_eq!(report.failed_count(), 2);
    }
}
