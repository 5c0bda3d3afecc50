//! Pipeline orchestration over a bounded worker pool.
//!
//! Each in-scope contribution runs its selected stages in order on one
//! worker, stopping at the first failing stage. Workers run concurrently up to
//! `jobs`; the report lists contributions in registry order regardless of
//! completion order. Every stage runs in its own task, so a panic inside a
//! stage becomes that stage's failure and never takes down the batch.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{info, info_span, warn, Instrument};

use contribkit_core::{
    emit_run_cancelled, emit_run_finished, emit_run_started, emit_stage_finished, BuildReport,
    ContributionDescriptor, ContributionFilter, ContributionRegistry, ContributionSpan,
    FailReason, OrchestratorConfig, ReportAggregator, Result, Stage, StructuralValidator,
    ValidationOutcome,
};

use crate::build::BuildDriver;
use crate::cancel::CancelFlag;
use crate::functional::FunctionalValidator;
use crate::runtime::{panic_message, ContributionLoader};

/// Which stages a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSelection {
    pub pre: bool,
    pub build: bool,
    pub post: bool,
}

impl StageSelection {
    pub const PRE_ONLY: Self = Self {
        pre: true,
        build: false,
        post: false,
    };
    pub const POST_ONLY: Self = Self {
        pre: false,
        build: false,
        post: true,
    };
    /// Structural checks then build.
    pub const BUILD: Self = Self {
        pre: true,
        build: true,
        post: false,
    };
    pub const FULL: Self = Self {
        pre: true,
        build: true,
        post: true,
    };

    /// Selected stages in execution order.
    pub fn stages(&self) -> Vec<Stage> {
        [
            (self.pre, Stage::StructuralPre),
            (self.build, Stage::Build),
            (self.post, Stage::FunctionalPost),
        ]
        .into_iter()
        .filter_map(|(on, stage)| on.then_some(stage))
        .collect()
    }
}

impl std::fmt::Display for StageSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.stages().iter().map(Stage::name).collect();
        f.write_str(&names.join(","))
    }
}

#[derive(Debug)]
struct Stages {
    structural: StructuralValidator,
    builder: BuildDriver,
    functional: FunctionalValidator,
}

/// Runs selected stages for many contributions.
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Arc<Stages>,
    jobs: usize,
    fail_fast: bool,
    cancel: CancelFlag,
}

impl Pipeline {
    pub fn new(config: &OrchestratorConfig, loader: Arc<dyn ContributionLoader>) -> Self {
        let builder = BuildDriver::new(&config.toolchain);
        let functional =
            FunctionalValidator::new(builder.layout().clone(), loader, &config.runner);
        Self {
            stages: Arc::new(Stages {
                structural: StructuralValidator::new(config.layout.clone()),
                builder,
                functional,
            }),
            jobs: config.effective_jobs().max(1),
            fail_fast: config.fail_fast,
            cancel: CancelFlag::new(),
        }
    }

    /// Share an externally owned cancellation flag (e.g. a Ctrl-C handler).
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Discover contributions with `filter`, then run them.
    pub async fn run_filtered(
        &self,
        registry: &ContributionRegistry,
        filter: &ContributionFilter,
        selection: StageSelection,
    ) -> Result<BuildReport> {
        let descriptors = registry.discover(filter)?;
        Ok(self.run(descriptors, selection).await)
    }

    /// Run `selection` for every descriptor and aggregate the outcomes.
    pub async fn run(
        &self,
        descriptors: Vec<ContributionDescriptor>,
        selection: StageSelection,
    ) -> BuildReport {
        let start = Instant::now();
        let total = descriptors.len();
        let mut aggregator = ReportAggregator::new(
            descriptors.iter().map(|d| d.id.clone()),
            selection.stages(),
        );
        let run_id = aggregator.run_id().to_string();
        emit_run_started(&run_id, total, &selection.to_string());

        let semaphore = Arc::new(Semaphore::new(self.jobs));
        let mut handles = Vec::with_capacity(total);

        for descriptor in descriptors {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            if self.cancel.is_cancelled() {
                break;
            }

            let id = descriptor.id.clone();
            if let Err(e) = aggregator.mark_started(&id) {
                warn!(contribution = %id, error = %e, "Failed to mark contribution started");
            }

            let worker = Worker {
                stages: Arc::clone(&self.stages),
                selection,
                fail_fast: self.fail_fast,
                cancel: self.cancel.clone(),
            };
            let handle = tokio::spawn(async move {
                let _permit = permit;
                worker.run(descriptor).await
            });
            handles.push((id, handle));
        }

        if handles.len() < total {
            emit_run_cancelled(&run_id, total - handles.len());
        }

        for (id, handle) in handles {
            let outcomes = match handle.await {
                Ok(outcomes) => outcomes,
                Err(e) => selection
                    .stages()
                    .first()
                    .map(|stage| vec![stage_panicked(*stage, e)])
                    .unwrap_or_default(),
            };
            if let Err(e) = aggregator.merge(&id, outcomes) {
                warn!(contribution = %id, error = %e, "Dropped outcomes");
            }
        }

        let report = aggregator.finalize();
        emit_run_finished(
            &run_id,
            start.elapsed().as_millis() as u64,
            report.verdict,
            report.failed_count(),
        );
        report
    }
}

/// One contribution's stage sequence.
struct Worker {
    stages: Arc<Stages>,
    selection: StageSelection,
    fail_fast: bool,
    cancel: CancelFlag,
}

impl Worker {
    async fn run(self, descriptor: ContributionDescriptor) -> Vec<ValidationOutcome> {
        let descriptor = Arc::new(descriptor);
        let mut outcomes = Vec::new();

        for stage in self.selection.stages() {
            let outcome = self.run_stage(stage, Arc::clone(&descriptor)).await;
            emit_stage_finished(&descriptor.id, &outcome);

            let failed = outcome.is_fail();
            outcomes.push(outcome);
            if failed {
                if self.fail_fast {
                    info!(contribution = %descriptor.id, "Fail-fast: no new contributions will start");
                    self.cancel.cancel();
                }
                break;
            }
        }
        outcomes
    }

    async fn run_stage(
        &self,
        stage: Stage,
        descriptor: Arc<ContributionDescriptor>,
    ) -> ValidationOutcome {
        let stages = Arc::clone(&self.stages);
        let span = info_span!("contribkit.stage", contribution = %descriptor.id, stage = %stage);

        let joined = match stage {
            Stage::StructuralPre => {
                tokio::task::spawn_blocking(move || {
                    let _span = ContributionSpan::enter(&descriptor.id);
                    stages.structural.validate_pre(&descriptor)
                })
                .await
            }
            Stage::Build => {
                tokio::spawn(async move { stages.builder.build(&descriptor).await }.instrument(span))
                    .await
            }
            Stage::FunctionalPost => {
                tokio::spawn(
                    async move { stages.functional.validate_post(&descriptor).await }
                        .instrument(span),
                )
                .await
            }
        };
        joined.unwrap_or_else(|e| stage_panicked(stage, e))
    }
}

/// Outcome recorded when a stage task died instead of returning.
fn stage_panicked(stage: Stage, err: JoinError) -> ValidationOutcome {
    let reason = match stage {
        Stage::StructuralPre => FailReason::InvalidMetadata,
        Stage::Build => FailReason::ToolchainInvocationFailed,
        Stage::FunctionalPost => FailReason::InvocationRaised,
    };
    let detail = if err.is_panic() {
        format!(
            "{stage} stage panicked: {}",
            panic_message(err.into_panic().as_ref())
        )
    } else {
        format!("{stage} stage was aborted")
    };
    ValidationOutcome::fail(stage, reason, detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_selection() {
        assert_eq!(StageSelection::PRE_ONLY.stages(), [Stage::StructuralPre]);
        assert_eq!(StageSelection::POST_ONLY.stages(), [Stage::FunctionalPost]);
        assert_eq!(
            StageSelection::FULL.stages(),
            [Stage::StructuralPre, Stage::Build, Stage::FunctionalPost]
        );
        assert_eq!(
            StageSelection::BUILD.to_string(),
            "structural-pre,build"
        );
    }

    #[tokio::test]
    async fn test_join_panic_maps_to_stage_failure() {
        let err = tokio::spawn(async { panic!("worker blew up") })
            .await
            .unwrap_err();
        let outcome = stage_panicked(Stage::Build, err);
        let (reason, detail) = outcome.failure().unwrap();
        assert_eq!(reason, FailReason::ToolchainInvocationFailed);
        assert!(detail.contains("worker blew up"));
    }
}
