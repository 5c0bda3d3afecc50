//! Integration tests for the contribution pipeline with in-process runtimes.

use std::path::Path;
use std::sync::Arc;

use contribkit_ci::{
    CancelFlag, ExampleValue, Pipeline, RegistryLoader, StageSelection, StaticRuntime,
};
use contribkit_core::fixtures::ContributionFixture;
use contribkit_core::report::{
    EXIT_BUILD_FAILURE, EXIT_FUNCTIONAL_FAILURE, EXIT_INTERRUPTED, EXIT_PASS,
    EXIT_STRUCTURAL_FAILURE,
};
use contribkit_core::{
    BuildReport, ContributionFilter, ContributionRegistry, FailReason, OrchestratorConfig, Stage,
    Verdict,
};

struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    fn new(fixtures: &[ContributionFixture]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        for fixture in fixtures {
            fixture.write(&dir.path().join("contrib")).unwrap();
        }
        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn registry(&self) -> ContributionRegistry {
        ContributionRegistry::new(self.path().join("contrib"), Default::default())
    }

    fn config(&self, toolchain_script: &str) -> OrchestratorConfig {
        let mut config = OrchestratorConfig::default();
        config.toolchain.build_root = self.path().join("build");
        config.toolchain.command = vec![
            "sh".to_string(),
            "-c".to_string(),
            toolchain_script.to_string(),
        ];
        config.toolchain.timeout_secs = 10;
        config.runner.timeout_secs = 10;
        config.jobs = 2;
        config
    }

    async fn run(
        &self,
        pipeline: &Pipeline,
        filter: ContributionFilter,
        selection: StageSelection,
    ) -> BuildReport {
        pipeline
            .run_filtered(&self.registry(), &filter, selection)
            .await
            .expect("pipeline failed")
    }
}

fn vector() -> ExampleValue {
    ExampleValue::new(vec![3], "float64")
}

fn loader_for(names: &[&str]) -> RegistryLoader {
    let mut loader = RegistryLoader::new();
    for name in names {
        loader.register_static(*name, StaticRuntime::new().returning("basic", vector()));
    }
    loader
}

fn stages_of(report: &BuildReport, id: &str) -> Vec<Stage> {
    report
        .contribution(&id.into())
        .unwrap()
        .outcomes
        .iter()
        .map(|o| o.stage)
        .collect()
}

/// Test: every well-formed contribution passes all three stages.
#[tokio::test]
async fn test_full_pipeline_passes() {
    let ws = Workspace::new(&[
        ContributionFixture::new("alpha"),
        ContributionFixture::new("beta").native(),
        ContributionFixture::new("gamma"),
    ]);
    let pipeline = Pipeline::new(
        &ws.config("touch {install_dir}/_{name}.so"),
        Arc::new(loader_for(&["alpha", "beta", "gamma"])),
    );

    let report = ws.run(&pipeline, ContributionFilter::All, StageSelection::FULL).await;

    assert_eq!(report.verdict, Verdict::Pass, "{report:#?}");
    assert_eq!(report.exit_code(), EXIT_PASS);
    assert_eq!(report.passed_count(), 3);
    assert_eq!(
        stages_of(&report, "beta"),
        [Stage::StructuralPre, Stage::Build, Stage::FunctionalPost]
    );
    assert!(ws.path().join("build/beta/install/_beta.so").is_file());
}

/// Test: a defect in one contribution leaves the others untouched.
#[tokio::test]
async fn test_failures_are_isolated() {
    let ws = Workspace::new(&[
        ContributionFixture::new("alpha"),
        ContributionFixture::new("beta").without("README.md"),
        ContributionFixture::new("gamma"),
    ]);
    let pipeline = Pipeline::new(
        &ws.config("true"),
        Arc::new(loader_for(&["alpha", "beta", "gamma"])),
    );

    let report = ws.run(&pipeline, ContributionFilter::All, StageSelection::FULL).await;

    assert_eq!(report.verdict, Verdict::Fail);
    assert_eq!(report.exit_code(), EXIT_STRUCTURAL_FAILURE);
    assert_eq!(stages_of(&report, "beta"), [Stage::StructuralPre]);
    assert!(report.contribution(&"alpha".into()).unwrap().passed());
    assert!(report.contribution(&"gamma".into()).unwrap().passed());
}

/// Test: sequential and concurrent runs produce identical contribution entries.
#[tokio::test]
async fn test_report_is_deterministic_across_job_counts() {
    let ws = Workspace::new(&[
        ContributionFixture::new("alpha"),
        ContributionFixture::new("beta").native(),
        ContributionFixture::new("delta").without("data/basic.txt"),
        ContributionFixture::new("gamma"),
        ContributionFixture::new("omega").native(),
    ]);
    let config = ws.config("case {name} in omega) exit 1;; *) true;; esac");
    let loader = Arc::new(loader_for(&["alpha", "beta", "delta", "gamma", "omega"]));

    let sequential = Pipeline::new(&config, loader.clone()).with_jobs(1);
    let concurrent = Pipeline::new(&config, loader).with_jobs(4);

    let first = ws.run(&sequential, ContributionFilter::All, StageSelection::FULL).await;
    let second = ws.run(&concurrent, ContributionFilter::All, StageSelection::FULL).await;

    assert_eq!(first.contributions, second.contributions);
    assert_eq!(first.verdict, second.verdict);
    let order: Vec<&str> = second.contributions.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(order, ["alpha", "beta", "delta", "gamma", "omega"]);
}

/// Test: pre-only runs never build; post-only runs without a build fail the
/// precondition instead of a functional check.
#[tokio::test]
async fn test_stage_gating() {
    let ws = Workspace::new(&[ContributionFixture::new("alpha").native()]);
    let marker = ws.path().join("toolchain-ran");
    let pipeline = Pipeline::new(
        &ws.config(&format!("touch {}", marker.display())),
        Arc::new(loader_for(&["alpha"])),
    );

    let pre = ws.run(&pipeline, ContributionFilter::All, StageSelection::PRE_ONLY).await;
    assert_eq!(pre.verdict, Verdict::Pass);
    assert_eq!(stages_of(&pre, "alpha"), [Stage::StructuralPre]);
    assert!(!marker.exists());

    let post = ws.run(&pipeline, ContributionFilter::All, StageSelection::POST_ONLY).await;
    let outcome = &post.contribution(&"alpha".into()).unwrap().outcomes[0];
    assert_eq!(outcome.failure().unwrap().0, FailReason::PreconditionError);
    assert_eq!(post.exit_code(), EXIT_FUNCTIONAL_FAILURE);

    let build = ws.run(&pipeline, ContributionFilter::All, StageSelection::BUILD).await;
    assert_eq!(build.verdict, Verdict::Pass);
    assert!(marker.exists());

    let post = ws.run(&pipeline, ContributionFilter::All, StageSelection::POST_ONLY).await;
    assert_eq!(post.verdict, Verdict::Pass);
}

/// Test: building pure contributions succeeds without any toolchain process,
/// and doing it twice gives the same result.
#[tokio::test]
async fn test_pure_build_is_idempotent_and_process_free() {
    let ws = Workspace::new(&[
        ContributionFixture::new("alpha"),
        ContributionFixture::new("beta"),
    ]);
    let marker = ws.path().join("toolchain-ran");
    let pipeline = Pipeline::new(
        &ws.config(&format!("touch {}", marker.display())),
        Arc::new(loader_for(&["alpha", "beta"])),
    );

    let first = ws.run(&pipeline, ContributionFilter::All, StageSelection::BUILD).await;
    let second = ws.run(&pipeline, ContributionFilter::All, StageSelection::BUILD).await;

    assert_eq!(first.verdict, Verdict::Pass);
    assert_eq!(first.contributions, second.contributions);
    assert!(!marker.exists());
}

/// Test: a failing toolchain stops that contribution before functional checks.
#[tokio::test]
async fn test_build_failure_skips_functional_stage() {
    let ws = Workspace::new(&[ContributionFixture::new("alpha").native()]);
    let pipeline = Pipeline::new(
        &ws.config("echo 'cmake: no compiler found' >&2; exit 1"),
        Arc::new(loader_for(&["alpha"])),
    );

    let report = ws.run(&pipeline, ContributionFilter::All, StageSelection::FULL).await;

    assert_eq!(report.exit_code(), EXIT_BUILD_FAILURE);
    assert_eq!(stages_of(&report, "alpha"), [Stage::StructuralPre, Stage::Build]);
    let failure = report.contribution(&"alpha".into()).unwrap().first_failure().unwrap();
    let (reason, detail) = failure.failure().unwrap();
    assert_eq!(reason, FailReason::ToolchainInvocationFailed);
    assert!(detail.contains("no compiler found"));
}

/// Test: one shape mismatch fails the run; filtering it out passes.
#[tokio::test]
async fn test_shape_mismatch_verdict() {
    let ws = Workspace::new(&[
        ContributionFixture::new("alpha"),
        ContributionFixture::new("beta"),
    ]);
    let mut loader = loader_for(&["beta"]);
    loader.register_static(
        "alpha",
        StaticRuntime::new().returning("basic", ExampleValue::new(vec![3, 3], "float64")),
    );
    let pipeline = Pipeline::new(&ws.config("true"), Arc::new(loader));

    let report = ws.run(&pipeline, ContributionFilter::All, StageSelection::FULL).await;
    assert_eq!(report.verdict, Verdict::Fail);
    assert_eq!(report.exit_code(), EXIT_FUNCTIONAL_FAILURE);
    let alpha = report.contribution(&"alpha".into()).unwrap();
    assert_eq!(alpha.outcomes.len(), 3);
    assert_eq!(
        alpha.first_failure().unwrap().failure().unwrap().0,
        FailReason::ShapeMismatch
    );

    let report = ws
        .run(
            &pipeline,
            ContributionFilter::Named("beta".to_string()),
            StageSelection::FULL,
        )
        .await;
    assert_eq!(report.verdict, Verdict::Pass);
    assert_eq!(report.contributions.len(), 1);
}

/// Test: a panicking in-process example is recorded, not propagated.
#[tokio::test]
async fn test_panicking_runtime_is_contained() {
    let ws = Workspace::new(&[
        ContributionFixture::new("alpha"),
        ContributionFixture::new("beta"),
    ]);
    let mut loader = loader_for(&["beta"]);
    loader.register_static("alpha", StaticRuntime::new().panicking("basic", "segfault-ish"));
    let pipeline = Pipeline::new(&ws.config("true"), Arc::new(loader));

    let report = ws.run(&pipeline, ContributionFilter::All, StageSelection::FULL).await;

    let alpha = report.contribution(&"alpha".into()).unwrap();
    assert_eq!(
        alpha.first_failure().unwrap().failure().unwrap().0,
        FailReason::InvocationRaised
    );
    assert!(report.contribution(&"beta".into()).unwrap().passed());
}

/// Test: fail-fast with one worker stops launching after the first failure.
#[tokio::test]
async fn test_fail_fast_stops_launching() {
    let ws = Workspace::new(&[
        ContributionFixture::new("alpha").without("README.md"),
        ContributionFixture::new("beta"),
        ContributionFixture::new("gamma"),
    ]);
    let pipeline = Pipeline::new(
        &ws.config("true"),
        Arc::new(loader_for(&["alpha", "beta", "gamma"])),
    )
    .with_jobs(1)
    .with_fail_fast(true);

    let report = ws.run(&pipeline, ContributionFilter::All, StageSelection::FULL).await;

    assert_eq!(report.verdict, Verdict::Fail);
    assert_eq!(report.exit_code(), EXIT_STRUCTURAL_FAILURE);
    assert_eq!(report.not_started_count(), 2);
    assert!(!report.contribution(&"beta".into()).unwrap().started);
    assert!(pipeline.cancel_flag().is_cancelled());
}

/// Test: a run cancelled before launch starts nothing and fails as interrupted.
#[tokio::test]
async fn test_cancelled_run_reports_not_started() {
    let ws = Workspace::new(&[
        ContributionFixture::new("alpha"),
        ContributionFixture::new("beta"),
    ]);
    let cancel = CancelFlag::new();
    cancel.cancel();
    let pipeline = Pipeline::new(&ws.config("true"), Arc::new(loader_for(&["alpha", "beta"])))
        .with_cancel(cancel);

    let report = ws.run(&pipeline, ContributionFilter::All, StageSelection::FULL).await;

    assert_eq!(report.verdict, Verdict::Fail);
    assert_eq!(report.exit_code(), EXIT_INTERRUPTED);
    assert_eq!(report.not_started_count(), 2);
    assert!(report.contributions.iter().all(|c| c.outcomes.is_empty()));
}

/// Test: an unknown contribution name aborts before any work.
#[tokio::test]
async fn test_unknown_contribution_is_fatal() {
    let ws = Workspace::new(&[ContributionFixture::new("alpha")]);
    let pipeline = Pipeline::new(&ws.config("true"), Arc::new(loader_for(&["alpha"])));

    let result = pipeline
        .run_filtered(
            &ws.registry(),
            &ContributionFilter::Named("zeta".to_string()),
            StageSelection::FULL,
        )
        .await;
    assert!(result.is_err());
}
