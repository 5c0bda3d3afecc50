//! contribkit core library
//!
//! Domain model and the synchronous half of the contribution pipeline:
//! - contribution discovery and change-list filtering
//! - pre-build structural validation
//! - build stamps gating post-build validation
//! - report aggregation, verdict and rendering

pub mod config;
pub mod domain;
pub mod error;
pub mod fixtures;
pub mod git;
pub mod obs;
pub mod registry;
pub mod render;
pub mod report;
pub mod stamp;
pub mod structural;
pub mod telemetry;

pub use config::{LayoutConfig, OrchestratorConfig, RunnerConfig, ToolchainConfig};
pub use domain::{
    ChangeSet, ContributionDescriptor, ContributionId, ContributionMetadata, DType, ExampleDecl,
    FailReason, OutcomeStatus, OutputContract, Stage, ValidationOutcome,
};
pub use error::{PipelineError, Result};
pub use git::{changed_contributions, is_git_repo};
pub use obs::{
    emit_run_cancelled, emit_run_finished, emit_run_started, emit_stage_finished,
    ContributionSpan,
};
pub use registry::{discover, ContributionFilter, ContributionRegistry};
pub use render::{render_text, write_report_json};
pub use report::{aggregate, verdict, BuildReport, ContributionReport, ReportAggregator, Verdict};
pub use stamp::{source_digest, BuildLayout, BuildStamp, StampState};
pub use structural::StructuralValidator;
pub use telemetry::init_tracing;

/// contribkit version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
