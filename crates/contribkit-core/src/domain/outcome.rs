//! Validation stages, the closed fail-reason taxonomy, and stage outcomes.

use serde::{Deserialize, Serialize};

/// Pipeline stage that produced an outcome.
///
/// Declaration order is execution order within one contribution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// Static layout and metadata checks, before anything is compiled.
    StructuralPre,

    /// Native build/install (identity for pure contributions).
    Build,

    /// Functional smoke test of the built contribution.
    FunctionalPost,
}

impl Stage {
    /// Stable stage name used in reports and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::StructuralPre => "structural-pre",
            Stage::Build => "build",
            Stage::FunctionalPost => "functional-post",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Closed set of per-contribution defect kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FailReason {
    MissingFile,
    InvalidMetadata,
    NamingMismatch,
    DanglingExampleReference,
    ToolchainInvocationFailed,
    ToolchainTimeout,
    ImportFailed,
    InvocationRaised,
    ShapeMismatch,
    PreconditionError,
}

impl FailReason {
    /// The stage this reason belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            FailReason::MissingFile
            | FailReason::InvalidMetadata
            | FailReason::NamingMismatch
            | FailReason::DanglingExampleReference => Stage::StructuralPre,
            FailReason::ToolchainInvocationFailed | FailReason::ToolchainTimeout => Stage::Build,
            FailReason::ImportFailed
            | FailReason::InvocationRaised
            | FailReason::ShapeMismatch
            | FailReason::PreconditionError => Stage::FunctionalPost,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FailReason::MissingFile => "MissingFile",
            FailReason::InvalidMetadata => "InvalidMetadata",
            FailReason::NamingMismatch => "NamingMismatch",
            FailReason::DanglingExampleReference => "DanglingExampleReference",
            FailReason::ToolchainInvocationFailed => "ToolchainInvocationFailed",
            FailReason::ToolchainTimeout => "ToolchainTimeout",
            FailReason::ImportFailed => "ImportFailed",
            FailReason::InvocationRaised => "InvocationRaised",
            FailReason::ShapeMismatch => "ShapeMismatch",
            FailReason::PreconditionError => "PreconditionError",
        }
    }
}

impl std::fmt::Display for FailReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Pass, or a classified failure with diagnostic detail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Pass,
    Fail { reason: FailReason, detail: String },
}

/// Result of one stage applied to one contribution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub stage: Stage,

    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl ValidationOutcome {
    pub fn pass(stage: Stage) -> Self {
        Self {
            stage,
            status: OutcomeStatus::Pass,
        }
    }

    pub fn fail(stage: Stage, reason: FailReason, detail: impl Into<String>) -> Self {
        debug_assert_eq!(reason.stage(), stage, "{reason} reported by {stage}");
        Self {
            stage,
            status: OutcomeStatus::Fail {
                reason,
                detail: detail.into(),
            },
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self.status, OutcomeStatus::Pass)
    }

    pub fn is_fail(&self) -> bool {
        !self.is_pass()
    }

    /// Reason and detail when this outcome is a failure.
    pub fn failure(&self) -> Option<(FailReason, &str)> {
        match &self.status {
            OutcomeStatus::Pass => None,
            OutcomeStatus::Fail { reason, detail } => Some((*reason, detail.as_str())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_matches_execution_order() {
        assert!(Stage::StructuralPre < Stage::Build);
        assert!(Stage::Build < Stage::FunctionalPost);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::StructuralPre.to_string(), "structural-pre");
        assert_eq!(Stage::Build.to_string(), "build");
        assert_eq!(Stage::FunctionalPost.to_string(), "functional-post");
    }

    #[test]
    fn test_reasons_map_to_stages() {
        assert_eq!(FailReason::DanglingExampleReference.stage(), Stage::StructuralPre);
        assert_eq!(FailReason::ToolchainTimeout.stage(), Stage::Build);
        assert_eq!(FailReason::PreconditionError.stage(), Stage::FunctionalPost);
        assert_eq!(FailReason::ShapeMismatch.stage(), Stage::FunctionalPost);
    }

    #[test]
    fn test_outcome_accessors() {
        let ok = ValidationOutcome::pass(Stage::Build);
        assert!(ok.is_pass());
        assert!(ok.failure().is_none());

        let bad = ValidationOutcome::fail(
            Stage::FunctionalPost,
            FailReason::ShapeMismatch,
            "expected ndim 1, got 2",
        );
        assert!(bad.is_fail());
        let (reason, detail) = bad.failure().unwrap();
        assert_eq!(reason, FailReason::ShapeMismatch);
        assert!(detail.contains("ndim"));
    }

    #[test]
    fn test_outcome_json_shape() {
        let bad = ValidationOutcome::fail(
            Stage::StructuralPre,
            FailReason::MissingFile,
            "README.md",
        );
        let json = serde_json::to_value(&bad).unwrap();
        assert_eq!(json["stage"], "structural-pre");
        assert_eq!(json["status"], "fail");
        assert_eq!(json["reason"], "MissingFile");
        assert_eq!(json["detail"], "README.md");

        let ok = serde_json::to_value(ValidationOutcome::pass(Stage::Build)).unwrap();
        assert_eq!(ok["status"], "pass");
    }
}
