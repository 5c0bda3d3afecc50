//! Pipeline-level error taxonomy.
//!
//! These errors are fatal: they abort a run before any contribution work
//! starts. Per-contribution defects never surface here; they are recorded as
//! [`ValidationOutcome`](crate::domain::ValidationOutcome)s instead.

use std::path::PathBuf;

/// Fatal orchestration errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("contribution not found: {0}")]
    NotFound(String),

    #[error("contribution root does not exist: {}", .0.display())]
    RootMissing(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("git error: {0}")]
    Git(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for pipeline-level operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = PipelineError::NotFound("delta".to_string());
        assert_eq!(err.to_string(), "contribution not found: delta");
    }

    #[test]
    fn test_root_missing_display() {
        let err = PipelineError::RootMissing(PathBuf::from("/nope/contrib"));
        let msg = err.to_string();
        assert!(msg.contains("does not exist"));
        assert!(msg.contains("/nope/contrib"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: PipelineError = io.into();
        assert!(err.to_string().starts_with("io error"));
    }
}
