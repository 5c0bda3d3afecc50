//! Loaded-contribution capability used by functional validation.
//!
//! A [`ContributionLoader`] turns a built contribution into a
//! [`ContributionRuntime`]; every example call goes through that trait, so the
//! validator does not care whether the code runs in a child process or in
//! this one.

use std::any::Any;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use contribkit_core::{BuildStamp, ContributionDescriptor, FailReason};

use crate::toolchain::ToolError;

pub mod process;
pub mod registry;

pub use process::{ProcessLoader, ProcessRuntime};
pub use registry::{RegistryLoader, StaticRuntime};

/// Shape and element type of an example's return value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExampleValue {
    pub shape: Vec<usize>,
    pub dtype: String,
}

impl ExampleValue {
    pub fn new(shape: Vec<usize>, dtype: impl Into<String>) -> Self {
        Self {
            shape,
            dtype: dtype.into(),
        }
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }
}

/// Errors raised by an example call.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("import failed: {0}")]
    Import(String),

    #[error("signature mismatch: {0}")]
    Signature(String),

    #[error("raised: {0}")]
    Raised(String),
}

impl RuntimeError {
    pub fn reason(&self) -> FailReason {
        match self {
            RuntimeError::Import(_) => FailReason::ImportFailed,
            RuntimeError::Signature(_) | RuntimeError::Raised(_) => FailReason::InvocationRaised,
        }
    }
}

/// Errors raised while loading a contribution.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("{0}")]
    Import(String),

    #[error("runner protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// A loaded contribution.
#[async_trait]
pub trait ContributionRuntime: Send + Sync {
    /// Names of the examples the loaded code exposes.
    fn list_example_names(&self) -> Vec<String>;

    /// Invoke one example, optionally with its input file.
    async fn run(&self, example: &str, input: Option<&Path>) -> Result<ExampleValue, RuntimeError>;
}

/// Produces runtimes for built contributions.
#[async_trait]
pub trait ContributionLoader: Send + Sync {
    async fn load(
        &self,
        descriptor: &ContributionDescriptor,
        stamp: &BuildStamp,
    ) -> Result<Box<dyn ContributionRuntime>, LoadError>;
}

/// Best-effort message from a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
