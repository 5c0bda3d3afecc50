//! contribkit CI - build and functional validation of contributions
//!
//! Provides the asynchronous half of the pipeline:
//! - native builds through an external toolchain, gated by build stamps
//! - functional smoke tests through pluggable contribution loaders
//! - per-contribution pipelines on a bounded, cancellable worker pool

pub mod build;
pub mod cancel;
pub mod functional;
pub mod pipeline;
pub mod runtime;
pub mod toolchain;

// Re-export key types
pub use build::BuildDriver;
pub use cancel::CancelFlag;
pub use functional::FunctionalValidator;
pub use pipeline::{Pipeline, StageSelection};
pub use runtime::{
    ContributionLoader, ContributionRuntime, ExampleValue, LoadError, ProcessLoader,
    RegistryLoader, RuntimeError, StaticRuntime,
};
pub use toolchain::{run_tool, ToolError, ToolInvocation, ToolOutput};
