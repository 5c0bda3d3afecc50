//! Post-build functional validation.
//!
//! Loads a built contribution and calls each declared example once, checking
//! only that the call completes and that the result has the declared
//! dimensionality and element type.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::debug;

use contribkit_core::{
    BuildLayout, ContributionDescriptor, ExampleDecl, FailReason, RunnerConfig, Stage,
    StampState, ValidationOutcome,
};

use crate::runtime::{panic_message, ContributionLoader, ContributionRuntime};

/// Functional smoke-test stage.
#[derive(Clone)]
pub struct FunctionalValidator {
    layout: BuildLayout,
    loader: Arc<dyn ContributionLoader>,
    timeout: Option<Duration>,
}

impl FunctionalValidator {
    /// `layout` must point at the build root the build stage writes to.
    pub fn new(layout: BuildLayout, loader: Arc<dyn ContributionLoader>, runner: &RunnerConfig) -> Self {
        Self {
            layout,
            loader,
            timeout: (runner.timeout_secs > 0).then(|| Duration::from_secs(runner.timeout_secs)),
        }
    }

    /// Validate one built contribution.
    pub async fn validate_post(&self, descriptor: &ContributionDescriptor) -> ValidationOutcome {
        match self.check(descriptor).await {
            Ok(()) => ValidationOutcome::pass(Stage::FunctionalPost),
            Err((reason, detail)) => ValidationOutcome::fail(Stage::FunctionalPost, reason, detail),
        }
    }

    async fn check(&self, descriptor: &ContributionDescriptor) -> Result<(), (FailReason, String)> {
        let precondition = |detail: String| (FailReason::PreconditionError, detail);
        let stamp = match self.layout.stamp_state(descriptor) {
            Ok(StampState::Current(stamp)) => stamp,
            Ok(StampState::Missing) => {
                return Err(precondition(format!(
                    "not built: no build stamp at {}",
                    self.layout.stamp_path(&descriptor.id).display()
                )))
            }
            Ok(StampState::Stale { .. }) => {
                return Err(precondition(
                    "sources changed since the last build; rebuild first".to_string(),
                ))
            }
            Err(e) => return Err(precondition(format!("cannot read build stamp: {e}"))),
        };

        let metadata = descriptor
            .load_metadata()
            .map_err(|e| (FailReason::ImportFailed, format!("cannot read metadata: {e}")))?;

        let runtime = self
            .bounded(AssertUnwindSafe(self.loader.load(descriptor, &stamp)).catch_unwind())
            .await
            .ok_or_else(|| (FailReason::ImportFailed, self.timeout_detail("loading")))?
            .map_err(|payload| {
                (
                    FailReason::ImportFailed,
                    format!("loading panicked: {}", panic_message(payload.as_ref())),
                )
            })?
            .map_err(|e| (FailReason::ImportFailed, e.to_string()))?;

        let listed = runtime.list_example_names();
        for example in &metadata.examples {
            if !listed.iter().any(|name| name == &example.name) {
                return Err((
                    FailReason::ImportFailed,
                    format!(
                        "example `{}` is declared but not exposed (found: {})",
                        example.name,
                        if listed.is_empty() { "none".to_string() } else { listed.join(", ") }
                    ),
                ));
            }
            self.run_example(descriptor, runtime.as_ref(), example).await?;
            debug!(contribution = %descriptor.id, example = %example.name, "Example passed");
        }
        Ok(())
    }

    async fn run_example(
        &self,
        descriptor: &ContributionDescriptor,
        runtime: &dyn ContributionRuntime,
        example: &ExampleDecl,
    ) -> Result<(), (FailReason, String)> {
        let name = &example.name;
        let input = example.input.as_ref().map(|p| descriptor.root.join(p));

        let value = self
            .bounded(AssertUnwindSafe(runtime.run(name, input.as_deref())).catch_unwind())
            .await
            .ok_or_else(|| {
                (
                    FailReason::InvocationRaised,
                    format!("example `{name}`: {}", self.timeout_detail("the call")),
                )
            })?
            .map_err(|payload| {
                (
                    FailReason::InvocationRaised,
                    format!("example `{name}` panicked: {}", panic_message(payload.as_ref())),
                )
            })?
            .map_err(|e| (e.reason(), format!("example `{name}`: {e}")))?;

        let contract = example.output;
        if value.ndim() != contract.ndim as usize || value.dtype != contract.dtype.as_str() {
            return Err((
                FailReason::ShapeMismatch,
                format!(
                    "example `{name}`: expected ndim {} {}, got ndim {} {} (shape {:?})",
                    contract.ndim,
                    contract.dtype,
                    value.ndim(),
                    value.dtype,
                    value.shape
                ),
            ));
        }
        Ok(())
    }

    /// Apply the runner timeout; `None` when it elapsed.
    async fn bounded<F: std::future::Future>(&self, fut: F) -> Option<F::Output> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
            None => Some(fut.await),
        }
    }

    fn timeout_detail(&self, what: &str) -> String {
        let secs = self.timeout.map(|t| t.as_secs()).unwrap_or_default();
        format!("{what} did not finish within {secs} seconds")
    }
}

impl std::fmt::Debug for FunctionalValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionalValidator")
            .field("layout", &self.layout)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
