//! Build driver: turns a contribution's sources into an importable artifact.
//!
//! Pure contributions are already importable, so building them only records a
//! stamp. Native contributions run the configured toolchain exactly once per
//! build, in their own build and install directories.

use chrono::Utc;
use tracing::{debug, info, warn};

use contribkit_core::{
    source_digest, BuildLayout, BuildStamp, ContributionDescriptor, FailReason, Stage,
    StampState, ToolchainConfig, ValidationOutcome,
};

use crate::toolchain::{expand_command, run_tool, ToolError, ToolInvocation};

/// Environment variable carrying the contribution id into the toolchain.
pub const CONTRIBUTION_ENV: &str = "CONTRIBKIT_CONTRIBUTION";

/// Builds contributions according to a [`ToolchainConfig`].
#[derive(Debug, Clone)]
pub struct BuildDriver {
    toolchain: ToolchainConfig,
    layout: BuildLayout,
}

impl BuildDriver {
    pub fn new(toolchain: &ToolchainConfig) -> Self {
        Self {
            layout: BuildLayout::new(&toolchain.build_root),
            toolchain: toolchain.clone(),
        }
    }

    pub fn layout(&self) -> &BuildLayout {
        &self.layout
    }

    /// Build one contribution.
    pub async fn build(&self, descriptor: &ContributionDescriptor) -> ValidationOutcome {
        if !descriptor.has_native_build() {
            debug!(contribution = %descriptor.id, "Pure contribution, nothing to compile");
            // A missing stamp surfaces as a precondition failure in the functional stage.
            if let Err(e) = self.record(descriptor, false, descriptor.root.clone()) {
                warn!(contribution = %descriptor.id, error = %e, "Build stamp not recorded");
            }
            return ValidationOutcome::pass(Stage::Build);
        }

        if self.toolchain.incremental {
            if let Ok(StampState::Current(stamp)) = self.layout.stamp_state(descriptor) {
                if stamp.native {
                    info!(contribution = %descriptor.id, "Build is up to date");
                    return ValidationOutcome::pass(Stage::Build);
                }
            }
        }

        if let Err(e) = self.layout.clear_stamp(&descriptor.id) {
            warn!(contribution = %descriptor.id, error = %e, "Failed to clear stale stamp");
        }

        let build_dir = self.layout.build_dir(&descriptor.id);
        let install_dir = self.layout.install_dir(&descriptor.id);
        for dir in [&build_dir, &install_dir] {
            if let Err(e) = std::fs::create_dir_all(dir) {
                return fail(
                    FailReason::ToolchainInvocationFailed,
                    format!("cannot create {}: {e}", dir.display()),
                );
            }
        }

        let descriptor_path = descriptor
            .native_descriptor
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let argv = expand_command(
            &self.toolchain.command,
            &[
                ("name", descriptor.id.to_string()),
                ("source", descriptor.root.display().to_string()),
                ("descriptor", descriptor_path),
                ("build_dir", build_dir.display().to_string()),
                ("install_dir", install_dir.display().to_string()),
            ],
        );
        let invocation = ToolInvocation::new(format!("toolchain[{}]", descriptor.id), argv)
            .working_dir(&descriptor.root)
            .env(CONTRIBUTION_ENV, descriptor.id.as_str())
            .timeout_secs(self.toolchain.timeout_secs);

        info!(contribution = %descriptor.id, "Invoking native toolchain");
        match run_tool(&invocation).await {
            Ok(output) if output.passed() => {
                debug!(
                    contribution = %descriptor.id,
                    duration_ms = output.duration_ms,
                    "Toolchain succeeded"
                );
                // Digest after the run: in-place builds leave artifacts in the source tree.
                match self.record(descriptor, true, install_dir) {
                    Ok(()) => ValidationOutcome::pass(Stage::Build),
                    Err(detail) => fail(FailReason::ToolchainInvocationFailed, detail),
                }
            }
            Ok(output) => fail(
                FailReason::ToolchainInvocationFailed,
                format!(
                    "toolchain exited with code {}\n{}",
                    output.exit_code,
                    output.diagnostic_text()
                ),
            ),
            Err(ToolError::Timeout { secs, .. }) => fail(
                FailReason::ToolchainTimeout,
                format!("toolchain did not finish within {secs} seconds"),
            ),
            Err(e) => fail(FailReason::ToolchainInvocationFailed, e.to_string()),
        }
    }

    /// Digest the current tree and write the stamp.
    fn record(
        &self,
        descriptor: &ContributionDescriptor,
        native: bool,
        install_dir: std::path::PathBuf,
    ) -> Result<(), String> {
        let source_digest = source_digest(&descriptor.root).map_err(|e| {
            format!("cannot digest sources in {}: {e}", descriptor.root.display())
        })?;
        let stamp = BuildStamp {
            contribution: descriptor.id.clone(),
            source_digest,
            native,
            install_dir,
            built_at: Utc::now(),
        };
        self.layout
            .write_stamp(&stamp)
            .map_err(|e| format!("cannot write build stamp: {e}"))
    }
}

fn fail(reason: FailReason, detail: String) -> ValidationOutcome {
    ValidationOutcome::fail(Stage::Build, reason, detail)
}
