//! Orchestrator configuration.
//!
//! Loaded from an optional TOML file (`contribkit.toml`); every field has a
//! default so an empty file, or no file at all, is a valid configuration.
//! Command-line flags override individual fields after loading.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// File name looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "contribkit.toml";

/// Top-level configuration for one orchestrator run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Folder layout every contribution must follow.
    pub layout: LayoutConfig,

    /// Native build toolchain invocation.
    pub toolchain: ToolchainConfig,

    /// Functional smoke-test runner invocation.
    pub runner: RunnerConfig,

    /// Maximum number of contributions processed concurrently (0 = one per CPU).
    pub jobs: usize,

    /// Stop launching new contributions after the first failure.
    pub fail_fast: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            layout: LayoutConfig::default(),
            toolchain: ToolchainConfig::default(),
            runner: RunnerConfig::default(),
            jobs: 0,
            fail_fast: false,
        }
    }
}

/// Required files and naming conventions inside a contribution folder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LayoutConfig {
    /// Metadata descriptor file name.
    pub metadata_file: String,

    /// Primary entry-point module file name.
    pub entry_module: String,

    /// Example-data directory name.
    pub data_dir: String,

    /// Native build descriptor file name (its presence marks a native build).
    pub native_descriptor: String,

    /// Source file extension used to resolve example symbol modules.
    pub module_extension: String,

    /// Additional files every contribution must ship.
    pub extra_required: Vec<String>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            metadata_file: "contribution.toml".to_string(),
            entry_module: "__init__.py".to_string(),
            data_dir: "data".to_string(),
            native_descriptor: "CMakeLists.txt".to_string(),
            module_extension: "py".to_string(),
            extra_required: vec!["README.md".to_string()],
        }
    }
}

/// Native build toolchain settings.
///
/// `command` is an argv template; `{name}`, `{source}`, `{descriptor}`,
/// `{build_dir}` and `{install_dir}` are substituted per contribution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToolchainConfig {
    pub command: Vec<String>,

    /// Wall-clock limit for one invocation, in seconds (0 = no limit).
    pub timeout_secs: u64,

    /// Directory holding per-contribution build trees, installs and stamps.
    pub build_root: PathBuf,

    /// Skip native builds whose stamp matches the current sources.
    pub incremental: bool,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                "cmake -S {source} -B {build_dir} && cmake --build {build_dir} && cmake --install {build_dir} --prefix {install_dir}".to_string(),
            ],
            timeout_secs: 1800,
            build_root: PathBuf::from("build/contrib"),
            incremental: false,
        }
    }
}

/// Functional runner settings.
///
/// `command` is an argv template; `{name}`, `{source}`, `{entry}` and
/// `{install_dir}` are substituted, then the runner action is appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    pub command: Vec<String>,

    /// Wall-clock limit for one runner call, in seconds (0 = no limit).
    pub timeout_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "python3".to_string(),
                "-m".to_string(),
                "contribkit_runner".to_string(),
                "{source}".to_string(),
            ],
            timeout_secs: 300,
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from `path`, which must exist.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text).map_err(|e| {
            PipelineError::InvalidConfig(format!("{}: {}", path.display(), e.message()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `explicit` if given, else `contribkit.toml` in `cwd` if present,
    /// else defaults.
    pub fn load(explicit: Option<&Path>, cwd: &Path) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let candidate = cwd.join(DEFAULT_CONFIG_FILE);
                if candidate.is_file() {
                    Self::from_file(&candidate)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Reject configurations no run could succeed with.
    pub fn validate(&self) -> Result<()> {
        if self.toolchain.command.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "toolchain.command must not be empty".to_string(),
            ));
        }
        if self.runner.command.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "runner.command must not be empty".to_string(),
            ));
        }
        if self.layout.metadata_file.is_empty() || self.layout.entry_module.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "layout.metadata_file and layout.entry_module must be set".to_string(),
            ));
        }
        Ok(())
    }

    /// Worker count with `0` resolved to the available parallelism.
    pub fn effective_jobs(&self) -> usize {
        if self.jobs > 0 {
            self.jobs
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}
