//! contribkit - build and validation orchestrator for contribution folders
//!
//! ## Commands
//!
//! - `validate --pre`: structural checks, nothing is built or imported
//! - `validate --post`: functional smoke tests of already-built contributions
//! - `build`: structural checks then native builds (`--post` adds smoke tests)
//! - `changes`: write the contributions touched since a git ref
//! - `list`: show the contributions a filter selects
//!
//! Exit status: 0 pass, 1 pipeline error, 10/20/30 when the earliest failure
//! was structural/build/functional, 40 when interrupted before every
//! contribution started.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use tracing::{info, warn, Level};

use contribkit_ci::{CancelFlag, Pipeline, ProcessLoader, StageSelection};
use contribkit_core::report::{EXIT_INTERRUPTED, EXIT_PASS, EXIT_PIPELINE_ERROR};
use contribkit_core::{
    changed_contributions, render_text, write_report_json, ChangeSet, ContributionFilter,
    ContributionRegistry, OrchestratorConfig,
};

#[derive(Parser, Debug)]
#[command(name = "contribkit")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build and validate plugin-style contributions", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Directory holding one folder per contribution
    #[arg(long, global = true, env = "CONTRIBKIT_ROOT", default_value = "contrib")]
    root: PathBuf,

    /// Configuration file (default: ./contribkit.toml when present)
    #[arg(long, global = true, env = "CONTRIBKIT_CONFIG")]
    config: Option<PathBuf>,

    /// Contributions processed concurrently (0 = one per CPU)
    #[arg(short, long, global = true, env = "CONTRIBKIT_JOBS")]
    jobs: Option<usize>,

    /// Directory for build trees, installs and build stamps
    #[arg(long, global = true, env = "CONTRIBKIT_BUILD_ROOT")]
    build_root: Option<PathBuf>,

    /// Also write the report as JSON to this path
    #[arg(long, global = true, env = "CONTRIBKIT_REPORT_JSON")]
    report_json: Option<PathBuf>,

    /// Stop launching contributions after the first failure
    #[arg(long, global = true, env = "CONTRIBKIT_FAIL_FAST")]
    fail_fast: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run pre-build or post-build validation
    #[command(group(ArgGroup::new("phase").required(true).args(["pre", "post"])))]
    Validate {
        /// Structural checks before building
        #[arg(long)]
        pre: bool,

        /// Functional checks after building
        #[arg(long)]
        post: bool,

        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Validate structure, then build native extensions
    Build {
        /// Run functional checks after a successful build
        #[arg(long)]
        post: bool,

        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Compute the contributions changed since a git ref
    Changes {
        /// Base ref to diff against (merge base with HEAD)
        #[arg(long, default_value = "origin/main")]
        base: String,

        /// Write the change list here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the contributions a filter selects
    List {
        #[command(flatten)]
        scope: ScopeArgs,
    },
}

/// Which contributions a command covers.
#[derive(Args, Debug, Default)]
struct ScopeArgs {
    /// A single contribution by folder name
    #[arg(long, conflicts_with_all = ["all", "file"])]
    contrib: Option<String>,

    /// Every contribution (the default)
    #[arg(long, conflicts_with = "file")]
    all: bool,

    /// Change list file: one contribution name per line
    #[arg(short = 'f', long = "file")]
    file: Option<PathBuf>,
}

impl ScopeArgs {
    fn filter(&self) -> Result<ContributionFilter> {
        if let Some(name) = &self.contrib {
            return Ok(ContributionFilter::Named(name.clone()));
        }
        if let Some(path) = &self.file {
            let changes = ChangeSet::from_file(path)
                .with_context(|| format!("Failed to read change list {}", path.display()))?;
            return Ok(ContributionFilter::from_change_set(changes));
        }
        Ok(ContributionFilter::All)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    contribkit_core::init_tracing(cli.json, level);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("✗ {e:#}");
            ExitCode::from(EXIT_PIPELINE_ERROR)
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    let cwd = std::env::current_dir().context("Failed to read the working directory")?;
    let config = load_config(&cli, &cwd)?;
    let root = absolute(&cwd, &cli.root);

    match cli.command {
        Commands::Validate { pre, scope, .. } => {
            let selection = if pre {
                StageSelection::PRE_ONLY
            } else {
                StageSelection::POST_ONLY
            };
            cmd_pipeline(&config, &root, &scope, selection, cli.report_json.as_deref()).await
        }
        Commands::Build { post, scope } => {
            let selection = if post {
                StageSelection::FULL
            } else {
                StageSelection::BUILD
            };
            cmd_pipeline(&config, &root, &scope, selection, cli.report_json.as_deref()).await
        }
        Commands::Changes { base, output } => cmd_changes(&root, &base, output.as_deref()),
        Commands::List { scope } => cmd_list(&config, &root, &scope),
    }
}

/// Load the config file and apply command-line overrides.
fn load_config(cli: &Cli, cwd: &Path) -> Result<OrchestratorConfig> {
    let mut config = OrchestratorConfig::load(cli.config.as_deref(), cwd)
        .context("Failed to load configuration")?;

    if let Some(jobs) = cli.jobs {
        config.jobs = jobs;
    }
    if cli.fail_fast {
        config.fail_fast = true;
    }
    if let Some(build_root) = &cli.build_root {
        config.toolchain.build_root = build_root.clone();
    }
    // Toolchains run inside the contribution folder, so paths handed to them
    // must not be relative to ours.
    config.toolchain.build_root = absolute(cwd, &config.toolchain.build_root);
    Ok(config)
}

fn absolute(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

async fn cmd_pipeline(
    config: &OrchestratorConfig,
    root: &Path,
    scope: &ScopeArgs,
    selection: StageSelection,
    report_json: Option<&Path>,
) -> Result<u8> {
    let registry = ContributionRegistry::new(root, config.layout.clone());
    let filter = scope.filter()?;

    let cancel = CancelFlag::new();
    spawn_interrupt_handler(cancel.clone());

    let pipeline = Pipeline::new(config, Arc::new(ProcessLoader::new(&config.runner)))
        .with_cancel(cancel);
    info!(
        root = %root.display(),
        stages = %selection,
        jobs = pipeline.jobs(),
        "Starting contribution pipeline"
    );

    let report = pipeline
        .run_filtered(&registry, &filter, selection)
        .await
        .context("Pipeline aborted")?;

    print!("{}", render_text(&report));

    if let Some(path) = report_json {
        write_report_json(&report, path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!(path = %path.display(), "Wrote JSON report");
    }

    Ok(report.exit_code())
}

/// First Ctrl-C stops launching new contributions; a second one exits.
fn spawn_interrupt_handler(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupted: finishing contributions already started (Ctrl-C again to abort)");
        cancel.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("✗ Aborted");
            std::process::exit(i32::from(EXIT_INTERRUPTED));
        }
    });
}

fn cmd_changes(root: &Path, base: &str, output: Option<&Path>) -> Result<u8> {
    let changes = changed_contributions(root, base)
        .with_context(|| format!("Failed to compute changes against {base}"))?;

    match output {
        Some(path) => {
            changes
                .write_to(path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "✓ {} changed contribution(s) written to {}",
                changes.len(),
                path.display()
            );
        }
        None => {
            for name in changes.iter() {
                println!("{name}");
            }
        }
    }
    Ok(EXIT_PASS)
}

fn cmd_list(config: &OrchestratorConfig, root: &Path, scope: &ScopeArgs) -> Result<u8> {
    let registry = ContributionRegistry::new(root, config.layout.clone());
    let descriptors = registry
        .discover(&scope.filter()?)
        .context("Failed to discover contributions")?;

    for descriptor in &descriptors {
        let kind = if descriptor.has_native_build() {
            "native"
        } else {
            "pure"
        };
        println!("{:<32} {kind}", descriptor.id.as_str());
    }
    info!(count = descriptors.len(), "Listed contributions");
    Ok(EXIT_PASS)
}
