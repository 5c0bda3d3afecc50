//! External tool execution with captured output and a wall-clock limit.
//!
//! Used for both the native build toolchain and the functional runner. On unix
//! every child leads its own process group: a terminal interrupt aimed at the
//! orchestrator does not reach it, and dropping the wait future (timeout or an
//! outer cancellation) kills the whole group, including anything a shell
//! command started.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::debug;

/// Lines of output kept in failure diagnostics.
const DIAGNOSTIC_TAIL_LINES: usize = 80;

/// One process invocation.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    /// Short label for logs and errors.
    pub label: String,

    /// Program followed by its arguments.
    pub command: Vec<String>,

    pub working_dir: Option<PathBuf>,

    /// Extra environment variables.
    pub envs: Vec<(String, String)>,

    /// `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl ToolInvocation {
    pub fn new(label: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            label: label.into(),
            command,
            working_dir: None,
            envs: Vec::new(),
            timeout: None,
        }
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Set the limit in seconds; `0` disables it.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }
}

/// Result of a process that ran to completion.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Exit code (-1 when terminated by a signal).
    pub exit_code: i32,

    pub stdout: String,

    pub stderr: String,

    pub duration_ms: u64,

    pub success: bool,
}

impl ToolOutput {
    /// Whether the process exited with code 0.
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }

    /// Tail of stderr followed by the tail of stdout, for failure details.
    pub fn diagnostic_text(&self) -> String {
        let mut parts = Vec::new();
        if !self.stderr.trim().is_empty() {
            parts.push(tail(&self.stderr, DIAGNOSTIC_TAIL_LINES));
        }
        if !self.stdout.trim().is_empty() {
            parts.push(tail(&self.stdout, DIAGNOSTIC_TAIL_LINES));
        }
        parts.join("\n")
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.trim_end().lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

/// Failures that prevented a process from running to completion.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{0}: empty command")]
    EmptyCommand(String),

    #[error("{label}: failed to spawn `{program}`: {source}")]
    Spawn {
        label: String,
        program: String,
        source: std::io::Error,
    },

    #[error("{label}: timed out after {secs} seconds")]
    Timeout { label: String, secs: u64 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run a process to completion, capturing stdout and stderr.
pub async fn run_tool(invocation: &ToolInvocation) -> Result<ToolOutput, ToolError> {
    let start = Instant::now();

    let (exe, args) = invocation
        .command
        .split_first()
        .ok_or_else(|| ToolError::EmptyCommand(invocation.label.clone()))?;

    let mut std_command = std::process::Command::new(exe);
    #[cfg(unix)]
    std::os::unix::process::CommandExt::process_group(&mut std_command, 0);

    let mut command = Command::from(std_command);
    command
        .args(args)
        .envs(invocation.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &invocation.working_dir {
        command.current_dir(dir);
    }

    debug!(tool = %invocation.label, command = ?invocation.command, "Spawning");
    let child = command.spawn().map_err(|source| ToolError::Spawn {
        label: invocation.label.clone(),
        program: exe.clone(),
        source,
    })?;
    let mut group = GroupGuard::new(child.id());

    let output = match invocation.timeout {
        Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| ToolError::Timeout {
                label: invocation.label.clone(),
                secs: limit.as_secs(),
            })??,
        None => child.wait_with_output().await?,
    };
    group.disarm();

    Ok(ToolOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        duration_ms: start.elapsed().as_millis() as u64,
        success: output.status.success(),
    })
}

/// Kills the child's process group when dropped before the child was reaped.
struct GroupGuard {
    pgid: Option<u32>,
}

impl GroupGuard {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        let Some(pgid) = self
            .pgid
            .and_then(|id| i32::try_from(id).ok())
            .filter(|&id| id > 1)
        else {
            return;
        };
        #[cfg(unix)]
        {
            // SAFETY: kill(2) has no memory-safety preconditions.
            let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
            if rc != 0 {
                debug!(pgid, error = %std::io::Error::last_os_error(), "Process group already gone");
            } else {
                debug!(pgid, "Killed process group");
            }
        }
        #[cfg(not(unix))]
        let _ = pgid;
    }
}

/// Substitute `{key}` placeholders in every argument of `template`.
pub fn expand_command(template: &[String], vars: &[(&str, String)]) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            vars.iter().fold(arg.clone(), |acc, (key, value)| {
                acc.replace(&format!("{{{key}}}"), value)
            })
        })
        .collect()
}
