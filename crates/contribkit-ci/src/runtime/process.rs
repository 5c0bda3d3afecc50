//! Runner-process loader.
//!
//! The configured runner command is spawned once per action and replies with a
//! single JSON document on stdout:
//!
//! - `list` -> `{"examples": ["small", "large"]}`
//! - `run <example> [<input>]` -> `{"shape": [3], "dtype": "float64"}`
//! - any failure -> `{"error": {"kind": "import" | "signature" | "raised", "message": ".."}}`
//!
//! Output that is not a reply is classified by action: a failed `list` is an
//! import failure, a failed `run` raised.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use contribkit_core::{BuildStamp, ContributionDescriptor, RunnerConfig};

use super::{ContributionLoader, ContributionRuntime, ExampleValue, LoadError, RuntimeError};
use crate::toolchain::{expand_command, run_tool, ToolError, ToolInvocation, ToolOutput};

/// Environment variable carrying the install directory into the runner.
pub const INSTALL_DIR_ENV: &str = "CONTRIBKIT_INSTALL_DIR";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    kind: String,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RunnerReply {
    Error { error: ErrorBody },
    Examples { examples: Vec<String> },
    Value(ExampleValue),
}

/// Last stdout line that parses as a reply.
fn parse_reply(stdout: &str) -> Option<RunnerReply> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .find_map(|line| serde_json::from_str(line).ok())
}

fn runtime_error(body: ErrorBody) -> RuntimeError {
    match body.kind.as_str() {
        "import" => RuntimeError::Import(body.message),
        "signature" => RuntimeError::Signature(body.message),
        _ => RuntimeError::Raised(body.message),
    }
}

/// Loads contributions through the external runner.
#[derive(Debug, Clone)]
pub struct ProcessLoader {
    runner: RunnerConfig,
}

impl ProcessLoader {
    pub fn new(runner: &RunnerConfig) -> Self {
        Self {
            runner: runner.clone(),
        }
    }
}

#[async_trait]
impl ContributionLoader for ProcessLoader {
    async fn load(
        &self,
        descriptor: &ContributionDescriptor,
        stamp: &BuildStamp,
    ) -> Result<Box<dyn ContributionRuntime>, LoadError> {
        let base = expand_command(
            &self.runner.command,
            &[
                ("name", descriptor.id.to_string()),
                ("source", descriptor.root.display().to_string()),
                ("entry", descriptor.entry_module.display().to_string()),
                ("install_dir", stamp.install_dir.display().to_string()),
            ],
        );
        let runtime = ProcessRuntime {
            label: format!("runner[{}]", descriptor.id),
            base,
            working_dir: descriptor.root.clone(),
            envs: vec![
                (
                    crate::build::CONTRIBUTION_ENV.to_string(),
                    descriptor.id.to_string(),
                ),
                (
                    INSTALL_DIR_ENV.to_string(),
                    stamp.install_dir.display().to_string(),
                ),
            ],
            examples: Vec::new(),
        };

        let output = runtime.invoke(&["list"]).await?;
        let examples = match parse_reply(&output.stdout) {
            Some(RunnerReply::Examples { examples }) if output.passed() => examples,
            Some(RunnerReply::Error { error }) => return Err(LoadError::Import(error.message)),
            Some(_) if output.passed() => {
                return Err(LoadError::Protocol(
                    "`list` did not return an example list".to_string(),
                ))
            }
            _ => {
                return Err(LoadError::Import(format!(
                    "runner exited with code {}\n{}",
                    output.exit_code,
                    output.diagnostic_text()
                )))
            }
        };
        debug!(contribution = %descriptor.id, examples = ?examples, "Runner loaded contribution");

        Ok(Box::new(ProcessRuntime {
            examples,
            ..runtime
        }))
    }
}

/// A contribution driven through runner invocations.
#[derive(Debug, Clone)]
pub struct ProcessRuntime {
    label: String,
    base: Vec<String>,
    working_dir: std::path::PathBuf,
    envs: Vec<(String, String)>,
    examples: Vec<String>,
}

impl ProcessRuntime {
    async fn invoke(&self, action: &[&str]) -> Result<ToolOutput, ToolError> {
        let mut command = self.base.clone();
        command.extend(action.iter().map(|a| a.to_string()));
        let mut invocation = ToolInvocation::new(self.label.clone(), command)
            .working_dir(&self.working_dir);
        invocation.envs = self.envs.clone();
        run_tool(&invocation).await
    }
}

#[async_trait]
impl ContributionRuntime for ProcessRuntime {
    fn list_example_names(&self) -> Vec<String> {
        self.examples.clone()
    }

    async fn run(&self, example: &str, input: Option<&Path>) -> Result<ExampleValue, RuntimeError> {
        let input = input.map(|p| p.display().to_string());
        let mut action = vec!["run", example];
        if let Some(input) = input.as_deref() {
            action.push(input);
        }

        let output = self
            .invoke(&action)
            .await
            .map_err(|e| RuntimeError::Raised(e.to_string()))?;

        match parse_reply(&output.stdout) {
            Some(RunnerReply::Value(value)) if output.passed() => Ok(value),
            Some(RunnerReply::Error { error }) => Err(runtime_error(error)),
            Some(_) if output.passed() => Err(RuntimeError::Raised(
                "runner did not return a value".to_string(),
            )),
            _ => Err(RuntimeError::Raised(format!(
                "runner exited with code {}\n{}",
                output.exit_code,
                output.diagnostic_text()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value_reply() {
        let reply = parse_reply("loading...\n{\"shape\": [3, 4], \"dtype\": \"float64\"}\n");
        match reply {
            Some(RunnerReply::Value(value)) => {
                assert_eq!(value, ExampleValue::new(vec![3, 4], "float64"));
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn test_parse_error_reply() {
        let reply = parse_reply(
            r#"{"error": {"kind": "signature", "message": "forward() missing 1 argument"}}"#,
        );
        match reply {
            Some(RunnerReply::Error { error }) => {
                assert_eq!(
                    runtime_error(error),
                    RuntimeError::Signature("forward() missing 1 argument".to_string())
                );
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn test_parse_examples_reply() {
        let reply = parse_reply("{\"examples\": [\"small\", \"large\"]}");
        assert!(matches!(
            reply,
            Some(RunnerReply::Examples { ref examples }) if examples == &["small", "large"]
        ));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_reply("Traceback (most recent call last):\n  ...\n").is_none());
        assert!(parse_reply("").is_none());
    }

    #[test]
    fn test_unknown_error_kind_is_raised() {
        let err = runtime_error(ErrorBody {
            kind: "memory".to_string(),
            message: "MemoryError".to_string(),
        });
        assert_eq!(err, RuntimeError::Raised("MemoryError".to_string()));
    }
}
