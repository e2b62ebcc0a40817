//! Command runners
//!
//! The strategies only ever name opaque shell commands. Running them is
//! delegated to a [`CommandRunner`] so tests and `--dry-run` can swap in a
//! runner that never touches the system.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::errors::ExecutionError;
use crate::observability::telemetry::safe_field;

/// Captured result of a successful command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run one command; a non-zero exit is an error
    async fn run(&self, command: &str) -> Result<CommandOutput, ExecutionError>;
}

const MAX_CAPTURE_CHARS: usize = 4000;

fn truncate(s: &str) -> String {
    s.chars().take(MAX_CAPTURE_CHARS).collect()
}

/// Runs commands through `sh -c` with a per-command timeout
pub struct ShellCommandRunner {
    timeout: Duration,
    working_dir: Option<PathBuf>,
}

impl ShellCommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl CommandRunner for ShellCommandRunner {
    async fn run(&self, command: &str) -> Result<CommandOutput, ExecutionError> {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(command).kill_on_drop(true);

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        debug!(command = %safe_field(command), "Running remediation command");

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ExecutionError::Spawn {
                    command: command.to_string(),
                    message: e.to_string(),
                })
            }
            Err(_) => {
                return Err(ExecutionError::CommandTimeout {
                    command: command.to_string(),
                    seconds: self.timeout.as_secs(),
                })
            }
        };

        let stdout = truncate(&String::from_utf8_lossy(&output.stdout));
        let stderr = truncate(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(CommandOutput { stdout, stderr })
        } else {
            Err(ExecutionError::CommandFailed {
                command: command.to_string(),
                status: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            })
        }
    }
}

/// Logs each command and reports success without running it
#[derive(Debug, Default)]
pub struct DryRunCommandRunner;

#[async_trait]
impl CommandRunner for DryRunCommandRunner {
    async fn run(&self, command: &str) -> Result<CommandOutput, ExecutionError> {
        info!(command = %safe_field(command), "[dry-run] would run command");
        Ok(CommandOutput::default())
    }
}
