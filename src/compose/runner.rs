// SPDX-License-Identifier: AGPL-3.0-or-later
//! Command runner trait and the process-spawning implementation

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{OutpostError, Result};

/// How a child process is wired to the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoMode {
    /// Inherit stdin/stdout/stderr (passphrase prompts reach the operator)
    Interactive,
    /// Capture stdout and stderr
    Capture,
}

/// A fully specified external command
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Program to run
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
    /// Working directory
    pub cwd: Option<PathBuf>,
    /// Terminal wiring
    pub mode: IoMode,
}

impl Invocation {
    /// Render as a single shell-like line for logs and dry runs
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Result of a finished command
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    /// Whether the process exited with status zero
    pub success: bool,
    /// Exit code, if the process was not killed by a signal
    pub code: Option<i32>,
    /// Captured stdout (empty in interactive mode)
    pub stdout: String,
    /// Captured stderr (empty in interactive mode)
    pub stderr: String,
}

impl CommandOutput {
    /// A successful run with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed run with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Convert an unsuccessful exit into an error
    pub fn into_result(self, invocation: &Invocation) -> Result<Self> {
        if self.success {
            return Ok(self);
        }

        let status = self
            .code
            .map(|c| format!("exit status {}", c))
            .unwrap_or_else(|| "terminated by signal".to_string());
        let message = if self.stderr.trim().is_empty() {
            status
        } else {
            format!("{}: {}", status, self.stderr.trim())
        };

        Err(OutpostError::CommandFailed {
            command: invocation.display(),
            message,
        })
    }
}

/// Executes [`Invocation`]s
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion
    ///
    /// A non-zero exit is reported in [`CommandOutput::success`], not as an
    /// error; `Err` means the process could not be started at all.
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// Runner that spawns real processes
pub struct ProcessRunner {
    /// Whether to run in dry-run mode (no actual execution)
    dry_run: bool,
}

impl ProcessRunner {
    /// Create a new runner
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        info!(command = %invocation.display(), "Executing command");

        if self.dry_run {
            return Ok(CommandOutput::ok(format!(
                "[DRY RUN] Would execute: {}",
                invocation.display()
            )));
        }

        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);

        if let Some(dir) = &invocation.cwd {
            command.current_dir(dir);
        }

        for (key, value) in &invocation.env {
            command.env(key, value);
        }

        match invocation.mode {
            IoMode::Interactive => {
                command.stdin(Stdio::inherit());
                command.stdout(Stdio::inherit());
                command.stderr(Stdio::inherit());
            }
            IoMode::Capture => {
                command.stdin(Stdio::null());
                command.stdout(Stdio::piped());
                command.stderr(Stdio::piped());
            }
        }

        let child = command.spawn().map_err(|e| OutpostError::CommandFailed {
            command: invocation.display(),
            message: format!("failed to start: {}", e),
        })?;
        let output = child.wait_with_output().await?;

        debug!(
            command = %invocation.program,
            status = ?output.status.code(),
            "Command finished"
        );

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture(program: &str, args: &[&str]) -> Invocation {
        Invocation {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            env: Vec::new(),
            cwd: None,
            mode: IoMode::Capture,
        }
    }

    #[tokio::test]
    async fn test_run_dry_run() {
        let runner = ProcessRunner::new(true);
        let output = runner.run(&capture("false", &[])).await.unwrap();
        assert!(output.success);
        assert!(output.stdout.contains("DRY RUN"));
    }

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let runner = ProcessRunner::new(false);
        let output = runner.run(&capture("echo", &["test output"])).await.unwrap();
        assert!(output.success);
        assert!(output.stdout.contains("test output"));
    }

    #[tokio::test]
    async fn test_run_reports_failure_status() {
        let runner = ProcessRunner::new(false);
        let invocation = capture("false", &[]);
        let output = runner.run(&invocation).await.unwrap();
        assert!(!output.success);
        assert!(output.into_result(&invocation).is_err());
    }

    #[tokio::test]
    async fn test_run_passes_env() {
        let runner = ProcessRunner::new(false);
        let mut invocation = capture("sh", &["-c", "echo $OUTPOST_MARKER"]);
        invocation.env.push(("OUTPOST_MARKER".to_string(), "visible".to_string()));
        let output = runner.run(&invocation).await.unwrap();
        assert_eq!(output.stdout.trim(), "visible");
    }

    #[tokio::test]
    async fn test_run_missing_program() {
        let runner = ProcessRunner::new(false);
        let result = runner
            .run(&capture("outpost-no-such-program", &[]))
            .await;
        assert!(matches!(result, Err(OutpostError::CommandFailed { .. })));
    }

    #[test]
    fn test_failed_output_message() {
        let invocation = capture("docker-compose", &["run"]);
        let err = CommandOutput::failed(2, "boom\n")
            .into_result(&invocation)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Command 'docker-compose run' failed: exit status 2: boom"
        );
    }
}
