//! External tool invocation
//!
//! The archiver, the config generator and the interface generators are opaque
//! executables. [`ProcessRunner`] gives them a typed contract: a
//! [`ProcessCommand`] goes in, a [`ProcessOutput`] with exit code and captured
//! output comes out.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info};

use crate::error::{Result, SyncError};

/// A fully specified subprocess invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub cwd: PathBuf,
}

impl ProcessCommand {
    pub fn new(program: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Command line rendered for logs
    pub fn display(&self) -> String {
        let mut rendered = self.program.display().to_string();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(&arg.to_string_lossy());
        }
        rendered
    }
}

/// Exit status and captured output of a finished subprocess
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` when the process was terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external executables
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `command` to completion. A non-zero exit is reported through
    /// [`ProcessOutput::code`], not as an error.
    async fn run(&self, command: &ProcessCommand) -> Result<ProcessOutput>;
}

/// Runs commands with tokio, optionally bounded by a timeout
#[derive(Debug, Clone, Default)]
pub struct SystemProcessRunner {
    timeout: Option<Duration>,
}

impl SystemProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn run(&self, command: &ProcessCommand) -> Result<ProcessOutput> {
        info!("Running: {}", command.display());

        let child = AsyncCommand::new(&command.program)
            .args(&command.args)
            .current_dir(&command.cwd)
            .kill_on_drop(true)
            .output();

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child)
                .await
                .map_err(|_| SyncError::Timeout {
                    operation: command.display(),
                    seconds: limit.as_secs(),
                })?,
            None => child.await,
        }
        .map_err(|e| SyncError::Spawn {
            program: command.program.clone(),
            source: e,
        })?;

        let result = ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        for line in result.stdout.lines() {
            debug!("[{}] {}", program_name(&command.program), line);
        }

        Ok(result)
    }
}

/// Run `command` and turn a non-zero exit into [`SyncError::SubprocessFailed`]
pub async fn run_checked(
    runner: &dyn ProcessRunner,
    command: &ProcessCommand,
) -> Result<ProcessOutput> {
    let output = runner.run(command).await?;
    if output.success() {
        Ok(output)
    } else {
        Err(SyncError::SubprocessFailed {
            program: command.program.clone(),
            code: output.code,
            stderr: output.stderr.trim().to_string(),
        })
    }
}

fn program_name(program: &Path) -> String {
    program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    #[test]
    fn test_command_display() {
        let command = ProcessCommand::new("7zr.exe", "/ws")
            .arg("x")
            .arg("release.7z")
            .arg("-o.");
        assert_eq!(command.display(), "7zr.exe x release.7z -o.");
    }

    #[tokio::test]
    async fn test_run_checked_maps_non_zero_exit() {
        let mut runner = MockProcessRunner::new();
        runner.expect_run().times(1).returning(|_| {
            Ok(ProcessOutput {
                code: Some(2),
                stdout: String::new(),
                stderr: "bad appid\n".to_string(),
            })
        });

        let command = ProcessCommand::new("generate_emu_config.exe", "/ws").arg("480");
        let err = run_checked(&runner, &command).await.unwrap_err();

        assert_matches!(
            err,
            SyncError::SubprocessFailed { code: Some(2), ref stderr, .. } if stderr == "bad appid"
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let temp_dir = TempDir::new().unwrap();
        let runner = SystemProcessRunner::default();
        let command = ProcessCommand::new(temp_dir.path().join("does-not-exist"), temp_dir.path());

        let err = runner.run(&command).await.unwrap_err();
        assert_matches!(err, SyncError::Spawn { .. });
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_captures_output() {
        let temp_dir = TempDir::new().unwrap();
        let runner = SystemProcessRunner::default();
        let command = ProcessCommand::new("sh", temp_dir.path())
            .arg("-c")
            .arg("echo extracted; echo warn >&2; exit 3");

        let output = runner.run(&command).await.unwrap();
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout.trim(), "extracted");
        assert_eq!(output.stderr.trim(), "warn");
        assert!(!output.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_uses_working_directory() {
        let temp_dir = TempDir::new().unwrap();
        let runner = SystemProcessRunner::default();
        let command = ProcessCommand::new("sh", temp_dir.path())
            .arg("-c")
            .arg("touch marker");

        runner.run(&command).await.unwrap();
        assert!(temp_dir.path().join("marker").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_timeout() {
        let temp_dir = TempDir::new().unwrap();
        let runner = SystemProcessRunner::new(Some(Duration::from_millis(200)));
        let command = ProcessCommand::new("sleep", temp_dir.path()).arg("5");

        let err = runner.run(&command).await.unwrap_err();
        assert_matches!(err, SyncError::Timeout { .. });
    }
}
