// executor-rs/src/execution_logic.rs
// Core logic for running approved commands in the foreground or detached

use std::fmt;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use intent_schema::Action;
use thiserror::Error;
use tokio::time::timeout;

use crate::plan::{ExecutionMode, ExecutionPlan};
use crate::process::{ProcessSpawner, ProcessSpec, TokioSpawner};

/// Failure categories reported to the rest of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionErrorKind {
    SpawnFailed,
    Timeout,
    NonZeroExit,
}

impl ExecutionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionErrorKind::SpawnFailed => "spawn_failed",
            ExecutionErrorKind::Timeout => "timeout",
            ExecutionErrorKind::NonZeroExit => "non_zero_exit",
        }
    }
}

impl fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that end an execution without a usable result.
///
/// A non-zero exit is not an error here: the process ran and its output is
/// returned in [`ExecutionResult`], see [`ExecutionResult::failure_kind`].
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("failed to start `{command}`: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` did not finish within {}s", .timeout.as_secs_f64())]
    Timeout { command: String, timeout: Duration },
}

impl ExecutionError {
    pub fn kind(&self) -> ExecutionErrorKind {
        match self {
            ExecutionError::SpawnFailed { .. } => ExecutionErrorKind::SpawnFailed,
            ExecutionError::Timeout { .. } => ExecutionErrorKind::Timeout,
        }
    }
}

/// Outcome of a completed execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Combined output with terminal escape sequences removed. Always empty
    /// for background launches.
    pub stdout: String,
    /// For background launches this only says the launch succeeded.
    pub exit_succeeded: bool,
    pub exit_code: Option<i32>,
    pub mode: ExecutionMode,
}

impl ExecutionResult {
    fn launched() -> Self {
        Self {
            stdout: String::new(),
            exit_succeeded: true,
            exit_code: None,
            mode: ExecutionMode::Background,
        }
    }

    pub fn failure_kind(&self) -> Option<ExecutionErrorKind> {
        if self.exit_succeeded {
            None
        } else {
            Some(ExecutionErrorKind::NonZeroExit)
        }
    }
}

/// Runs execution plans. The pipeline depends on this seam only.
#[async_trait]
pub trait Execute: Send + Sync {
    async fn execute(
        &self,
        plan: &ExecutionPlan,
        timeout: Duration,
    ) -> Result<ExecutionResult, ExecutionError>;
}

/// Default executor backed by a [`ProcessSpawner`].
#[derive(Debug, Clone, Default)]
pub struct CommandExecutor<S = TokioSpawner> {
    spawner: S,
    dry_run: bool,
}

impl CommandExecutor<TokioSpawner> {
    pub fn new() -> Self {
        Self::with_spawner(TokioSpawner)
    }
}

impl<S: ProcessSpawner> CommandExecutor<S> {
    pub fn with_spawner(spawner: S) -> Self {
        Self {
            spawner,
            dry_run: false,
        }
    }

    /// When enabled nothing is spawned and every plan succeeds with empty output.
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    async fn run_foreground(
        &self,
        plan: &ExecutionPlan,
        spec: &ProcessSpec,
        limit: Duration,
    ) -> Result<ExecutionResult, ExecutionError> {
        let mut handle =
            self.spawner
                .spawn_captured(spec)
                .map_err(|source| ExecutionError::SpawnFailed {
                    command: plan.command_line.clone(),
                    source,
                })?;

        let waited = timeout(limit, handle.wait_with_output()).await;
        let output = match waited {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(ExecutionError::SpawnFailed {
                    command: plan.command_line.clone(),
                    source,
                })
            }
            Err(_) => {
                tracing::warn!(
                    command = %plan.command_line,
                    timeout_secs = limit.as_secs_f64(),
                    "Command timed out, terminating"
                );
                if let Err(e) = handle.terminate().await {
                    tracing::error!(command = %plan.command_line, error = %e, "Failed to terminate timed out command");
                }
                return Err(ExecutionError::Timeout {
                    command: plan.command_line.clone(),
                    timeout: limit,
                });
            }
        };

        let stdout = clean_output(&output.output);
        tracing::info!(
            command = %plan.command_line,
            exit_code = ?output.exit_code,
            output_bytes = stdout.len(),
            "Command finished"
        );

        Ok(ExecutionResult {
            stdout,
            exit_succeeded: output.success,
            exit_code: output.exit_code,
            mode: ExecutionMode::Foreground,
        })
    }

    fn run_background(
        &self,
        plan: &ExecutionPlan,
        spec: &ProcessSpec,
    ) -> Result<ExecutionResult, ExecutionError> {
        let pid = self
            .spawner
            .spawn_detached(spec)
            .map_err(|source| ExecutionError::SpawnFailed {
                command: plan.command_line.clone(),
                source,
            })?;
        tracing::info!(command = %plan.command_line, pid = ?pid, "Launched detached command");
        Ok(ExecutionResult::launched())
    }
}

#[async_trait]
impl<S: ProcessSpawner> Execute for CommandExecutor<S> {
    async fn execute(
        &self,
        plan: &ExecutionPlan,
        timeout: Duration,
    ) -> Result<ExecutionResult, ExecutionError> {
        // `shutdown` ignores its target
        if plan.action != Action::Shutdown && plan.command_line.is_empty() {
            return Err(ExecutionError::SpawnFailed {
                command: String::new(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
            });
        }

        if self.dry_run {
            tracing::info!(action = %plan.action, command = %plan.command_line, mode = ?plan.mode, "Dry run, not executing");
            return Ok(ExecutionResult {
                stdout: String::new(),
                exit_succeeded: true,
                exit_code: Some(0),
                mode: plan.mode,
            });
        }

        let spec = ProcessSpec::for_plan(plan);
        tracing::debug!(program = %spec.program, args = ?spec.args, "Spawning process");

        match plan.mode {
            ExecutionMode::Foreground => self.run_foreground(plan, &spec, timeout).await,
            ExecutionMode::Background => self.run_background(plan, &spec),
        }
    }
}

fn clean_output(raw: &[u8]) -> String {
    let stripped = strip_ansi_escapes::strip(raw);
    String::from_utf8_lossy(&stripped).into_owned()
}
