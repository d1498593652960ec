//! Executor Library
//! Runs commands that have already passed the safety gate, either detached
//! in the background or in the foreground with captured output and a bounded wait.

mod execution_logic;
mod plan;
mod process;

pub use execution_logic::{
    CommandExecutor, Execute, ExecutionError, ExecutionErrorKind, ExecutionResult,
};
pub use plan::{derive_mode, is_info_command, ExecutionMode, ExecutionPlan, INFO_COMMANDS};
pub use process::{ProcessHandle, ProcessOutput, ProcessSpawner, ProcessSpec, TokioSpawner};
