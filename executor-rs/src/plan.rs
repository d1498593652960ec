// executor-rs/src/plan.rs
// Execution plans and foreground/background mode derivation

use intent_schema::{Action, Command};

/// Trailing marker asking for a detached launch
pub const DETACH_MARKER: char = '&';

/// Process and resource inspection utilities. Their output is the answer the
/// user asked for, so they never run detached.
pub const INFO_COMMANDS: [&str; 9] = [
    "inxi",
    "lscpu",
    "free",
    "df",
    "top",
    "ps",
    "neofetch",
    "systeminfo",
    "uname",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Wait for exit and capture output
    Foreground,
    /// Launch detached and discard output
    Background,
}

/// What the executor will run for one approved command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub action: Action,
    pub mode: ExecutionMode,
    /// Shell command line for `run_command`, path for `open_file`
    pub command_line: String,
}

impl ExecutionPlan {
    /// Build the plan for a command. Only `run_command` honours the
    /// detachment marker; `open_file` and `shutdown` always run in the foreground.
    pub fn for_command(cmd: &Command) -> Self {
        match cmd.action {
            Action::RunCommand => {
                let (mode, command_line) = derive_mode(&cmd.target);
                Self {
                    action: cmd.action,
                    mode,
                    command_line,
                }
            }
            Action::OpenFile | Action::Shutdown => Self {
                action: cmd.action,
                mode: ExecutionMode::Foreground,
                command_line: cmd.target.trim().to_string(),
            },
        }
    }
}

/// Derive the execution mode from a command line.
///
/// A trailing `&` selects [`ExecutionMode::Background`] unless the line names
/// an information command, in which case the marker is dropped and the mode
/// is forced to [`ExecutionMode::Foreground`]. The returned command line never
/// carries the marker.
pub fn derive_mode(command_line: &str) -> (ExecutionMode, String) {
    let trimmed = command_line.trim();

    match strip_detach_marker(trimmed) {
        Some(stripped) if is_info_command(stripped) => {
            (ExecutionMode::Foreground, stripped.to_string())
        }
        Some(stripped) => (ExecutionMode::Background, stripped.to_string()),
        None => (ExecutionMode::Foreground, trimmed.to_string()),
    }
}

fn strip_detach_marker(line: &str) -> Option<&str> {
    let without = line.strip_suffix(DETACH_MARKER)?;
    // `&&` is a list operator, not a detachment request
    if without.ends_with(DETACH_MARKER) {
        return None;
    }
    Some(without.trim_end())
}

/// Whether any word of `command_line` is an information command.
///
/// Words are split on whitespace and shell operators and compared by
/// basename, so `/usr/bin/lscpu` and `sudo ps aux` match but `eclipse` does not.
pub fn is_info_command(command_line: &str) -> bool {
    command_line
        .split(|c: char| c.is_whitespace() || matches!(c, '|' | ';' | '&' | '(' | ')' | '`'))
        .filter(|word| !word.is_empty())
        .map(|word| word.rsplit('/').next().unwrap_or(word))
        .any(|name| INFO_COMMANDS.contains(&name))
}
