//! Intent data model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ParseError;

/// The closed set of actions a command may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Open a file or application with the desktop opener
    OpenFile,
    /// Power the machine off
    Shutdown,
    /// Run a free-form shell command
    RunCommand,
}

impl Action {
    /// Every action kind, in declaration order.
    pub const ALL: [Action; 3] = [Action::OpenFile, Action::Shutdown, Action::RunCommand];

    /// Wire name used by the classifier (`"open_file"`, `"shutdown"`, `"run_command"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Action::OpenFile => "open_file",
            Action::Shutdown => "shutdown",
            Action::RunCommand => "run_command",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open_file" => Ok(Action::OpenFile),
            "shutdown" => Ok(Action::Shutdown),
            "run_command" => Ok(Action::RunCommand),
            other => Err(ParseError::UnknownAction(other.to_string())),
        }
    }
}

/// A request to act on the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub action: Action,
    /// Path for `open_file`, command line for `run_command`
    pub target: String,
    /// The classifier asks for operator confirmation
    pub confirm: bool,
    /// The classifier's own risk flag; `false` always forces confirmation
    pub safe: bool,
}

impl Command {
    /// Operator-facing description, e.g. `Execute run_command → ls -la?`
    pub fn confirmation_prompt(&self) -> String {
        format!("Execute {} → {}?", self.action, self.target)
    }
}

/// A plain reply with nothing to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub response: String,
}

/// The structured interpretation of a request. Exactly one variant is populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Intent {
    Command(Command),
    Conversation(Conversation),
}

impl Intent {
    /// Discriminator value on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Intent::Command(_) => "command",
            Intent::Conversation(_) => "conversation",
        }
    }

    /// Serialize back into the wire shape accepted by [`crate::parse`].
    pub fn to_json(&self) -> String {
        // A struct of strings and bools always serializes
        serde_json::to_string(self).unwrap_or_default()
    }
}
