//! Gate decision logic

use std::fmt;
use std::path::{Component, Path};

use intent_schema::{Action, Command};
use serde::Serialize;

use crate::policy::Policy;

/// Why the gate decided the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// The action kind is not in the action whitelist
    ActionNotWhitelisted,
    /// `open_file` target is outside every whitelisted prefix
    PathNotWhitelisted,
    Approved,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActionNotWhitelisted => write!(f, "action not whitelisted"),
            Self::PathNotWhitelisted => write!(f, "path not whitelisted"),
            Self::Approved => write!(f, "approved"),
        }
    }
}

/// Outcome of [`evaluate`]. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyDecision {
    allowed: bool,
    requires_confirmation: bool,
    reason: DecisionReason,
}

impl SafetyDecision {
    fn deny(reason: DecisionReason) -> Self {
        Self {
            allowed: false,
            requires_confirmation: false,
            reason,
        }
    }

    fn approve(requires_confirmation: bool) -> Self {
        Self {
            allowed: true,
            requires_confirmation,
            reason: DecisionReason::Approved,
        }
    }

    pub fn allowed(&self) -> bool {
        self.allowed
    }

    pub fn requires_confirmation(&self) -> bool {
        self.requires_confirmation
    }

    pub fn reason(&self) -> DecisionReason {
        self.reason
    }
}

/// Decide whether `cmd` may proceed under `policy`.
///
/// 1. Action outside the action whitelist: denied, nothing else is checked.
/// 2. `open_file` whose target is not under a whitelisted prefix: denied.
/// 3. Otherwise allowed. Confirmation is required when the global toggle is
///    on, and always when the classifier flagged the command `safe: false`.
pub fn evaluate(cmd: &Command, policy: &Policy) -> SafetyDecision {
    if !policy.action_whitelist.contains(&cmd.action) {
        return SafetyDecision::deny(DecisionReason::ActionNotWhitelisted);
    }

    if cmd.action == Action::OpenFile && !path_is_whitelisted(&cmd.target, policy) {
        return SafetyDecision::deny(DecisionReason::PathNotWhitelisted);
    }

    SafetyDecision::approve(policy.force_confirm || !cmd.safe)
}

fn path_is_whitelisted(target: &str, policy: &Policy) -> bool {
    let target = Path::new(target.trim());

    // `..` could walk back out of an allowed prefix
    if target
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return false;
    }

    policy
        .path_whitelist
        .iter()
        .any(|prefix| target.starts_with(prefix))
}
