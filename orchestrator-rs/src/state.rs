// orchestrator-rs/src/state.rs

use std::fmt;

use serde::Serialize;

/// Per-request pipeline state.
///
/// ```text
/// Idle -> Classifying -> Conversing -> Done
///                     -> GateChecking -> Blocked
///                                     -> [AwaitingConfirmation -> Cancelled]
///                                     -> Executing -> [Summarizing] -> Done
/// ```
///
/// Any non-terminal state may also end in `Failed` or `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Classifying,
    Conversing,
    GateChecking,
    AwaitingConfirmation,
    Executing,
    Summarizing,
    Done,
    Blocked,
    Cancelled,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Done
                | PipelineState::Blocked
                | PipelineState::Cancelled
                | PipelineState::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Classifying => "classifying",
            PipelineState::Conversing => "conversing",
            PipelineState::GateChecking => "gate_checking",
            PipelineState::AwaitingConfirmation => "awaiting_confirmation",
            PipelineState::Executing => "executing",
            PipelineState::Summarizing => "summarizing",
            PipelineState::Done => "done",
            PipelineState::Blocked => "blocked",
            PipelineState::Cancelled => "cancelled",
            PipelineState::Failed => "failed",
        }
    }

    /// How a front-end should depict the assistant while in this state.
    pub fn mood(&self) -> AssistantMood {
        match self {
            PipelineState::Classifying
            | PipelineState::GateChecking
            | PipelineState::Executing
            | PipelineState::Summarizing => AssistantMood::Processing,
            PipelineState::Idle
            | PipelineState::AwaitingConfirmation
            | PipelineState::Blocked
            | PipelineState::Cancelled => AssistantMood::Idle,
            PipelineState::Conversing | PipelineState::Done => AssistantMood::Speaking,
            PipelineState::Failed => AssistantMood::Error,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visual state of the assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistantMood {
    Idle,
    Processing,
    Speaking,
    Error,
}
