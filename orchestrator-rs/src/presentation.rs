// orchestrator-rs/src/presentation.rs
// Seam between the pipeline and whatever shows results to the operator

use std::fmt;

use crate::state::PipelineState;

/// Who a message is from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageSource {
    /// Replies and summaries
    Assistant,
    /// Refusals, cancellations and errors
    System,
}

impl fmt::Display for MessageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageSource::Assistant => f.write_str("Nova"),
            MessageSource::System => f.write_str("System"),
        }
    }
}

/// Receives progress and results for every request.
///
/// Calls for one request arrive in stage order. Calls for different
/// requests may interleave. Implementations must not block.
pub trait PresentationSink: Send + Sync {
    fn on_status_update(&self, request_id: u64, text: &str);

    fn on_state_change(&self, request_id: u64, state: PipelineState);

    /// Called exactly once per request, with the terminal reply.
    fn on_message(&self, request_id: u64, source: MessageSource, text: &str);

    /// Text suitable for speech output. Front-ends without a voice ignore it.
    fn on_speak(&self, _request_id: u64, _text: &str) {}
}

/// Fixed operator-facing texts.
pub mod messages {
    pub const PROCESSING: &str = "Processing your request...";
    pub const AWAITING_CONFIRMATION: &str = "Waiting for confirmation...";
    pub const EXECUTING: &str = "Executing command...";
    pub const READY: &str = "Nova is ready. Type a command or question.";
    pub const REFUSED: &str = "Sorry, that command is not allowed for security reasons.";
    pub const CANCELLED: &str = "Command cancelled.";
    pub const EXECUTED: &str = "Command executed successfully.";
    pub const INTERNAL_ERROR: &str = "Something went wrong while handling that request.";

    pub fn launched_in_background(command_line: &str) -> String {
        format!(
            "The {} command was successfully launched in the background.",
            command_line
        )
    }

    pub fn parse_failed(error: &str) -> String {
        format!("Error parsing response: {}", error)
    }

    pub fn execution_failed(error: &str) -> String {
        format!("Error executing command: {}", error)
    }

    pub fn classifier_unavailable(error: &str) -> String {
        format!("The language service is unavailable: {}", error)
    }
}
