// orchestrator-rs/src/error.rs

use error_handling::sanitize_message;
use executor::{ExecutionError, ExecutionErrorKind};
use intent_schema::ParseError;
use safety_gate::DecisionReason;
use thiserror::Error;

use crate::presentation::messages;

/// Every way a request can end other than `Done`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid classifier response: {0}")]
    Parse(#[from] ParseError),

    #[error("blocked by safety policy: {0}")]
    SafetyViolation(DecisionReason),

    #[error("cancelled")]
    UserCancelled,

    #[error("execution failed: {0}")]
    Execution(#[from] ExecutionError),

    /// Foreground command failed without printing anything to explain itself
    #[error("command exited with status {}", .exit_code.map_or_else(|| "unknown".to_string(), |c| c.to_string()))]
    CommandFailed { exit_code: Option<i32> },

    #[error("classification service unavailable: {0}")]
    ClassifierUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Stable name for logs and the interaction ledger.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Parse(_) => "parse_error",
            PipelineError::SafetyViolation(_) => "safety_violation",
            PipelineError::UserCancelled => "user_cancelled",
            PipelineError::Execution(e) => e.kind().as_str(),
            PipelineError::CommandFailed { .. } => ExecutionErrorKind::NonZeroExit.as_str(),
            PipelineError::ClassifierUnavailable(_) => "classifier_unavailable",
            PipelineError::Internal(_) => "internal",
        }
    }

    /// Text shown to the operator, with anything secret-looking redacted.
    pub fn user_message(&self) -> String {
        let text = match self {
            PipelineError::Parse(e) => messages::parse_failed(&e.to_string()),
            PipelineError::SafetyViolation(_) => messages::REFUSED.to_string(),
            PipelineError::UserCancelled => messages::CANCELLED.to_string(),
            PipelineError::Execution(e) => messages::execution_failed(&e.to_string()),
            PipelineError::CommandFailed { .. } => messages::execution_failed(&self.to_string()),
            PipelineError::ClassifierUnavailable(e) => messages::classifier_unavailable(e),
            PipelineError::Internal(_) => messages::INTERNAL_ERROR.to_string(),
        };
        sanitize_message(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fixed_texts() {
        assert_eq!(
            PipelineError::SafetyViolation(DecisionReason::ActionNotWhitelisted).user_message(),
            "Sorry, that command is not allowed for security reasons."
        );
        assert_eq!(PipelineError::UserCancelled.user_message(), "Command cancelled.");
    }

    #[test]
    fn test_execution_kinds() {
        let err = PipelineError::Execution(ExecutionError::Timeout {
            command: "top".into(),
            timeout: Duration::from_secs(1),
        });
        assert_eq!(err.kind(), "timeout");
        assert!(err.user_message().starts_with("Error executing command: "));

        let failed = PipelineError::CommandFailed { exit_code: Some(2) };
        assert_eq!(failed.kind(), "non_zero_exit");
        assert!(failed.user_message().contains("status 2"));
    }

    #[test]
    fn test_parse_error_message() {
        let err = PipelineError::from(ParseError::MissingDiscriminator);
        assert_eq!(err.kind(), "parse_error");
        assert!(err.user_message().starts_with("Error parsing response: "));
    }

    #[test]
    fn test_unavailable_message_is_sanitized() {
        let err = PipelineError::ClassifierUnavailable(
            "Unauthorized: bad key sk-abcdefghijklmnopqrstuvwx".to_string(),
        );
        assert!(!err.user_message().contains("sk-abcdefghijklmnop"));
    }
}
