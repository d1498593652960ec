// action-ledger-rs/src/record.rs

use chrono::{DateTime, Utc};
use intent_schema::Intent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier for one record.
pub type RecordId = Uuid;

/// How a request ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InteractionOutcome {
    /// Replied or executed. `exit_succeeded` is present only when a command ran.
    Done { exit_succeeded: Option<bool> },
    /// Refused by the safety gate
    Blocked { reason: String },
    /// Declined, timed out waiting for the operator, or cancelled by the caller
    Cancelled,
    /// Any error that ended the request
    Failed { error_kind: String, message: String },
}

impl InteractionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            InteractionOutcome::Done { .. } => "done",
            InteractionOutcome::Blocked { .. } => "blocked",
            InteractionOutcome::Cancelled => "cancelled",
            InteractionOutcome::Failed { .. } => "failed",
        }
    }
}

/// Write-once description of one handled request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub id: RecordId,
    pub request_id: u64,
    pub request_text: String,
    /// Absent when classification never returned
    pub raw_classifier_response: Option<String>,
    /// Absent when the response failed validation
    pub parsed_intent: Option<Intent>,
    pub outcome: InteractionOutcome,
    pub recorded_at: DateTime<Utc>,
}

impl InteractionRecord {
    pub fn new(
        request_id: u64,
        request_text: impl Into<String>,
        raw_classifier_response: Option<String>,
        parsed_intent: Option<Intent>,
        outcome: InteractionOutcome,
    ) -> Self {
        Self {
            id: RecordId::new_v4(),
            request_id,
            request_text: request_text.into(),
            raw_classifier_response,
            parsed_intent,
            outcome,
            recorded_at: Utc::now(),
        }
    }
}
