// action-ledger-rs/src/sink.rs

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::ledger::ActionLedger;
use crate::record::{InteractionOutcome, InteractionRecord};

/// Receives one record per finished request.
///
/// `record` must return promptly and must not fail the caller; slow work
/// belongs on a background task.
pub trait InteractionSink: Send + Sync {
    fn record(&self, record: InteractionRecord);
}

/// Emits each record as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl InteractionSink for TracingSink {
    fn record(&self, record: InteractionRecord) {
        let intent = record
            .parsed_intent
            .as_ref()
            .map(|intent| intent.to_json())
            .unwrap_or_default();

        match &record.outcome {
            InteractionOutcome::Failed {
                error_kind,
                message,
            } => tracing::warn!(
                target: "nova::interaction",
                request_id = record.request_id,
                request = %record.request_text,
                raw = record.raw_classifier_response.as_deref().unwrap_or(""),
                parsed = %intent,
                outcome = record.outcome.label(),
                error_kind = %error_kind,
                error = %message,
                "Interaction failed"
            ),
            outcome => tracing::info!(
                target: "nova::interaction",
                request_id = record.request_id,
                request = %record.request_text,
                raw = record.raw_classifier_response.as_deref().unwrap_or(""),
                parsed = %intent,
                outcome = outcome.label(),
                "Interaction recorded"
            ),
        }
    }
}

/// Forwards records to a background task that appends them to an [`ActionLedger`].
#[derive(Debug, Clone)]
pub struct LedgerSink {
    tx: mpsc::UnboundedSender<InteractionRecord>,
}

/// The background half of a [`LedgerSink`].
#[derive(Debug)]
pub struct LedgerWriter {
    handle: JoinHandle<u64>,
}

impl LedgerSink {
    /// Start the writer task. Must be called inside a tokio runtime.
    pub fn spawn(ledger: ActionLedger) -> (Self, LedgerWriter) {
        let (tx, mut rx) = mpsc::unbounded_channel::<InteractionRecord>();

        let handle = tokio::task::spawn_blocking(move || {
            let mut written = 0u64;
            while let Some(record) = rx.blocking_recv() {
                match ledger.append(&record) {
                    Ok(entry) => {
                        written += 1;
                        tracing::trace!(sequence = entry.sequence, "Ledger entry appended");
                    }
                    Err(e) => tracing::error!(
                        request_id = record.request_id,
                        error = %e,
                        "Failed to append interaction to ledger"
                    ),
                }
            }
            written
        });

        (Self { tx }, LedgerWriter { handle })
    }
}

impl InteractionSink for LedgerSink {
    fn record(&self, record: InteractionRecord) {
        if let Err(e) = self.tx.send(record) {
            tracing::error!(request_id = e.0.request_id, "Ledger writer has stopped; record dropped");
        }
    }
}

impl LedgerWriter {
    /// Wait until every sender is dropped and all queued records are written.
    /// Returns the number of entries appended.
    pub async fn finish(self) -> u64 {
        match self.handle.await {
            Ok(written) => written,
            Err(e) => {
                tracing::error!(error = %e, "Ledger writer task failed");
                0
            }
        }
    }
}

/// Sends every record to each inner sink in order.
#[derive(Clone, Default)]
pub struct CompositeSink {
    sinks: Vec<Arc<dyn InteractionSink>>,
}

impl CompositeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn InteractionSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl InteractionSink for CompositeSink {
    fn record(&self, record: InteractionRecord) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.record(record.clone());
            }
            last.record(record);
        }
    }
}
