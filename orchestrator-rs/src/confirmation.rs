// orchestrator-rs/src/confirmation.rs
// Operator confirmation as an explicit suspend-and-resume point

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use intent_schema::Command;
use tokio::sync::{mpsc, oneshot};

/// What the operator is asked to approve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationRequest {
    pub request_id: u64,
    pub command: Command,
    /// e.g. `Execute run_command → ls -la?`
    pub prompt: String,
}

/// Asks the operator. Returns `true` only on explicit approval.
#[async_trait]
pub trait ConfirmationPrompt: Send + Sync {
    async fn ask(&self, request: ConfirmationRequest) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Approved,
    Declined,
    TimedOut,
}

impl ConfirmationOutcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, ConfirmationOutcome::Approved)
    }
}

/// Applies the confirmation timeout around a [`ConfirmationPrompt`].
///
/// Each call waits on its own prompt, so requests confirm independently.
#[derive(Clone)]
pub struct ConfirmationBroker {
    prompt: Arc<dyn ConfirmationPrompt>,
    timeout: Option<Duration>,
}

impl ConfirmationBroker {
    /// `timeout` of `None` waits for the operator indefinitely.
    pub fn new(prompt: Arc<dyn ConfirmationPrompt>, timeout: Option<Duration>) -> Self {
        Self { prompt, timeout }
    }

    pub async fn confirm(&self, request_id: u64, command: &Command) -> ConfirmationOutcome {
        let request = ConfirmationRequest {
            request_id,
            command: command.clone(),
            prompt: command.confirmation_prompt(),
        };

        let answer = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.prompt.ask(request)).await {
                Ok(answer) => answer,
                Err(_) => {
                    tracing::info!(request_id, timeout_secs = limit.as_secs(), "Confirmation timed out");
                    return ConfirmationOutcome::TimedOut;
                }
            },
            None => self.prompt.ask(request).await,
        };

        if answer {
            ConfirmationOutcome::Approved
        } else {
            ConfirmationOutcome::Declined
        }
    }
}

/// A confirmation waiting for the operator's answer.
#[derive(Debug)]
pub struct PendingConfirmation {
    pub request: ConfirmationRequest,
    responder: oneshot::Sender<bool>,
}

impl PendingConfirmation {
    pub fn new(request: ConfirmationRequest, responder: oneshot::Sender<bool>) -> Self {
        Self { request, responder }
    }

    pub fn answer(self, approved: bool) {
        // The request may have been cancelled or timed out meanwhile
        if self.responder.send(approved).is_err() {
            tracing::debug!(request_id = self.request.request_id, "Confirmation answered after the request ended");
        }
    }

    /// Whether the waiting request has already given up.
    pub fn is_abandoned(&self) -> bool {
        self.responder.is_closed()
    }

    /// Resolves once the waiting request gives up.
    pub async fn abandoned(&mut self) {
        self.responder.closed().await
    }
}

/// [`ConfirmationPrompt`] that forwards each question to a front-end over a channel.
///
/// Dropping a [`PendingConfirmation`] without answering counts as "no".
#[derive(Debug, Clone)]
pub struct ChannelConfirmationPrompt {
    tx: mpsc::UnboundedSender<PendingConfirmation>,
}

impl ChannelConfirmationPrompt {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PendingConfirmation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ConfirmationPrompt for ChannelConfirmationPrompt {
    async fn ask(&self, request: ConfirmationRequest) -> bool {
        let (responder, answer) = oneshot::channel();
        if self
            .tx
            .send(PendingConfirmation::new(request, responder))
            .is_err()
        {
            tracing::warn!("No front-end is listening for confirmations; declining");
            return false;
        }
        answer.await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intent_schema::Action;

    fn shutdown() -> Command {
        Command {
            action: Action::Shutdown,
            target: "now".into(),
            confirm: true,
            safe: false,
        }
    }

    #[tokio::test]
    async fn test_channel_prompt_round_trip() {
        let (prompt, mut rx) = ChannelConfirmationPrompt::new();
        let broker = ConfirmationBroker::new(Arc::new(prompt), None);

        let answering = tokio::spawn(async move {
            let pending = rx.recv().await.unwrap();
            assert_eq!(pending.request.prompt, "Execute shutdown → now?");
            pending.answer(true);
        });

        assert_eq!(broker.confirm(1, &shutdown()).await, ConfirmationOutcome::Approved);
        answering.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_pending_counts_as_no() {
        let (prompt, mut rx) = ChannelConfirmationPrompt::new();
        let broker = ConfirmationBroker::new(Arc::new(prompt), None);

        tokio::spawn(async move {
            drop(rx.recv().await);
        });

        assert_eq!(broker.confirm(2, &shutdown()).await, ConfirmationOutcome::Declined);
    }

    #[tokio::test]
    async fn test_closed_channel_declines() {
        let (prompt, rx) = ChannelConfirmationPrompt::new();
        drop(rx);
        let broker = ConfirmationBroker::new(Arc::new(prompt), None);
        assert_eq!(broker.confirm(3, &shutdown()).await, ConfirmationOutcome::Declined);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_confirmation_times_out() {
        let (prompt, mut rx) = ChannelConfirmationPrompt::new();
        let broker = ConfirmationBroker::new(Arc::new(prompt), Some(Duration::from_secs(120)));

        let outcome = broker.confirm(4, &shutdown()).await;
        assert_eq!(outcome, ConfirmationOutcome::TimedOut);

        let pending = rx.recv().await.unwrap();
        assert!(pending.is_abandoned());
    }
}
