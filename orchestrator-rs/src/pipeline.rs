// orchestrator-rs/src/pipeline.rs
// Per-request state machine and the bounded worker pool that runs it

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use action_ledger::{InteractionOutcome, InteractionRecord, InteractionSink};
use config_rs::AssistantConfig;
use executor::{Execute, ExecutionMode, ExecutionPlan};
use futures::FutureExt;
use intent_schema::Intent;
use llm_client::{classification_prompt, LanguageModel};
use safety_gate::{evaluate, Policy, PolicyError, PolicyHandle};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::confirmation::{ConfirmationBroker, ConfirmationPrompt};
use crate::error::PipelineError;
use crate::presentation::{messages, MessageSource, PresentationSink};
use crate::state::PipelineState;
use crate::summarizer::Summarizer;

/// External collaborators of the pipeline.
#[derive(Clone)]
pub struct PipelineDeps {
    pub model: Arc<dyn LanguageModel>,
    pub executor: Arc<dyn Execute>,
    pub presentation: Arc<dyn PresentationSink>,
    pub confirmation: Arc<dyn ConfirmationPrompt>,
    pub interactions: Arc<dyn InteractionSink>,
}

/// Timeouts and pool size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub classify_timeout: Duration,
    pub summary_timeout: Duration,
    pub execution_timeout: Duration,
    /// `None` waits for the operator indefinitely
    pub confirmation_timeout: Option<Duration>,
    pub max_concurrent_requests: usize,
    /// Operating system name given to the model
    pub os_distro: String,
}

impl PipelineSettings {
    pub fn from_config(config: &AssistantConfig, os_distro: impl Into<String>) -> Self {
        Self {
            classify_timeout: config.classify_timeout,
            summary_timeout: config.summary_timeout,
            execution_timeout: config.execution_timeout,
            confirmation_timeout: config.confirmation_timeout,
            max_concurrent_requests: config.max_concurrent_requests.max(1),
            os_distro: os_distro.into(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&AssistantConfig::default(), "Linux")
    }
}

/// Terminal result of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub request_id: u64,
    pub state: PipelineState,
    pub outcome: InteractionOutcome,
    /// The single message emitted for this request
    pub message: String,
}

/// Handle to a submitted request.
///
/// Dropping the handle does not cancel the request.
#[derive(Debug)]
pub struct RequestHandle {
    id: u64,
    cancel: watch::Sender<bool>,
    join: JoinHandle<PipelineReport>,
}

impl RequestHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Ask the request to stop. Honoured while waiting for a worker, during
    /// classification and during confirmation; once execution has started the
    /// request runs to completion.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn wait(self) -> PipelineReport {
        match self.join.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(request_id = self.id, error = %e, "Request task did not complete");
                PipelineReport {
                    request_id: self.id,
                    state: PipelineState::Failed,
                    outcome: InteractionOutcome::Failed {
                        error_kind: "internal".to_string(),
                        message: e.to_string(),
                    },
                    message: messages::INTERNAL_ERROR.to_string(),
                }
            }
        }
    }
}

/// Accepts requests and runs each one as an independent task.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    deps: PipelineDeps,
    settings: PipelineSettings,
    policy: PolicyHandle,
    workers: Arc<Semaphore>,
    broker: ConfirmationBroker,
    summarizer: Summarizer,
    next_id: AtomicU64,
}

impl PipelineOrchestrator {
    pub fn new(deps: PipelineDeps, settings: PipelineSettings, policy: PolicyHandle) -> Self {
        let broker = ConfirmationBroker::new(deps.confirmation.clone(), settings.confirmation_timeout);
        let summarizer = Summarizer::new(
            deps.model.clone(),
            settings.os_distro.clone(),
            settings.summary_timeout,
        );
        let workers = Arc::new(Semaphore::new(settings.max_concurrent_requests.max(1)));

        tracing::info!(
            workers = settings.max_concurrent_requests,
            os = %settings.os_distro,
            "Pipeline orchestrator ready"
        );

        Self {
            inner: Arc::new(Inner {
                deps,
                settings,
                policy,
                workers,
                broker,
                summarizer,
                next_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.inner.settings
    }

    /// Current policy.
    pub async fn policy(&self) -> Policy {
        self.inner.policy.snapshot().await
    }

    /// The single serialized entry point for policy changes.
    pub async fn update_policy<F>(&self, change: F) -> Result<Policy, PolicyError>
    where
        F: FnOnce(&mut Policy),
    {
        self.inner.policy.update(change).await
    }

    /// Settings toggle for global confirmation.
    pub async fn set_force_confirm(&self, enabled: bool) -> Policy {
        self.inner.policy.set_force_confirm(enabled).await
    }

    /// Start handling `text` on its own task. Must be called inside a tokio runtime.
    pub fn submit(&self, text: impl Into<String>) -> RequestHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let inner = self.inner.clone();
        let text = text.into();

        let join = tokio::spawn(
            async move { inner.run(id, text, cancel_rx).await }
                .instrument(tracing::info_span!("request", request_id = id)),
        );

        RequestHandle {
            id,
            cancel: cancel_tx,
            join,
        }
    }

    /// Submit and wait for the terminal report.
    pub async fn handle(&self, text: impl Into<String>) -> PipelineReport {
        self.submit(text).wait().await
    }
}

#[derive(Default)]
struct Trace {
    raw_response: Option<String>,
    intent: Option<Intent>,
}

struct Completion {
    message: String,
    exit_succeeded: Option<bool>,
}

impl Inner {
    async fn run(
        self: Arc<Self>,
        id: u64,
        text: String,
        mut cancel: watch::Receiver<bool>,
    ) -> PipelineReport {
        let mut trace = Trace::default();

        let result = AssertUnwindSafe(self.process(id, &text, &mut trace, &mut cancel))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(PipelineError::Internal(panic_message(panic.as_ref()))));

        self.finish(id, text, trace, result)
    }

    async fn process(
        &self,
        id: u64,
        text: &str,
        trace: &mut Trace,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<Completion, PipelineError> {
        let presentation = &self.deps.presentation;
        presentation.on_status_update(id, messages::PROCESSING);

        let _permit = cancellable(cancel, self.workers.clone().acquire_owned())
            .await?
            .map_err(|_| PipelineError::Internal("worker pool closed".to_string()))?;

        self.enter(id, PipelineState::Classifying);
        let raw = cancellable(cancel, self.classify(text)).await??;
        tracing::debug!(raw = %raw, "Classifier response");
        trace.raw_response = Some(raw.clone());

        let intent = intent_schema::parse(&raw)?;
        trace.intent = Some(intent.clone());

        let command = match intent {
            Intent::Conversation(conversation) => {
                self.enter(id, PipelineState::Conversing);
                return Ok(Completion {
                    message: conversation.response,
                    exit_succeeded: None,
                });
            }
            Intent::Command(command) => command,
        };

        self.enter(id, PipelineState::GateChecking);
        let policy = self.policy.snapshot().await;
        let decision = evaluate(&command, &policy);
        tracing::info!(
            action = %command.action,
            target = %command.target,
            allowed = decision.allowed(),
            requires_confirmation = decision.requires_confirmation(),
            reason = %decision.reason(),
            "Safety gate decision"
        );
        if !decision.allowed() {
            return Err(PipelineError::SafetyViolation(decision.reason()));
        }

        if decision.requires_confirmation() {
            self.enter(id, PipelineState::AwaitingConfirmation);
            presentation.on_status_update(id, messages::AWAITING_CONFIRMATION);
            let outcome = cancellable(cancel, self.broker.confirm(id, &command)).await?;
            if !outcome.is_approved() {
                tracing::info!(?outcome, "Command not confirmed");
                return Err(PipelineError::UserCancelled);
            }
        }

        let cancelled_meanwhile = *cancel.borrow();
        if cancelled_meanwhile {
            return Err(PipelineError::UserCancelled);
        }

        self.enter(id, PipelineState::Executing);
        presentation.on_status_update(id, messages::EXECUTING);
        let plan = ExecutionPlan::for_command(&command);
        let result = self
            .deps
            .executor
            .execute(&plan, self.settings.execution_timeout)
            .await?;

        match result.mode {
            ExecutionMode::Background => Ok(Completion {
                message: messages::launched_in_background(&plan.command_line),
                exit_succeeded: Some(true),
            }),
            ExecutionMode::Foreground if result.stdout.trim().is_empty() => {
                if result.exit_succeeded {
                    Ok(Completion {
                        message: messages::EXECUTED.to_string(),
                        exit_succeeded: Some(true),
                    })
                } else {
                    Err(PipelineError::CommandFailed {
                        exit_code: result.exit_code,
                    })
                }
            }
            // Non-zero exits with output are still explained
            ExecutionMode::Foreground => {
                self.enter(id, PipelineState::Summarizing);
                let summary = self
                    .summarizer
                    .summarize(text, &plan.command_line, &result.stdout)
                    .await;
                Ok(Completion {
                    message: summary,
                    exit_succeeded: Some(result.exit_succeeded),
                })
            }
        }
    }

    async fn classify(&self, text: &str) -> Result<String, PipelineError> {
        let prompt = classification_prompt(&self.settings.os_distro, text);
        let limit = self.settings.classify_timeout;

        match tokio::time::timeout(limit, self.deps.model.complete(&prompt)).await {
            Ok(Ok(raw)) => Ok(raw),
            Ok(Err(e)) => Err(PipelineError::ClassifierUnavailable(e.to_string())),
            Err(_) => Err(PipelineError::ClassifierUnavailable(format!(
                "no response within {}ms",
                limit.as_millis()
            ))),
        }
    }

    fn enter(&self, id: u64, state: PipelineState) {
        tracing::debug!(state = %state, "State change");
        self.deps.presentation.on_state_change(id, state);
    }

    /// Emit the one terminal message and the one interaction record.
    fn finish(
        &self,
        id: u64,
        text: String,
        trace: Trace,
        result: Result<Completion, PipelineError>,
    ) -> PipelineReport {
        let (state, source, message, outcome) = match result {
            Ok(completion) => (
                PipelineState::Done,
                MessageSource::Assistant,
                completion.message,
                InteractionOutcome::Done {
                    exit_succeeded: completion.exit_succeeded,
                },
            ),
            Err(err) => {
                let message = err.user_message();
                match &err {
                    PipelineError::SafetyViolation(reason) => (
                        PipelineState::Blocked,
                        MessageSource::System,
                        message,
                        InteractionOutcome::Blocked {
                            reason: reason.to_string(),
                        },
                    ),
                    PipelineError::UserCancelled => (
                        PipelineState::Cancelled,
                        MessageSource::System,
                        message,
                        InteractionOutcome::Cancelled,
                    ),
                    other => {
                        tracing::warn!(error_kind = other.kind(), error = %other, "Request failed");
                        (
                            PipelineState::Failed,
                            MessageSource::System,
                            message,
                            InteractionOutcome::Failed {
                                error_kind: other.kind().to_string(),
                                message: error_handling::sanitize_message(&other.to_string()),
                            },
                        )
                    }
                }
            }
        };

        tracing::info!(state = %state, "Request finished");

        let presentation = &self.deps.presentation;
        self.enter(id, state);
        presentation.on_message(id, source, &message);
        if source == MessageSource::Assistant {
            presentation.on_speak(id, &message);
        }

        self.deps.interactions.record(InteractionRecord::new(
            id,
            text,
            trace.raw_response,
            trace.intent,
            outcome.clone(),
        ));

        PipelineReport {
            request_id: id,
            state,
            outcome,
            message,
        }
    }
}

/// Run `fut` unless the request is cancelled first.
async fn cancellable<F: Future>(
    cancel: &mut watch::Receiver<bool>,
    fut: F,
) -> Result<F::Output, PipelineError> {
    tokio::select! {
        biased;
        _ = cancelled(cancel) => Err(PipelineError::UserCancelled),
        output = fut => Ok(output),
    }
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let closed = cancel.wait_for(|cancelled| *cancelled).await.is_err();
    if closed {
        // Sender gone without cancelling
        std::future::pending::<()>().await;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
