// orchestrator-rs/src/main.rs
// Console front-end for the Nova assistant

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::Arc;

use action_ledger::{ActionLedger, CompositeSink, LedgerSink, TracingSink};
use anyhow::Context;
use config_rs::AssistantConfig;
use error_handling::{init_logging, LoggingConfig};
use executor::CommandExecutor;
use llm_client::{detect_os_distro, LLMClient, LlmConfig};
use orchestrator::{
    messages, ChannelConfirmationPrompt, MessageSource, PendingConfirmation, PipelineDeps,
    PipelineOrchestrator, PipelineSettings, PipelineState, PresentationSink, RequestHandle,
};
use safety_gate::{Policy, PolicyHandle};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

const HELP: &str = "\
Type a request in plain language, or:
  :confirm on|off   ask before every command (unsafe commands always ask)
  :policy           show the current policy
  :cancel <id>      cancel a request that has not started executing
  exit | quit       leave";

// 1. Presentation

struct ConsolePresentation;

impl PresentationSink for ConsolePresentation {
    fn on_status_update(&self, request_id: u64, text: &str) {
        println!("  [#{}] {}", request_id, text);
    }

    fn on_state_change(&self, request_id: u64, state: PipelineState) {
        tracing::trace!(request_id, state = %state, mood = ?state.mood(), "Presentation state");
    }

    fn on_message(&self, request_id: u64, source: MessageSource, text: &str) {
        println!("[#{}] {}: {}", request_id, source, text);
    }
}

// 2. Input handling

#[derive(Debug, PartialEq, Eq)]
enum ConsoleInput {
    Empty,
    Exit,
    Help,
    Answer(bool),
    SetConfirm(bool),
    ShowPolicy,
    Cancel(u64),
    Invalid(String),
    Request(String),
}

fn parse_input(line: &str, awaiting_answer: bool) -> ConsoleInput {
    let line = line.trim();

    if awaiting_answer {
        match line.to_ascii_lowercase().as_str() {
            "y" | "yes" => return ConsoleInput::Answer(true),
            // (y/N): anything blank declines
            "" | "n" | "no" => return ConsoleInput::Answer(false),
            _ => {}
        }
    }

    match line {
        "" => ConsoleInput::Empty,
        "exit" | "quit" => ConsoleInput::Exit,
        ":help" => ConsoleInput::Help,
        ":policy" => ConsoleInput::ShowPolicy,
        _ => {
            if let Some(arg) = line.strip_prefix(":confirm") {
                return match config_rs::parse_bool(arg) {
                    Some(enabled) => ConsoleInput::SetConfirm(enabled),
                    None => ConsoleInput::Invalid("usage: :confirm on|off".to_string()),
                };
            }
            if let Some(arg) = line.strip_prefix(":cancel") {
                return match arg.trim().trim_start_matches('#').parse() {
                    Ok(id) => ConsoleInput::Cancel(id),
                    Err(_) => ConsoleInput::Invalid("usage: :cancel <id>".to_string()),
                };
            }
            if line.starts_with(':') {
                return ConsoleInput::Invalid(format!("unknown command {}, try :help", line));
            }
            ConsoleInput::Request(line.to_string())
        }
    }
}

fn show_confirmation(pending: &PendingConfirmation) {
    print!(
        "[#{}] {} (y/N): ",
        pending.request.request_id, pending.request.prompt
    );
    let _ = std::io::stdout().flush();
}

fn describe_policy(policy: &Policy) -> String {
    let actions: Vec<&str> = policy.action_whitelist.iter().map(|a| a.as_str()).collect();
    let paths: Vec<String> = policy
        .path_whitelist
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    format!(
        "actions: {}\npaths: {}\nconfirm every command: {}",
        actions.join(", "),
        paths.join(", "),
        if policy.force_confirm { "on" } else { "off" }
    )
}

// 3. Confirmation queue

/// Confirmations waiting for the operator, answered in arrival order. Only
/// the front one is on screen.
#[derive(Default)]
struct ConfirmationQueue {
    pending: VecDeque<PendingConfirmation>,
}

#[derive(Debug, PartialEq, Eq)]
enum AnswerOutcome {
    Delivered(u64),
    /// The prompt on screen belonged to a request that already gave up
    Stale(u64),
    NothingPending,
}

impl ConfirmationQueue {
    /// Returns true when the new confirmation is now on screen.
    fn push(&mut self, confirmation: PendingConfirmation) -> bool {
        self.pending.push_back(confirmation);
        self.pending.len() == 1
    }

    fn front(&self) -> Option<&PendingConfirmation> {
        self.pending.front()
    }

    fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop abandoned confirmations. Returns true when the one on screen went away.
    fn prune(&mut self) -> bool {
        let front = self.pending.front().map(|p| p.request.request_id);
        self.pending.retain(|p| !p.is_abandoned());
        front.is_some() && self.pending.front().map(|p| p.request.request_id) != front
    }

    /// Apply the operator's answer to the prompt on screen. An answer typed at
    /// an abandoned prompt is not forwarded to the next one, which the
    /// operator has not seen yet.
    fn answer(&mut self, approved: bool) -> AnswerOutcome {
        let Some(shown) = self.pending.front().map(|p| p.request.request_id) else {
            return AnswerOutcome::NothingPending;
        };
        if self.prune() {
            return AnswerOutcome::Stale(shown);
        }
        match self.pending.pop_front() {
            Some(confirmation) => {
                confirmation.answer(approved);
                AnswerOutcome::Delivered(shown)
            }
            None => AnswerOutcome::NothingPending,
        }
    }

    /// Resolves when the confirmation on screen is abandoned.
    async fn front_abandoned(&mut self) {
        match self.pending.front_mut() {
            Some(front) => front.abandoned().await,
            None => std::future::pending().await,
        }
    }

    fn decline_all(&mut self) {
        for confirmation in self.pending.drain(..) {
            confirmation.answer(false);
        }
    }
}

// 4. Console loop

async fn run_console(
    orchestrator: &PipelineOrchestrator,
    confirmations: &mut mpsc::UnboundedReceiver<PendingConfirmation>,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut queue = ConfirmationQueue::default();
    let mut in_flight: HashMap<u64, RequestHandle> = HashMap::new();

    loop {
        in_flight.retain(|_, handle| !handle.is_finished());

        tokio::select! {
            Some(confirmation) = confirmations.recv() => {
                if queue.push(confirmation) {
                    if let Some(front) = queue.front() {
                        show_confirmation(front);
                    }
                }
            }
            _ = queue.front_abandoned() => {
                println!();
                if queue.prune() {
                    if let Some(next) = queue.front() {
                        show_confirmation(next);
                    }
                }
            }
            line = lines.next_line() => {
                let Some(line) = line.context("reading standard input")? else {
                    break;
                };

                match parse_input(&line, !queue.is_empty()) {
                    ConsoleInput::Empty => {}
                    ConsoleInput::Exit => break,
                    ConsoleInput::Help => println!("{}", HELP),
                    ConsoleInput::Answer(approved) => {
                        if let AnswerOutcome::Stale(id) = queue.answer(approved) {
                            println!("Request #{} is no longer waiting for an answer", id);
                        }
                        if let Some(next) = queue.front() {
                            show_confirmation(next);
                        }
                    }
                    ConsoleInput::SetConfirm(enabled) => {
                        let policy = orchestrator.set_force_confirm(enabled).await;
                        println!("Confirmation {}", if policy.force_confirm { "on" } else { "off" });
                    }
                    ConsoleInput::ShowPolicy => {
                        println!("{}", describe_policy(&orchestrator.policy().await));
                    }
                    ConsoleInput::Cancel(id) => match in_flight.get(&id) {
                        Some(handle) => handle.cancel(),
                        None => println!("No running request #{}", id),
                    },
                    ConsoleInput::Invalid(usage) => println!("{}", usage),
                    ConsoleInput::Request(text) => {
                        let handle = orchestrator.submit(text);
                        in_flight.insert(handle.id(), handle);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    // Unanswered confirmations decline; requests still running finish first
    queue.decline_all();
    for (_, handle) in in_flight.drain() {
        handle.cancel();
        let report = handle.wait().await;
        tracing::debug!(request_id = report.request_id, state = %report.state, "Request closed at shutdown");
    }

    Ok(())
}

// 5. Main

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config_rs::load_dotenv();
    let config = AssistantConfig::from_env();
    config.validate()?;

    init_logging(LoggingConfig {
        level: config.log_level.clone(),
        service_name: "nova".to_string(),
        json_format: config.log_json,
        log_dir: config.log_dir.clone(),
    })?;

    let policy = match &config.policy_path {
        Some(path) => Policy::load(path)
            .with_context(|| format!("loading policy from {}", path.display()))?,
        None => Policy::default(),
    };

    let os_distro = config.os_distro.clone().unwrap_or_else(detect_os_distro);
    let model = LLMClient::new(LlmConfig::from_env())?;

    let ledger = ActionLedger::open(&config.ledger_path)
        .with_context(|| format!("opening ledger {}", config.ledger_path.display()))?;
    let (ledger_sink, ledger_writer) = LedgerSink::spawn(ledger);
    let interactions = CompositeSink::new()
        .with(Arc::new(TracingSink))
        .with(Arc::new(ledger_sink));

    if config.dry_run {
        tracing::warn!("Dry run enabled: commands will not be executed");
    }
    let executor = CommandExecutor::new().dry_run(config.dry_run);
    let (confirmation_prompt, mut confirmations) = ChannelConfirmationPrompt::new();

    let orchestrator = PipelineOrchestrator::new(
        PipelineDeps {
            model: Arc::new(model),
            executor: Arc::new(executor),
            presentation: Arc::new(ConsolePresentation),
            confirmation: Arc::new(confirmation_prompt),
            interactions: Arc::new(interactions),
        },
        PipelineSettings::from_config(&config, os_distro),
        PolicyHandle::new(policy),
    );

    println!("{}", messages::READY);
    run_console(&orchestrator, &mut confirmations).await?;

    drop(orchestrator);
    let written = ledger_writer.finish().await;
    tracing::info!(written, "Interaction ledger closed");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use intent_schema::{Action, Command};
    use orchestrator::ConfirmationRequest;
    use tokio::sync::oneshot;

    #[test]
    fn test_answers_only_while_awaiting() {
        assert_eq!(parse_input("y", true), ConsoleInput::Answer(true));
        assert_eq!(parse_input(" NO ", true), ConsoleInput::Answer(false));
        assert_eq!(parse_input("", true), ConsoleInput::Answer(false));
        assert_eq!(parse_input("y", false), ConsoleInput::Request("y".to_string()));
        assert_eq!(parse_input("", false), ConsoleInput::Empty);
    }

    #[test]
    fn test_console_commands() {
        assert_eq!(parse_input("quit", false), ConsoleInput::Exit);
        assert_eq!(parse_input(":confirm off", false), ConsoleInput::SetConfirm(false));
        assert_eq!(parse_input(":confirm on", true), ConsoleInput::SetConfirm(true));
        assert_eq!(parse_input(":cancel #12", false), ConsoleInput::Cancel(12));
        assert!(matches!(parse_input(":confirm maybe", false), ConsoleInput::Invalid(_)));
        assert!(matches!(parse_input(":frobnicate", false), ConsoleInput::Invalid(_)));
    }

    #[test]
    fn test_requests_pass_through_while_awaiting() {
        assert_eq!(
            parse_input("open firefox", true),
            ConsoleInput::Request("open firefox".to_string())
        );
    }

    fn waiting(request_id: u64) -> (PendingConfirmation, oneshot::Receiver<bool>) {
        let command = Command {
            action: Action::Shutdown,
            target: "now".to_string(),
            confirm: true,
            safe: false,
        };
        let (responder, answer) = oneshot::channel();
        let request = ConfirmationRequest {
            request_id,
            prompt: command.confirmation_prompt(),
            command,
        };
        (PendingConfirmation::new(request, responder), answer)
    }

    #[test]
    fn test_answer_goes_to_prompt_on_screen() {
        let mut queue = ConfirmationQueue::default();
        let (first, mut first_answer) = waiting(1);
        let (second, mut second_answer) = waiting(2);
        assert!(queue.push(first));
        assert!(!queue.push(second));

        assert_eq!(queue.answer(true), AnswerOutcome::Delivered(1));
        assert_eq!(first_answer.try_recv(), Ok(true));
        assert!(second_answer.try_recv().is_err());
        assert_eq!(queue.front().map(|p| p.request.request_id), Some(2));
    }

    #[test]
    fn test_answer_at_abandoned_prompt_is_not_forwarded() {
        let mut queue = ConfirmationQueue::default();
        let (first, first_answer) = waiting(1);
        let (second, mut second_answer) = waiting(2);
        queue.push(first);
        queue.push(second);

        // Request 1 times out while its prompt is on screen
        drop(first_answer);

        assert_eq!(queue.answer(true), AnswerOutcome::Stale(1));
        assert!(second_answer.try_recv().is_err());
        assert_eq!(queue.front().map(|p| p.request.request_id), Some(2));

        assert_eq!(queue.answer(false), AnswerOutcome::Delivered(2));
        assert_eq!(second_answer.try_recv(), Ok(false));
        assert_eq!(queue.answer(true), AnswerOutcome::NothingPending);
    }

    #[test]
    fn test_prune_reports_only_front_changes() {
        let mut queue = ConfirmationQueue::default();
        let (first, _first_answer) = waiting(1);
        let (second, second_answer) = waiting(2);
        queue.push(first);
        queue.push(second);

        drop(second_answer);
        assert!(!queue.prune());
        assert_eq!(queue.front().map(|p| p.request.request_id), Some(1));
    }

    #[tokio::test]
    async fn test_front_abandoned_wakes_on_give_up() {
        let mut queue = ConfirmationQueue::default();
        let (first, first_answer) = waiting(1);
        queue.push(first);

        drop(first_answer);
        tokio::time::timeout(std::time::Duration::from_secs(1), queue.front_abandoned())
            .await
            .expect("abandonment must be observed");
        assert!(queue.prune());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_decline_all_answers_no() {
        let mut queue = ConfirmationQueue::default();
        let (first, mut first_answer) = waiting(1);
        queue.push(first);
        queue.decline_all();
        assert_eq!(first_answer.try_recv(), Ok(false));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_describe_policy() {
        let text = describe_policy(&Policy::default());
        assert!(text.contains("run_command"));
        assert!(text.contains("confirm every command: on"));
    }
}
