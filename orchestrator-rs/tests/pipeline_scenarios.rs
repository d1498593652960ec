use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use action_ledger::{InteractionOutcome, InteractionRecord, InteractionSink};
use async_trait::async_trait;
use executor::{Execute, ExecutionError, ExecutionMode, ExecutionPlan, ExecutionResult};
use intent_schema::{Action, Intent};
use llm_client::{LLMError, LanguageModel, Prompt, REFUSAL_TEXT};
use mockall::mock;
use orchestrator::{
    ConfirmationPrompt, ConfirmationRequest, MessageSource, PipelineDeps, PipelineOrchestrator,
    PipelineSettings, PipelineState, PresentationSink,
};
use safety_gate::{Policy, PolicyHandle};

mock! {
    pub Executor {}
    #[async_trait]
    impl Execute for Executor {
        async fn execute(
            &self,
            plan: &ExecutionPlan,
            timeout: Duration,
        ) -> Result<ExecutionResult, ExecutionError>;
    }
}

// Scripted classification service

#[derive(Clone)]
enum Reply {
    Text(&'static str),
    Fail,
    Hang,
}

struct ScriptedModel {
    classification: Reply,
    summary: Reply,
    summary_calls: AtomicUsize,
}

impl ScriptedModel {
    fn new(classification: Reply) -> Self {
        Self {
            classification,
            summary: Reply::Text("Here is what I found."),
            summary_calls: AtomicUsize::new(0),
        }
    }

    fn with_summary(mut self, summary: Reply) -> Self {
        self.summary = summary;
        self
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LLMError> {
        let reply = if prompt.user.contains("---COMMAND OUTPUT---") {
            self.summary_calls.fetch_add(1, Ordering::SeqCst);
            self.summary.clone()
        } else {
            self.classification.clone()
        };
        match reply {
            Reply::Text(text) => Ok(text.to_string()),
            Reply::Fail => Err(LLMError::NetworkError("connection refused".to_string())),
            Reply::Hang => std::future::pending().await,
        }
    }
}

// Presentation and interaction recorders

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Status(u64, String),
    State(u64, PipelineState),
    Message(u64, MessageSource, String),
    Speak(u64),
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn messages_for(&self, id: u64) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Message(rid, _, text) if rid == id => Some(text),
                _ => None,
            })
            .collect()
    }

    fn states_for(&self, id: u64) -> Vec<PipelineState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::State(rid, state) if rid == id => Some(state),
                _ => None,
            })
            .collect()
    }
}

impl PresentationSink for Recorder {
    fn on_status_update(&self, request_id: u64, text: &str) {
        self.events.lock().unwrap().push(Event::Status(request_id, text.to_string()));
    }

    fn on_state_change(&self, request_id: u64, state: PipelineState) {
        self.events.lock().unwrap().push(Event::State(request_id, state));
    }

    fn on_message(&self, request_id: u64, source: MessageSource, text: &str) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Message(request_id, source, text.to_string()));
    }

    fn on_speak(&self, request_id: u64, _text: &str) {
        self.events.lock().unwrap().push(Event::Speak(request_id));
    }
}

#[derive(Default)]
struct Interactions(Mutex<Vec<InteractionRecord>>);

impl Interactions {
    fn all(&self) -> Vec<InteractionRecord> {
        self.0.lock().unwrap().clone()
    }
}

impl InteractionSink for Interactions {
    fn record(&self, record: InteractionRecord) {
        self.0.lock().unwrap().push(record);
    }
}

// Operator stand-ins

struct Operator {
    answer: Option<bool>,
    asked: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl Operator {
    fn answering(answer: bool) -> Self {
        Self {
            answer: Some(answer),
            asked: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn absent() -> Self {
        Self {
            answer: None,
            asked: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ConfirmationPrompt for Operator {
    async fn ask(&self, request: ConfirmationRequest) -> bool {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt);
        match self.answer {
            Some(answer) => answer,
            None => std::future::pending().await,
        }
    }
}

struct Harness {
    orchestrator: PipelineOrchestrator,
    presentation: Arc<Recorder>,
    interactions: Arc<Interactions>,
    operator: Arc<Operator>,
    model: Arc<ScriptedModel>,
}

fn harness(model: ScriptedModel, executor: MockExecutor, operator: Operator, force_confirm: bool) -> Harness {
    let presentation = Arc::new(Recorder::default());
    let interactions = Arc::new(Interactions::default());
    let operator = Arc::new(operator);
    let model = Arc::new(model);

    let policy = Policy {
        force_confirm,
        ..Policy::default()
    };

    let orchestrator = PipelineOrchestrator::new(
        PipelineDeps {
            model: model.clone(),
            executor: Arc::new(executor),
            presentation: presentation.clone(),
            confirmation: operator.clone(),
            interactions: interactions.clone(),
        },
        PipelineSettings {
            classify_timeout: Duration::from_secs(30),
            summary_timeout: Duration::from_secs(30),
            execution_timeout: Duration::from_secs(60),
            confirmation_timeout: Some(Duration::from_secs(120)),
            max_concurrent_requests: 4,
            os_distro: "Test Linux".to_string(),
        },
        PolicyHandle::new(policy),
    );

    Harness {
        orchestrator,
        presentation,
        interactions,
        operator,
        model,
    }
}

fn never_executes() -> MockExecutor {
    let mut executor = MockExecutor::new();
    executor.expect_execute().times(0);
    executor
}

fn foreground(stdout: &str, exit_succeeded: bool, exit_code: i32) -> ExecutionResult {
    ExecutionResult {
        stdout: stdout.to_string(),
        exit_succeeded,
        exit_code: Some(exit_code),
        mode: ExecutionMode::Foreground,
    }
}

const CONVERSATION: &str = r#"{"type":"conversation","response":"Any weather is fine for coding."}"#;
const REFUSAL: &str = r#"{"type":"conversation","response":"Harmful command detected. Action not allowed."}"#;
const RUN_FREE: &str = r#"{"type":"command","action":"run_command","target":"free -h","confirm":false,"safe":true}"#;
const RUN_INXI_BG: &str = r#"{"type":"command","action":"run_command","target":"inxi -C &","confirm":false,"safe":true}"#;
const RUN_FIREFOX_BG: &str = r#"{"type":"command","action":"run_command","target":"firefox &","confirm":false,"safe":true}"#;
const SHUTDOWN: &str = r#"{"type":"command","action":"shutdown","target":"now","confirm":true,"safe":false}"#;
const OPEN_ETC: &str = r#"{"type":"command","action":"open_file","target":"/etc/shadow","confirm":false,"safe":true}"#;

#[tokio::test]
async fn test_conversation_emits_one_message_and_nothing_else() {
    let h = harness(ScriptedModel::new(Reply::Text(CONVERSATION)), never_executes(), Operator::answering(true), true);

    let report = h.orchestrator.handle("what's the weather like for coding").await;

    assert_eq!(report.state, PipelineState::Done);
    assert_eq!(report.message, "Any weather is fine for coding.");
    assert_eq!(h.presentation.messages_for(report.request_id).len(), 1);
    assert_eq!(h.operator.asked.load(Ordering::SeqCst), 0);
    assert_eq!(h.model.summary_calls.load(Ordering::SeqCst), 0);

    let records = h.interactions.all();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, InteractionOutcome::Done { exit_succeeded: None });
    assert!(matches!(records[0].parsed_intent, Some(Intent::Conversation(_))));
    assert!(!h.presentation.states_for(report.request_id).contains(&PipelineState::GateChecking));
}

#[tokio::test]
async fn test_classifier_refusal_is_relayed_as_conversation() {
    let h = harness(ScriptedModel::new(Reply::Text(REFUSAL)), never_executes(), Operator::answering(true), false);

    let report = h.orchestrator.handle("delete everything in my home folder").await;

    assert_eq!(report.state, PipelineState::Done);
    assert_eq!(report.message, REFUSAL_TEXT);
    assert_eq!(h.interactions.all().len(), 1);
}

#[tokio::test]
async fn test_declined_confirmation_never_executes() {
    let h = harness(ScriptedModel::new(Reply::Text(SHUTDOWN)), never_executes(), Operator::answering(false), false);

    let report = h.orchestrator.handle("power off the computer").await;

    assert_eq!(report.state, PipelineState::Cancelled);
    assert_eq!(report.message, "Command cancelled.");
    assert_eq!(report.outcome, InteractionOutcome::Cancelled);
    assert_eq!(h.operator.asked.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.operator.prompts.lock().unwrap().as_slice(),
        ["Execute shutdown → now?".to_string()]
    );
    assert_eq!(h.interactions.all()[0].outcome, InteractionOutcome::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_confirmation_times_out_as_cancelled() {
    let h = harness(ScriptedModel::new(Reply::Text(SHUTDOWN)), never_executes(), Operator::absent(), false);

    let report = h.orchestrator.handle("shut down").await;

    assert_eq!(report.state, PipelineState::Cancelled);
    assert_eq!(h.interactions.all().len(), 1);
}

#[tokio::test]
async fn test_unsafe_command_asks_even_with_global_confirmation_off() {
    let mut executor = MockExecutor::new();
    executor
        .expect_execute()
        .times(1)
        .returning(|_, _| Ok(foreground("", true, 0)));
    let h = harness(ScriptedModel::new(Reply::Text(SHUTDOWN)), executor, Operator::answering(true), false);

    let report = h.orchestrator.handle("shut down").await;

    assert_eq!(h.operator.asked.load(Ordering::SeqCst), 1);
    assert_eq!(report.state, PipelineState::Done);
    assert_eq!(report.message, "Command executed successfully.");
}

#[tokio::test]
async fn test_path_outside_whitelist_is_blocked() {
    let h = harness(ScriptedModel::new(Reply::Text(OPEN_ETC)), never_executes(), Operator::answering(true), false);

    let report = h.orchestrator.handle("open the shadow file").await;

    assert_eq!(report.state, PipelineState::Blocked);
    assert_eq!(report.message, "Sorry, that command is not allowed for security reasons.");
    assert!(matches!(report.outcome, InteractionOutcome::Blocked { .. }));
    assert_eq!(h.operator.asked.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_action_removed_from_whitelist_is_blocked() {
    let h = harness(ScriptedModel::new(Reply::Text(RUN_FREE)), never_executes(), Operator::answering(true), false);
    h.orchestrator
        .update_policy(|policy| {
            policy.action_whitelist.remove(&Action::RunCommand);
        })
        .await
        .unwrap();

    let report = h.orchestrator.handle("how much memory do I have").await;
    assert_eq!(report.state, PipelineState::Blocked);
}

#[tokio::test]
async fn test_info_command_with_marker_runs_in_foreground_and_is_summarized() {
    let mut executor = MockExecutor::new();
    executor
        .expect_execute()
        .withf(|plan, _| plan.command_line == "inxi -C" && plan.mode == ExecutionMode::Foreground)
        .times(1)
        .returning(|_, _| Ok(foreground("CPU: 8-core AMD Ryzen 7\n", true, 0)));
    let model = ScriptedModel::new(Reply::Text(RUN_INXI_BG)).with_summary(Reply::Text("You have an 8-core Ryzen 7."));
    let h = harness(model, executor, Operator::answering(true), false);

    let report = h.orchestrator.handle("what cpu do I have").await;

    assert_eq!(report.state, PipelineState::Done);
    assert_eq!(report.message, "You have an 8-core Ryzen 7.");
    assert_eq!(report.outcome, InteractionOutcome::Done { exit_succeeded: Some(true) });
    assert_eq!(h.model.summary_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_background_launch_skips_summary() {
    let mut executor = MockExecutor::new();
    executor
        .expect_execute()
        .withf(|plan, _| plan.command_line == "firefox" && plan.mode == ExecutionMode::Background)
        .times(1)
        .returning(|_, _| {
            Ok(ExecutionResult {
                stdout: String::new(),
                exit_succeeded: true,
                exit_code: None,
                mode: ExecutionMode::Background,
            })
        });
    let h = harness(ScriptedModel::new(Reply::Text(RUN_FIREFOX_BG)), executor, Operator::answering(true), false);

    let report = h.orchestrator.handle("open firefox").await;

    assert_eq!(report.message, "The firefox command was successfully launched in the background.");
    assert_eq!(h.model.summary_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_non_zero_exit_with_output_is_still_summarized() {
    let mut executor = MockExecutor::new();
    executor
        .expect_execute()
        .times(1)
        .returning(|_, _| Ok(foreground("grep: partial results\nmatch-1\n", false, 2)));
    let model = ScriptedModel::new(Reply::Text(RUN_FREE)).with_summary(Reply::Text("Found one match."));
    let h = harness(model, executor, Operator::answering(true), false);

    let report = h.orchestrator.handle("search for it").await;

    assert_eq!(report.state, PipelineState::Done);
    assert_eq!(report.message, "Found one match.");
    assert_eq!(report.outcome, InteractionOutcome::Done { exit_succeeded: Some(false) });
    assert_eq!(h.model.summary_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_non_zero_exit_without_output_fails() {
    let mut executor = MockExecutor::new();
    executor
        .expect_execute()
        .times(1)
        .returning(|_, _| Ok(foreground("", false, 1)));
    let h = harness(ScriptedModel::new(Reply::Text(RUN_FREE)), executor, Operator::answering(true), false);

    let report = h.orchestrator.handle("is blender running").await;

    assert_eq!(report.state, PipelineState::Failed);
    assert!(report.message.starts_with("Error executing command: "));
    assert!(matches!(
        report.outcome,
        InteractionOutcome::Failed { ref error_kind, .. } if error_kind == "non_zero_exit"
    ));
    assert_eq!(h.model.summary_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_summary_failure_falls_back_to_raw_output() {
    let mut executor = MockExecutor::new();
    executor
        .expect_execute()
        .times(1)
        .returning(|_, _| Ok(foreground("Mem: 16G\n", true, 0)));
    let model = ScriptedModel::new(Reply::Text(RUN_FREE)).with_summary(Reply::Fail);
    let h = harness(model, executor, Operator::answering(true), false);

    let report = h.orchestrator.handle("how much memory").await;

    assert_eq!(report.state, PipelineState::Done);
    assert_eq!(report.message, "Mem: 16G");
}

#[tokio::test]
async fn test_execution_timeout_is_reported() {
    let mut executor = MockExecutor::new();
    executor.expect_execute().times(1).returning(|plan, timeout| {
        Err(ExecutionError::Timeout {
            command: plan.command_line.clone(),
            timeout,
        })
    });
    let h = harness(ScriptedModel::new(Reply::Text(RUN_FREE)), executor, Operator::answering(true), false);

    let report = h.orchestrator.handle("run it").await;

    assert_eq!(report.state, PipelineState::Failed);
    assert!(report.message.starts_with("Error executing command: "));
    assert!(matches!(
        report.outcome,
        InteractionOutcome::Failed { ref error_kind, .. } if error_kind == "timeout"
    ));
}

#[tokio::test]
async fn test_malformed_response_fails_with_parse_error() {
    let h = harness(
        ScriptedModel::new(Reply::Text(r#"{"type":"command","action":"run_command","target":"ls","confirm":false,"safe":true,"also":"rm -rf /"}"#)),
        never_executes(),
        Operator::answering(true),
        false,
    );

    let report = h.orchestrator.handle("list files").await;

    assert_eq!(report.state, PipelineState::Failed);
    assert!(report.message.starts_with("Error parsing response: "));
    let record = &h.interactions.all()[0];
    assert!(record.raw_classifier_response.is_some());
    assert!(record.parsed_intent.is_none());
    assert_eq!(
        h.presentation.states_for(report.request_id),
        vec![PipelineState::Classifying, PipelineState::Failed]
    );
}

#[tokio::test]
async fn test_unreachable_classifier_fails_request() {
    let h = harness(ScriptedModel::new(Reply::Fail), never_executes(), Operator::answering(true), false);

    let report = h.orchestrator.handle("hello").await;

    assert_eq!(report.state, PipelineState::Failed);
    assert!(matches!(
        report.outcome,
        InteractionOutcome::Failed { ref error_kind, .. } if error_kind == "classifier_unavailable"
    ));
    assert!(h.interactions.all()[0].raw_classifier_response.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_classifier_timeout_fails_request() {
    let h = harness(ScriptedModel::new(Reply::Hang), never_executes(), Operator::answering(true), false);

    let report = h.orchestrator.handle("hello").await;

    assert_eq!(report.state, PipelineState::Failed);
    assert!(matches!(
        report.outcome,
        InteractionOutcome::Failed { ref error_kind, .. } if error_kind == "classifier_unavailable"
    ));
}

#[tokio::test]
async fn test_cancel_during_classification() {
    let h = harness(ScriptedModel::new(Reply::Hang), never_executes(), Operator::answering(true), false);

    let handle = h.orchestrator.submit("what time is it");
    tokio::task::yield_now().await;
    handle.cancel();
    let report = handle.wait().await;

    assert_eq!(report.state, PipelineState::Cancelled);
    assert_eq!(h.interactions.all().len(), 1);
    assert_eq!(h.presentation.messages_for(report.request_id), vec!["Command cancelled.".to_string()]);
}

#[tokio::test]
async fn test_cancel_while_awaiting_confirmation() {
    let h = harness(ScriptedModel::new(Reply::Text(SHUTDOWN)), never_executes(), Operator::absent(), false);

    let handle = h.orchestrator.submit("shut down");
    while h.operator.asked.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }
    handle.cancel();

    assert_eq!(handle.wait().await.state, PipelineState::Cancelled);
}

#[tokio::test]
async fn test_status_precedes_terminal_message() {
    let h = harness(ScriptedModel::new(Reply::Text(CONVERSATION)), never_executes(), Operator::answering(true), false);

    let report = h.orchestrator.handle("hi").await;
    let id = report.request_id;

    let events: Vec<Event> = h
        .presentation
        .events()
        .into_iter()
        .filter(|e| match e {
            Event::Status(rid, _) | Event::State(rid, _) | Event::Message(rid, _, _) | Event::Speak(rid) => *rid == id,
        })
        .collect();

    assert_eq!(events.first(), Some(&Event::Status(id, "Processing your request...".to_string())));
    let done = events.iter().position(|e| *e == Event::State(id, PipelineState::Done)).unwrap();
    let message = events.iter().position(|e| matches!(e, Event::Message(..))).unwrap();
    assert!(done < message);
    assert_eq!(events.last(), Some(&Event::Speak(id)));
}

#[tokio::test]
async fn test_concurrent_requests_each_get_one_record() {
    let h = harness(ScriptedModel::new(Reply::Text(CONVERSATION)), never_executes(), Operator::answering(true), false);

    let handles: Vec<_> = (0..10).map(|i| h.orchestrator.submit(format!("hello {}", i))).collect();
    let mut ids = Vec::new();
    for handle in handles {
        let report = handle.wait().await;
        assert_eq!(report.state, PipelineState::Done);
        ids.push(report.request_id);
    }

    let records = h.interactions.all();
    assert_eq!(records.len(), 10);
    for id in ids {
        assert_eq!(records.iter().filter(|r| r.request_id == id).count(), 1);
        assert_eq!(h.presentation.messages_for(id).len(), 1);
    }
}

#[tokio::test]
async fn test_policy_toggle_while_request_awaits_confirmation() {
    let h = harness(ScriptedModel::new(Reply::Text(SHUTDOWN)), never_executes(), Operator::absent(), false);
    let stuck = h.orchestrator.submit("shut down");

    // Policy writes still go through while a request waits on the operator
    while h.operator.asked.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }
    let policy = h.orchestrator.set_force_confirm(false).await;
    assert!(!policy.force_confirm);

    stuck.cancel();
    assert_eq!(stuck.wait().await.state, PipelineState::Cancelled);
}
