//! Core agent loop implementation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::{AgentConfig, Config};
use crate::conversation::ConversationContext;
use crate::llm::{ChatMessage, CompletionOptions, LlmClient, LlmError, Role, TokenUsage, ToolCall};
use crate::skills::Skill;
use crate::tools::ToolSet;

use super::budget::{self, Admission};
use super::dispatch::{self, DispatchStatus, Dispatched};
use super::prompt::build_system_prompt;
use super::protocol::{self, ModelAction};

const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Resource limits for one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    /// Maximum model queries. Must be at least 1.
    pub max_steps: usize,
    /// Character budget over all turn bodies. Zero disables the check.
    pub max_chars: usize,
    pub temperature: f64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_steps: 6,
            max_chars: 24_000,
            temperature: 0.2,
        }
    }
}

impl Limits {
    pub fn validate(&self) -> Result<(), RunError> {
        if self.max_steps == 0 {
            return Err(RunError::InvalidLimits("max_steps must be at least 1".to_string()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(RunError::InvalidLimits(format!(
                "temperature must be between 0 and 2, got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

impl From<&AgentConfig> for Limits {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_steps: config.max_steps,
            max_chars: config.max_chars,
            temperature: config.temperature,
        }
    }
}

/// How a run ended, short of a hard failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The model produced a final answer.
    Answer(String),
    /// The conversation outgrew the character budget before a step.
    BudgetExceeded { used: usize, limit: usize },
    /// Every step was spent on tool calls.
    StepsExhausted { steps: usize },
    /// The caller's cancellation token fired.
    Cancelled,
}

impl RunOutcome {
    pub fn is_answer(&self) -> bool {
        matches!(self, Self::Answer(_))
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Answer(text) => write!(f, "{}", text),
            Self::BudgetExceeded { .. } => write!(f, "Context budget exceeded before completion."),
            Self::StepsExhausted { .. } => write!(f, "Max steps reached without final answer."),
            Self::Cancelled => write!(f, "Run cancelled before completion."),
        }
    }
}

/// Hard failures. Everything else is absorbed into the conversation.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid run limits: {0}")]
    InvalidLimits(String),

    #[error(transparent)]
    Transport(#[from] LlmError),

    #[error("model returned empty response at step {step}")]
    EmptyAnswer { step: usize },
}

/// Types of run log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEntryType {
    ToolCall,
    ToolResult,
    ToolError,
    Response,
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunLogEntry {
    pub timestamp: DateTime<Utc>,
    pub step: usize,
    pub entry_type: LogEntryType,
    pub content: String,
}

/// Everything a finished run hands back to its caller.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Model queries issued.
    pub steps: usize,
    pub model: String,
    /// The full conversation, in append order.
    pub messages: Vec<ChatMessage>,
    pub log: Vec<RunLogEntry>,
    pub usage: Option<TokenUsage>,
}

impl RunReport {
    pub fn answer(&self) -> Option<&str> {
        match &self.outcome {
            RunOutcome::Answer(text) => Some(text),
            _ => None,
        }
    }
}

/// One task for [`Executor::run_batch`].
#[derive(Clone)]
pub struct BatchJob {
    pub task: String,
    pub profile: Arc<Skill>,
    pub tools: ToolSet,
}

/// State owned by a single in-flight run.
struct RunState<'a> {
    step: usize,
    messages: Vec<ChatMessage>,
    tools: &'a ToolSet,
    limits: Limits,
    model: String,
    log: Vec<RunLogEntry>,
    usage: Option<TokenUsage>,
}

impl<'a> RunState<'a> {
    fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    fn record(&mut self, entry_type: LogEntryType, content: String) {
        self.log.push(RunLogEntry {
            timestamp: Utc::now(),
            step: self.step,
            entry_type,
            content,
        });
    }

    fn add_usage(&mut self, usage: Option<TokenUsage>) {
        if let Some(u) = usage {
            self.usage = Some(match &self.usage {
                Some(acc) => acc.add(&u),
                None => u,
            });
        }
    }

    fn finish(mut self, outcome: RunOutcome) -> RunReport {
        let entry_type = if outcome.is_answer() {
            LogEntryType::Response
        } else {
            LogEntryType::Stopped
        };
        self.record(entry_type, truncate_for_log(&outcome.to_string(), 2000));
        tracing::info!("Run finished after {} step(s): {}", self.step, outcome_kind(&outcome));
        RunReport {
            outcome,
            steps: self.step,
            model: self.model,
            messages: self.messages,
            log: self.log,
            usage: self.usage,
        }
    }
}

fn outcome_kind(outcome: &RunOutcome) -> &'static str {
    match outcome {
        RunOutcome::Answer(_) => "answer",
        RunOutcome::BudgetExceeded { .. } => "budget_exceeded",
        RunOutcome::StepsExhausted { .. } => "steps_exhausted",
        RunOutcome::Cancelled => "cancelled",
    }
}

/// Drives the step loop. Shared collaborators are read-only; each run owns its state.
pub struct Executor {
    llm: Arc<dyn LlmClient>,
    default_model: String,
    limits: Limits,
    context: Option<Arc<dyn ConversationContext>>,
}

impl Executor {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            default_model: DEFAULT_MODEL.to_string(),
            limits: Limits::default(),
            context: None,
        }
    }

    /// Executor using the configured default model and agent limits.
    pub fn from_config(llm: Arc<dyn LlmClient>, config: &Config) -> Self {
        Self::new(llm)
            .with_default_model(config.llm.default_model.clone())
            .with_limits(Limits::from(&config.agent))
    }

    /// Model used when a skill does not name one.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_context(mut self, context: Arc<dyn ConversationContext>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    fn model_for(&self, profile: &Skill) -> String {
        if profile.default_model.trim().is_empty() {
            self.default_model.clone()
        } else {
            profile.default_model.clone()
        }
    }

    /// Run with the executor's configured limits.
    pub async fn run_default(
        &self,
        task: &str,
        profile: &Skill,
        tools: &ToolSet,
        cancel: &CancellationToken,
    ) -> Result<RunReport, RunError> {
        self.run(task, profile, tools, self.limits, cancel).await
    }

    /// Run one task to completion.
    ///
    /// Returns `Err` only for invalid limits, transport failures and empty
    /// answers. Unknown tools and tool failures are reported to the model.
    pub async fn run(
        &self,
        task: &str,
        profile: &Skill,
        tools: &ToolSet,
        limits: Limits,
        cancel: &CancellationToken,
    ) -> Result<RunReport, RunError> {
        limits.validate()?;

        let model = self.model_for(profile);
        tracing::info!(
            "Starting run: skill={} model={} tools={:?} max_steps={} max_chars={}",
            profile.name,
            model,
            tools.names(),
            limits.max_steps,
            limits.max_chars
        );

        let mut state = RunState {
            step: 0,
            messages: self.initial_messages(task, profile, tools).await,
            tools,
            limits,
            model: model.clone(),
            log: Vec::new(),
            usage: None,
        };

        let schemas = tools.schemas();
        let options = CompletionOptions {
            model,
            temperature: limits.temperature,
        };

        while state.step < state.limits.max_steps {
            if cancel.is_cancelled() {
                return Ok(state.finish(RunOutcome::Cancelled));
            }

            if let Admission::Exceeded { used, limit } = budget::admit(&state.messages, state.limits.max_chars) {
                tracing::warn!("Character budget exceeded: {} > {}", used, limit);
                return Ok(state.finish(RunOutcome::BudgetExceeded { used, limit }));
            }

            state.step += 1;
            tracing::debug!("Agent step {}", state.step);

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                r = self.llm.complete(&state.messages, &schemas, &options) => Some(r),
            };
            let Some(response) = response else {
                return Ok(state.finish(RunOutcome::Cancelled));
            };
            let response = response.map_err(|e| {
                tracing::warn!("Model request failed at step {}: {}", state.step, e);
                RunError::Transport(e)
            })?;
            state.add_usage(response.usage);

            match protocol::interpret(response, state.step - 1) {
                ModelAction::FinalText(text) => {
                    if text.trim().is_empty() {
                        tracing::warn!("Model returned an empty answer at step {}", state.step);
                        return Err(RunError::EmptyAnswer { step: state.step });
                    }
                    state.push(ChatMessage::assistant(text.clone()));
                    return Ok(state.finish(RunOutcome::Answer(text)));
                }
                ModelAction::ToolCalls { text, calls } => {
                    state.push(ChatMessage::assistant_with_tools(text, calls.clone()));
                    self.run_tool_calls(&mut state, &calls, cancel).await;
                }
            }
        }

        if cancel.is_cancelled() {
            return Ok(state.finish(RunOutcome::Cancelled));
        }
        let steps = state.step;
        Ok(state.finish(RunOutcome::StepsExhausted { steps }))
    }

    /// System turn, optional prior context, then the task.
    async fn initial_messages(&self, task: &str, profile: &Skill, tools: &ToolSet) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(build_system_prompt(profile, tools))];

        if let Some(context) = &self.context {
            match context.prior_turns(task).await {
                Ok(turns) => {
                    let before = messages.len();
                    messages.extend(turns.into_iter().filter(|t| {
                        matches!(t.role, Role::User | Role::Assistant)
                            && t.tool_calls.is_none()
                            && !t.body().trim().is_empty()
                    }));
                    tracing::debug!("Injected {} prior turn(s)", messages.len() - before);
                }
                Err(e) => tracing::warn!("Conversation context unavailable: {:#}", e),
            }
        }

        messages.push(ChatMessage::user(task));
        messages
    }

    /// Answer every request of the current step, in emission order.
    async fn run_tool_calls(
        &self,
        state: &mut RunState<'_>,
        calls: &[ToolCall],
        cancel: &CancellationToken,
    ) {
        for call in calls {
            state.record(
                LogEntryType::ToolCall,
                format!(
                    "Calling tool: {} with args: {}",
                    call.function.name,
                    truncate_for_log(&call.function.arguments, 1000)
                ),
            );

            let dispatched = if cancel.is_cancelled() {
                Dispatched::cancelled(call)
            } else {
                dispatch::dispatch(call, state.tools, cancel).await
            };

            let entry_type = match dispatched.status {
                DispatchStatus::Completed => LogEntryType::ToolResult,
                _ => LogEntryType::ToolError,
            };
            state.record(entry_type, truncate_for_log(dispatched.message.body(), 1000));
            state.push(dispatched.message);
        }
    }

    /// Run many tasks concurrently, at most `concurrency` at a time.
    /// Results are returned in job order.
    pub async fn run_batch(
        &self,
        jobs: Vec<BatchJob>,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Vec<Result<RunReport, RunError>> {
        let limits = self.limits;
        let mut results: Vec<(usize, Result<RunReport, RunError>)> = stream::iter(jobs.into_iter().enumerate())
            .map(|(index, job)| async move {
                let result = self.run(&job.task, &job.profile, &job.tools, limits, cancel).await;
                (index, result)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;
        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, result)| result).collect()
    }

    /// Single completion without tools.
    pub async fn chat(&self, messages: &[ChatMessage], model: Option<&str>) -> Result<String, LlmError> {
        let options = CompletionOptions {
            model: model.unwrap_or(&self.default_model).to_string(),
            temperature: self.limits.temperature,
        };
        let response = self.llm.complete(messages, &[], &options).await?;
        Ok(response.content.unwrap_or_default())
    }
}

/// Truncate a string for logging purposes.
fn truncate_for_log(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}... [truncated]", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLlmClient, ModelResponse, ToolCall};
    use crate::tools::{SimpleTool, ToolRegistry};
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn calculator_tools() -> ToolSet {
        let mut registry = ToolRegistry::new();
        registry.register(SimpleTool::new("calculator", "math", |args: Value| async move {
            match args["expression"].as_str() {
                Some("2+2") => Ok("4".to_string()),
                Some(other) => Err(anyhow::anyhow!("cannot evaluate {}", other)),
                None => Err(anyhow::anyhow!("Missing 'expression' argument")),
            }
        }));
        registry.subset(&["calculator"]).unwrap()
    }

    fn skill() -> Skill {
        Skill::new("math", "You do math.").with_tools(["calculator"])
    }

    fn calc_request(id: &str) -> ModelResponse {
        ModelResponse::tool_calls(vec![ToolCall::new(id, "calculator", r#"{"expression":"2+2"}"#)])
    }

    fn executor(client: Arc<MockLlmClient>) -> Executor {
        Executor::new(client)
    }

    #[tokio::test]
    async fn test_immediate_answer_takes_one_step() {
        let client = Arc::new(MockLlmClient::new(vec![ModelResponse::text("42")]));
        let report = executor(client.clone())
            .run_default("What is six times seven?", &skill(), &calculator_tools(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Answer("42".to_string()));
        assert_eq!(report.steps, 1);
        assert_eq!(client.call_count(), 1);
        let roles: Vec<Role> = report.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn test_tool_round_trip_conversation_shape() {
        let client = Arc::new(MockLlmClient::new(vec![
            calc_request("call_a"),
            ModelResponse::text("The answer is 4"),
        ]));
        let report = executor(client.clone())
            .run_default("What is 2+2?", &skill(), &calculator_tools(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.answer(), Some("The answer is 4"));
        assert_eq!(report.steps, 2);

        let m = &report.messages;
        assert_eq!(m.len(), 5);
        assert_eq!(m[0].role, Role::System);
        assert_eq!(m[1].role, Role::User);
        assert_eq!(m[2].role, Role::Assistant);
        assert_eq!(m[2].requests().len(), 1);
        assert_eq!(m[3].role, Role::Tool);
        assert_eq!(m[3].tool_call_id.as_deref(), Some("call_a"));
        assert_eq!(m[3].body(), "4");
        assert_eq!(m[4].role, Role::Assistant);
        assert_eq!(m[4].body(), "The answer is 4");

        // The second query saw the tool result.
        let second = &client.recorded_calls()[1];
        assert_eq!(second.last().unwrap().tool_call_id.as_deref(), Some("call_a"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_recoverable() {
        let client = Arc::new(MockLlmClient::new(vec![
            ModelResponse::tool_calls(vec![ToolCall::new("x1", "nonexistent", "{}")]),
            ModelResponse::text("Sorry, done anyway"),
        ]));
        let report = executor(client)
            .run_default("go", &skill(), &calculator_tools(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.answer(), Some("Sorry, done anyway"));
        let tool_turn = &report.messages[3];
        assert_eq!(tool_turn.tool_call_id.as_deref(), Some("x1"));
        assert!(tool_turn.body().contains("not found"));
    }

    #[tokio::test]
    async fn test_tool_error_is_fed_back() {
        let client = Arc::new(MockLlmClient::new(vec![
            ModelResponse::tool_calls(vec![ToolCall::new("e1", "calculator", r#"{"expression":"1/0"}"#)]),
            ModelResponse::text("I could not compute that"),
        ]));
        let report = executor(client)
            .run_default("go", &skill(), &calculator_tools(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.outcome.is_answer());
        assert_eq!(report.messages[3].body(), "tool error: cannot evaluate 1/0");
        assert!(report.log.iter().any(|e| e.entry_type == LogEntryType::ToolError));
    }

    #[tokio::test]
    async fn test_step_exhaustion_consumes_exactly_max_steps() {
        for max_steps in 1..=4 {
            let client = Arc::new(MockLlmClient::always(calc_request("loop")));
            let limits = Limits {
                max_steps,
                max_chars: 0,
                temperature: 0.2,
            };
            let report = executor(client.clone())
                .run("loop forever", &skill(), &calculator_tools(), limits, &CancellationToken::new())
                .await
                .unwrap();

            assert_eq!(report.outcome, RunOutcome::StepsExhausted { steps: max_steps });
            assert_eq!(report.steps, max_steps);
            assert_eq!(client.call_count(), max_steps);
            assert_eq!(report.outcome.to_string(), "Max steps reached without final answer.");
        }
    }

    #[tokio::test]
    async fn test_every_request_answered_before_next_query() {
        let client = Arc::new(MockLlmClient::new(vec![
            ModelResponse::tool_calls(vec![
                ToolCall::new("p1", "calculator", r#"{"expression":"2+2"}"#),
                ToolCall::new("p2", "nonexistent", "{}"),
                ToolCall::new("p3", "calculator", "not json"),
            ]),
            ModelResponse::text("done"),
        ]));
        let report = executor(client.clone())
            .run_default("go", &skill(), &calculator_tools(), &CancellationToken::new())
            .await
            .unwrap();

        let second_query = &client.recorded_calls()[1];
        let replies: Vec<&str> = second_query
            .iter()
            .filter(|m| m.role == Role::Tool)
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        assert_eq!(replies, vec!["p1", "p2", "p3"]);
        assert_eq!(report.messages[5].body(), "tool error: Missing 'expression' argument");
    }

    #[tokio::test]
    async fn test_budget_checked_before_query() {
        let client = Arc::new(MockLlmClient::new(vec![
            calc_request("b1"),
            ModelResponse::text("never reached"),
        ]));
        let tools = calculator_tools();
        let profile = skill();
        let system_len = build_system_prompt(&profile, &tools).chars().count();
        let task = "add";
        // Room for the initial turns, not for the tool reply ("4") added during step 1.
        let limits = Limits {
            max_steps: 5,
            max_chars: system_len + task.len(),
            temperature: 0.2,
        };

        let report = executor(client.clone())
            .run(task, &profile, &tools, limits, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            report.outcome,
            RunOutcome::BudgetExceeded {
                used: system_len + task.len() + 1,
                limit: system_len + task.len(),
            }
        );
        assert_eq!(report.steps, 1);
        assert_eq!(client.call_count(), 1);
        // The overshooting step was still completed.
        assert_eq!(report.messages.last().unwrap().role, Role::Tool);
    }

    #[tokio::test]
    async fn test_budget_exceeded_before_first_query() {
        let client = Arc::new(MockLlmClient::new(vec![ModelResponse::text("unused")]));
        let limits = Limits {
            max_steps: 3,
            max_chars: 10,
            temperature: 0.2,
        };
        let report = executor(client.clone())
            .run("task", &skill(), &calculator_tools(), limits, &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(report.outcome, RunOutcome::BudgetExceeded { limit: 10, .. }));
        assert_eq!(report.steps, 0);
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_answer_is_a_hard_failure() {
        let client = Arc::new(MockLlmClient::new(vec![ModelResponse::text("   ")]));
        let err = executor(client)
            .run_default("task", &skill(), &calculator_tools(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::EmptyAnswer { step: 1 }));
    }

    #[tokio::test]
    async fn test_transport_failure_is_surfaced() {
        let client = Arc::new(MockLlmClient::new(vec![calc_request("t1")]));
        client.push_error("upstream down");
        let err = executor(client.clone())
            .run_default("task", &skill(), &calculator_tools(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Transport(LlmError::InvalidResponse(ref m)) if m == "upstream down"));
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn test_invalid_limits_rejected_without_query() {
        let client = Arc::new(MockLlmClient::new(vec![]));
        let exec = executor(client.clone());
        let zero_steps = Limits {
            max_steps: 0,
            ..Limits::default()
        };
        let hot = Limits {
            temperature: 3.5,
            ..Limits::default()
        };
        for limits in [zero_steps, hot] {
            let err = exec
                .run("task", &skill(), &calculator_tools(), limits, &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, RunError::InvalidLimits(_)));
        }
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_identical_runs_yield_identical_results() {
        let script = || {
            vec![
                ModelResponse::text(r#"{"tool":"calculator","args":{"expression":"2+2"}}"#),
                ModelResponse::text("4 it is"),
            ]
        };
        let run = |client: Arc<MockLlmClient>| async move {
            executor(client)
                .run_default("2+2?", &skill(), &calculator_tools(), &CancellationToken::new())
                .await
                .unwrap()
        };

        let first = run(Arc::new(MockLlmClient::new(script()))).await;
        let second = run(Arc::new(MockLlmClient::new(script()))).await;
        assert_eq!(first.outcome, second.outcome);
        assert_eq!(first.messages, second.messages);
        assert_eq!(first.messages[3].tool_call_id.as_deref(), Some("call_0_0"));
    }

    #[tokio::test]
    async fn test_profile_model_overrides_default() {
        struct RecordingModel(std::sync::Mutex<Vec<CompletionOptions>>);

        #[async_trait::async_trait]
        impl LlmClient for RecordingModel {
            async fn complete(
                &self,
                _messages: &[ChatMessage],
                _tools: &[crate::llm::ToolSchema],
                options: &CompletionOptions,
            ) -> Result<ModelResponse, LlmError> {
                self.0.lock().unwrap().push(options.clone());
                Ok(ModelResponse::text("ok"))
            }
        }

        let recorder = Arc::new(RecordingModel(std::sync::Mutex::new(Vec::new())));
        let exec = Executor::new(recorder.clone()).with_default_model("fallback/model");
        let cancel = CancellationToken::new();

        exec.run_default("a", &skill(), &ToolSet::empty(), &cancel).await.unwrap();
        exec.run_default("b", &skill().with_model("special/model"), &ToolSet::empty(), &cancel)
            .await
            .unwrap();

        let seen = recorder.0.lock().unwrap();
        assert_eq!(seen[0].model, "fallback/model");
        assert_eq!(seen[1].model, "special/model");
        assert_eq!(seen[0].temperature, 0.2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let client = Arc::new(MockLlmClient::new(vec![ModelResponse::text("unused")]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = executor(client.clone())
            .run_default("task", &skill(), &calculator_tools(), &cancel)
            .await
            .unwrap();
        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_during_tool_keeps_pairing() {
        let started = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let mut registry = ToolRegistry::new();
        let counter = started.clone();
        let trigger = cancel.clone();
        registry.register(SimpleTool::new("hang", "cancels the run and hangs", move |_args: Value| {
            let counter = counter.clone();
            let trigger = trigger.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                trigger.cancel();
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok("unreachable".to_string())
            }
        }));
        let tools = registry.subset(&["hang"]).unwrap();

        let client = Arc::new(MockLlmClient::new(vec![ModelResponse::tool_calls(vec![
            ToolCall::new("h1", "hang", "{}"),
            ToolCall::new("h2", "hang", "{}"),
        ])]));
        let report = tokio::time::timeout(
            Duration::from_secs(5),
            executor(client.clone()).run_default("task", &Skill::new("s", "p"), &tools, &cancel),
        )
        .await
        .expect("run must stop promptly")
        .unwrap();

        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(client.call_count(), 1);
        let tool_turns: Vec<&ChatMessage> = report.messages.iter().filter(|m| m.role == Role::Tool).collect();
        assert_eq!(tool_turns.len(), 2);
        assert!(tool_turns.iter().all(|t| t.body() == "tool error: cancelled"));
    }

    #[tokio::test]
    async fn test_cancellation_in_last_step_is_not_exhaustion() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let mut registry = ToolRegistry::new();
        registry.register(SimpleTool::new("hang", "cancels the run and hangs", move |_args: Value| {
            let trigger = trigger.clone();
            async move {
                trigger.cancel();
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok("unreachable".to_string())
            }
        }));
        let tools = registry.subset(&["hang"]).unwrap();

        let client = Arc::new(MockLlmClient::new(vec![ModelResponse::tool_calls(vec![ToolCall::new(
            "h1", "hang", "{}",
        )])]));
        let limits = Limits {
            max_steps: 1,
            max_chars: 0,
            temperature: 0.2,
        };
        let report = tokio::time::timeout(
            Duration::from_secs(5),
            executor(client.clone()).run("task", &Skill::new("s", "p"), &tools, limits, &cancel),
        )
        .await
        .expect("run must stop promptly")
        .unwrap();

        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(report.steps, 1);
        assert_eq!(report.messages.last().unwrap().body(), "tool error: cancelled");
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_model_query() {
        struct Stalled;

        #[async_trait::async_trait]
        impl LlmClient for Stalled {
            async fn complete(
                &self,
                _messages: &[ChatMessage],
                _tools: &[crate::llm::ToolSchema],
                _options: &CompletionOptions,
            ) -> Result<ModelResponse, LlmError> {
                futures::future::pending::<()>().await;
                Ok(ModelResponse::text("unreachable"))
            }
        }

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let exec = Executor::new(Arc::new(Stalled));
        let report = tokio::time::timeout(
            Duration::from_secs(5),
            exec.run_default("task", &skill(), &calculator_tools(), &cancel),
        )
        .await
        .expect("run must stop promptly")
        .unwrap();

        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(report.steps, 1);
        assert_eq!(report.messages.len(), 2);
        assert_eq!(report.outcome.to_string(), "Run cancelled before completion.");
    }

    #[tokio::test]
    async fn test_context_turns_precede_task() {
        struct Fixed;

        #[async_trait::async_trait]
        impl ConversationContext for Fixed {
            async fn prior_turns(&self, _task: &str) -> anyhow::Result<Vec<ChatMessage>> {
                Ok(vec![
                    ChatMessage::user("earlier question"),
                    ChatMessage::tool("zzz", "stray tool output"),
                    ChatMessage::assistant("earlier answer"),
                ])
            }
        }

        let client = Arc::new(MockLlmClient::new(vec![ModelResponse::text("ok")]));
        let report = executor(client)
            .with_context(Arc::new(Fixed))
            .run_default("now", &skill(), &calculator_tools(), &CancellationToken::new())
            .await
            .unwrap();

        let bodies: Vec<&str> = report.messages.iter().skip(1).map(|m| m.body()).collect();
        assert_eq!(bodies, vec!["earlier question", "earlier answer", "now", "ok"]);
    }

    #[tokio::test]
    async fn test_batch_runs_are_independent_and_ordered() {
        let client = Arc::new(MockLlmClient::always(ModelResponse::text("same")));
        let exec = executor(client.clone());
        let profile = Arc::new(skill());
        let jobs: Vec<BatchJob> = (0..5)
            .map(|i| BatchJob {
                task: format!("task {}", i),
                profile: profile.clone(),
                tools: calculator_tools(),
            })
            .collect();

        let results = exec.run_batch(jobs, 2, &CancellationToken::new()).await;
        assert_eq!(results.len(), 5);
        for (i, result) in results.iter().enumerate() {
            let report = result.as_ref().unwrap();
            assert_eq!(report.steps, 1);
            assert_eq!(report.messages[1].body(), format!("task {}", i));
        }
        assert_eq!(client.call_count(), 5);
    }

    #[tokio::test]
    async fn test_chat_without_tools() {
        let client = Arc::new(MockLlmClient::new(vec![ModelResponse::text("hello there")]));
        let reply = executor(client)
            .chat(&[ChatMessage::user("hi")], None)
            .await
            .unwrap();
        assert_eq!(reply, "hello there");
    }

    #[test]
    fn test_truncate_for_log() {
        assert_eq!(truncate_for_log("short", 10), "short");
        assert_eq!(truncate_for_log("ééééé", 2), "éé... [truncated]");
    }
}
