//! The resumable execution loop.
//!
//! One iteration: assemble the prompt, ask the reasoning service for a plan,
//! run the planned calls in order. Three tool names are handled by the loop
//! itself:
//!
//! - **record thought** writes to the [`AgentMemoryStore`]; the history keeps
//!   only a placeholder for the call, never the thought itself,
//! - **ask user** suspends the run and hands back a [`SuspendedState`],
//! - **finish** completes the run.
//!
//! Every other call goes to the [`ToolRegistry`]; its outcome, success or
//! failure, is appended to the history and the loop asks for the next plan.

use chrono::Utc;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::context::{PromptAssembler, PromptContext, PromptInput};
use crate::history::HistoryEvent;
use crate::memory::{AgentMemoryStore, ThoughtRecord};
use crate::plan::{PlannedCall, ToolPlan, parse_plan};
use crate::settings::{DesignatedTools, LoopSettings};
use crate::state::{
    ExecutionState, FailureReason, LoopFailure, LoopState, RunOutcome, SuspendedState,
};
use quillclaw_core::agent::AgentProfile;
use quillclaw_core::event::{DomainEvent, EventBus};
use quillclaw_core::outline::{NoOutline, OutlineProvider};
use quillclaw_core::reasoning::ReasoningService;
use quillclaw_core::tool::{ToolOutcome, ToolRegistry};

/// Drives agent runs. Cheap to share; one instance can serve many agents.
pub struct ExecutionLoop {
    /// The reasoning backend
    reasoning: Arc<dyn ReasoningService>,

    /// Tool registry
    tools: Arc<ToolRegistry>,

    /// Thought memory, shared with whoever else reads it
    memory: Arc<AgentMemoryStore>,

    /// Document outline lookup for editing agents
    outline: Arc<dyn OutlineProvider>,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,

    settings: LoopSettings,
    assembler: PromptAssembler,
}

impl ExecutionLoop {
    pub fn new(
        reasoning: Arc<dyn ReasoningService>,
        tools: Arc<ToolRegistry>,
        memory: Arc<AgentMemoryStore>,
    ) -> Self {
        let settings = LoopSettings::default();
        Self {
            reasoning,
            tools,
            memory,
            outline: Arc::new(NoOutline),
            event_bus: Arc::new(EventBus::default()),
            assembler: PromptAssembler::new(&settings),
            settings,
        }
    }

    pub fn with_outline_provider(mut self, outline: Arc<dyn OutlineProvider>) -> Self {
        self.outline = outline;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn with_settings(mut self, settings: LoopSettings) -> Self {
        self.assembler = PromptAssembler::new(&settings);
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn memory(&self) -> &Arc<AgentMemoryStore> {
        &self.memory
    }

    /// Prepare a fresh run. Nothing happens until the run is stepped.
    pub fn start<'a>(
        &'a self,
        profile: &'a AgentProfile,
        task: impl Into<String>,
    ) -> ActiveRun<'a> {
        ActiveRun::new(
            self,
            profile,
            ExecutionState::new(profile.id.clone(), task),
            Start::Fresh,
        )
    }

    /// Prepare the continuation of a suspended run with the user's reply.
    /// The snapshot is validated on the first step.
    pub fn restore<'a>(
        &'a self,
        profile: &'a AgentProfile,
        suspended: SuspendedState,
        reply: impl Into<String>,
    ) -> ActiveRun<'a> {
        let SuspendedState { state, ask_call } = suspended;
        ActiveRun::new(
            self,
            profile,
            state,
            Start::Resume {
                ask_call,
                reply: reply.into(),
            },
        )
    }

    /// Run a fresh task until it completes, fails, or asks the user something.
    pub async fn run(&self, profile: &AgentProfile, task: impl Into<String>) -> RunOutcome {
        self.start(profile, task).finish().await
    }

    /// Continue a suspended run until it completes, fails, or suspends again.
    pub async fn resume(
        &self,
        profile: &AgentProfile,
        suspended: SuspendedState,
        reply: impl Into<String>,
    ) -> RunOutcome {
        self.restore(profile, suspended, reply).finish().await
    }
}

enum Start {
    Fresh,
    Resume { ask_call: PlannedCall, reply: String },
}

/// One run in progress. [`step`](Self::step) advances it by one state
/// transition; [`finish`](Self::finish) drives it until it stops.
pub struct ActiveRun<'a> {
    engine: &'a ExecutionLoop,
    profile: &'a AgentProfile,
    start: Option<Start>,
    state: ExecutionState,
    phase: LoopState,
    consecutive_failures: u32,
    pending_calls: VecDeque<PlannedCall>,
    outcome: Option<RunOutcome>,
}

impl<'a> ActiveRun<'a> {
    fn new(
        engine: &'a ExecutionLoop,
        profile: &'a AgentProfile,
        state: ExecutionState,
        start: Start,
    ) -> Self {
        Self {
            engine,
            profile,
            start: Some(start),
            state,
            phase: LoopState::Initializing,
            consecutive_failures: 0,
            pending_calls: VecDeque::new(),
            outcome: None,
        }
    }

    pub fn phase(&self) -> LoopState {
        self.phase
    }

    /// Unparsable plans in a row; reset by any usable plan.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    /// Set once the run has stopped.
    pub fn outcome(&self) -> Option<&RunOutcome> {
        self.outcome.as_ref()
    }

    /// Advance one transition and return the phase reached. Stopped runs
    /// stay where they are.
    pub async fn step(&mut self) -> LoopState {
        match self.phase {
            LoopState::Initializing => self.initialize().await,
            LoopState::AwaitingModel => self.request_plan().await,
            LoopState::AwaitingToolResults => self.dispatch_calls().await,
            LoopState::AwaitingUserInput | LoopState::Completed | LoopState::Error => {}
        }
        self.phase
    }

    /// Step until the run completes, fails, or suspends.
    pub async fn finish(mut self) -> RunOutcome {
        loop {
            if let Some(outcome) = self.outcome.take() {
                return outcome;
            }
            if self.phase.is_stopped() {
                return RunOutcome::Failed(LoopFailure {
                    reason: FailureReason::InvalidTransition,
                    message: format!("run stopped in {} without an outcome", self.phase),
                    state: self.state,
                });
            }
            self.step().await;
        }
    }

    // ── Phases ──

    async fn initialize(&mut self) {
        let profile = self.profile;
        let agent_id = profile.id.as_str();
        match self.start.take() {
            Some(Start::Fresh) | None => {
                let removed = self.engine.memory.clear(agent_id).await;
                info!(agent_id, removed, task = %self.state.pending_task, "Starting fresh run");
            }
            Some(Start::Resume { ask_call, reply }) => {
                if let Err(e) = self.state.validate_for_resume(agent_id) {
                    return self.fail(FailureReason::InvalidResumeState, e.to_string());
                }
                let question = self.state.pending_question.take().unwrap_or_default();
                let next = self.state.iteration + 1;
                self.state.history.push(next, HistoryEvent::PriorToolResult {
                    tool: ask_call.tool,
                    arguments: ask_call.arguments,
                    outcome: ToolOutcome::ok(json!({"question": question, "reply": reply})),
                });
                self.state.history.push(next, HistoryEvent::UserReply { text: reply });
                info!(agent_id, iteration = next, "Resuming run with user reply");
            }
        }
        self.transition(LoopState::AwaitingModel);
    }

    async fn request_plan(&mut self) {
        let engine = self.engine;
        let max_iterations = engine.settings.max_iterations;
        if self.state.iteration >= max_iterations {
            return self.fail(
                FailureReason::IterationLimit,
                format!("reached the limit of {max_iterations} iterations"),
            );
        }

        self.state.iteration += 1;
        let iteration = self.state.iteration;
        let agent_id = self.profile.id.clone();
        debug!(agent_id = %agent_id, iteration, "Agent loop iteration");
        engine.event_bus.publish(DomainEvent::IterationStarted {
            agent_id: agent_id.clone(),
            iteration,
            timestamp: Utc::now(),
        });

        let prompt = self.assemble(iteration).await;
        if let Some(window) = engine.reasoning.context_window() {
            let estimated = prompt.estimated_tokens();
            if estimated > window {
                return self.fail(
                    FailureReason::TokenBudgetExceeded,
                    format!(
                        "prompt needs about {estimated} tokens, {} accepts {window}",
                        engine.reasoning.name()
                    ),
                );
            }
        }

        let raw = match engine.reasoning.complete(&prompt.render()).await {
            Ok(raw) => raw,
            Err(e) => return self.fail(FailureReason::ReasoningService, e.to_string()),
        };

        match parse_plan(&raw) {
            Ok(parsed) => {
                if parsed.repaired {
                    debug!(agent_id = %agent_id, iteration, "Plan parsed after repair");
                }
                self.consecutive_failures = 0;
                let ToolPlan {
                    thought_summary,
                    calls,
                } = parsed.plan;
                if let Some(label) = thought_summary {
                    self.state
                        .history
                        .push(iteration, HistoryEvent::ThoughtSummary { label: label.clone() });
                    self.state.last_thought_summary = Some(label);
                }
                debug!(agent_id = %agent_id, iteration, calls = calls.len(), "Plan accepted");
                self.state.history.push(iteration, HistoryEvent::Plan {
                    calls: calls_for_history(&calls, &engine.settings.tools),
                    rejected: None,
                });
                self.pending_calls = calls.into();
                self.transition(LoopState::AwaitingToolResults);
            }
            Err(e) => {
                self.consecutive_failures += 1;
                let failures = self.consecutive_failures;
                warn!(agent_id = %agent_id, iteration, failures, error = %e, "Could not use plan");
                self.state.history.push(iteration, HistoryEvent::Plan {
                    calls: Vec::new(),
                    rejected: Some(e.to_string()),
                });
                engine.event_bus.publish(DomainEvent::PlanRejected {
                    agent_id,
                    iteration,
                    consecutive_failures: failures,
                    timestamp: Utc::now(),
                });

                let limit = engine.settings.max_consecutive_plan_failures;
                if failures >= limit {
                    return self.fail(
                        FailureReason::PlanFailureThreshold,
                        format!("{failures} consecutive responses could not be parsed into a plan"),
                    );
                }
                self.transition(LoopState::AwaitingModel);
            }
        }
    }

    async fn dispatch_calls(&mut self) {
        let engine = self.engine;
        let designated = &engine.settings.tools;
        while let Some(call) = self.pending_calls.pop_front() {
            if call.tool == designated.record_thought {
                self.record_thought(call).await;
            } else if call.tool == designated.ask_user {
                self.drop_remaining(&call.tool);
                return self.suspend(call);
            } else if call.tool == designated.finish {
                self.drop_remaining(&call.tool);
                return self.complete(call);
            } else {
                self.execute_tool(call).await;
            }
        }
        self.transition(LoopState::AwaitingModel);
    }

    // ── Calls ──

    async fn record_thought(&mut self, call: PlannedCall) {
        let profile = self.profile;
        let agent_id = profile.id.as_str();
        match ThoughtRecord::from_arguments(&call.arguments) {
            Ok(thought) => {
                let kind = thought.kind();
                let stored = self.engine.memory.record(agent_id, thought).await;
                debug!(agent_id, %kind, stored, "Thought recorded");
                self.engine.event_bus.publish(DomainEvent::ThoughtRecorded {
                    agent_id: agent_id.to_string(),
                    kind: kind.to_string(),
                    stored,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => {
                // The agent has to see why its note was refused.
                warn!(agent_id, error = %e, "Rejected thought");
                self.state.history.push(self.state.iteration, HistoryEvent::ToolResult {
                    tool: call.tool,
                    arguments: call.arguments,
                    outcome: ToolOutcome::failure(e.to_string()),
                    duration_ms: 0,
                });
            }
        }
    }

    async fn execute_tool(&mut self, call: PlannedCall) {
        let profile = self.profile;
        let agent_id = profile.id.as_str();
        let started = Instant::now();
        let outcome = match self.engine.tools.execute(&call.tool, call.arguments.clone()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(agent_id, tool = %call.tool, error = %e, "Tool execution failed");
                ToolOutcome::from(e)
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        debug!(
            agent_id,
            tool = %call.tool,
            success = outcome.success,
            duration_ms,
            "Tool executed"
        );
        self.engine.event_bus.publish(DomainEvent::ToolExecuted {
            agent_id: agent_id.to_string(),
            tool_name: call.tool.clone(),
            success: outcome.success,
            duration_ms,
            timestamp: Utc::now(),
        });
        self.state.history.push(self.state.iteration, HistoryEvent::ToolResult {
            tool: call.tool,
            arguments: call.arguments,
            outcome,
            duration_ms,
        });
    }

    fn suspend(&mut self, call: PlannedCall) {
        let question = first_text(&call.arguments, &["question", "prompt", "message"])
            .unwrap_or_else(|| call.arguments.to_string());
        info!(
            agent_id = %self.profile.id,
            iteration = self.state.iteration,
            "Suspending run for user input"
        );
        self.state.pending_question = Some(question);
        self.transition(LoopState::AwaitingUserInput);
        self.outcome = Some(RunOutcome::Suspended(SuspendedState {
            state: self.state.clone(),
            ask_call: call,
        }));
    }

    fn complete(&mut self, call: PlannedCall) {
        let summary = first_text(&call.arguments, &["summary", "message"]).unwrap_or_default();
        let result = call.arguments.get("result").cloned().unwrap_or(Value::Null);
        info!(agent_id = %self.profile.id, iteration = self.state.iteration, "Run completed");
        self.transition(LoopState::Completed);
        self.outcome = Some(RunOutcome::Completed {
            summary,
            result,
            state: self.state.clone(),
        });
    }

    fn drop_remaining(&mut self, after: &str) {
        if !self.pending_calls.is_empty() {
            debug!(
                agent_id = %self.profile.id,
                skipped = self.pending_calls.len(),
                after,
                "Skipping calls planned after a stopping call"
            );
            self.pending_calls.clear();
        }
    }

    // ── Plumbing ──

    async fn assemble(&self, iteration: u32) -> PromptContext {
        let engine = self.engine;
        let prior_thoughts = engine.memory.formatted(&self.profile.id).await;
        let needs_outline = self.profile.category.needs_document_outline();
        let outline = match (&self.profile.document, needs_outline) {
            (Some(document), true) => Some(engine.outline.outline(document).await),
            _ => None,
        };
        let tools = engine.tools.definitions();

        engine.assembler.assemble(&PromptInput {
            profile: self.profile,
            task: &self.state.pending_task,
            iteration,
            latest_user_reply: self.state.history.latest_user_reply(),
            prior_thoughts: &prior_thoughts,
            history: &self.state.history,
            tools: &tools,
            document_outline: outline.as_deref(),
        })
    }

    fn transition(&mut self, to: LoopState) {
        let from = self.phase;
        if let Err(e) = LoopState::validate_transition(from, to) {
            warn!(agent_id = %self.profile.id, error = %e, "Refusing state change");
            self.phase = LoopState::Error;
            self.outcome = Some(RunOutcome::Failed(LoopFailure {
                reason: FailureReason::InvalidTransition,
                message: e.to_string(),
                state: self.state.clone(),
            }));
            return;
        }
        self.phase = to;
        if from != to {
            debug!(agent_id = %self.profile.id, %from, %to, "State changed");
            self.engine.event_bus.publish(DomainEvent::StateChanged {
                agent_id: self.profile.id.clone(),
                from: from.to_string(),
                to: to.to_string(),
                timestamp: Utc::now(),
            });
        }
    }

    fn fail(&mut self, reason: FailureReason, message: String) {
        warn!(
            agent_id = %self.profile.id,
            iteration = self.state.iteration,
            reason = reason.code(),
            %message,
            "Run failed"
        );
        self.transition(LoopState::Error);
        self.outcome = Some(RunOutcome::Failed(LoopFailure {
            reason,
            message,
            state: self.state.clone(),
        }));
    }
}

/// Placeholder for record-thought arguments in the plan history entry.
const THOUGHT_PLACEHOLDER: &str = "[kept in thought memory]";

/// Plan calls as the history stores them. Thoughts reach later prompts only
/// through the memory store, so their arguments are replaced.
fn calls_for_history(calls: &[PlannedCall], tools: &DesignatedTools) -> Vec<PlannedCall> {
    calls
        .iter()
        .map(|call| {
            if call.tool == tools.record_thought {
                PlannedCall::new(call.tool.clone(), json!(THOUGHT_PLACEHOLDER))
            } else {
                call.clone()
            }
        })
        .collect()
}

fn first_text(arguments: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| arguments.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::IterationHistory;
    use crate::test_helpers::*;
    use quillclaw_core::agent::AgentCategory;
    use quillclaw_core::error::ReasoningError;

    fn profile() -> AgentProfile {
        AgentProfile::new("writer", AgentCategory::Editor, "Edit for clarity.")
    }

    fn engine(reasoning: Arc<ScriptedReasoning>) -> ExecutionLoop {
        ExecutionLoop::new(
            reasoning,
            Arc::new(registry()),
            Arc::new(AgentMemoryStore::default()),
        )
    }

    /// Body of the rendered section titled `title`.
    fn section_body<'p>(payload: &'p str, title: &str) -> &'p str {
        let header = format!("{title}\n\n");
        let start = payload.find(&header).expect("section present") + header.len();
        let rest = &payload[start..];
        rest.find("\n## ").map_or(rest, |end| &rest[..end])
    }

    fn user_replies(history: &IterationHistory, iteration: u32) -> Vec<String> {
        history
            .for_iteration(iteration)
            .filter_map(|e| match &e.event {
                HistoryEvent::UserReply { text } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn finish_completes_the_run() {
        let reasoning = Arc::new(ScriptedReasoning::texts([plan(
            "Wrapping up",
            &[("echo", json!({"text": "hi"})), finish("All done")],
        )]));
        let engine = engine(reasoning.clone());

        let outcome = engine.run(&profile(), "Say hi").await;
        let RunOutcome::Completed { summary, result, state } = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(summary, "All done");
        assert_eq!(result, json!({"done": true}));
        assert_eq!(state.iteration, 1);
        assert_eq!(state.last_thought_summary.as_deref(), Some("Wrapping up"));
        assert!(state.history.iter().any(|e| matches!(
            &e.event,
            HistoryEvent::ToolResult { tool, outcome, .. } if tool == "echo" && outcome.success
        )));
        assert_eq!(reasoning.call_count(), 1);
    }

    #[tokio::test]
    async fn three_bad_plans_end_in_error() {
        init_tracing();
        let reasoning = Arc::new(ScriptedReasoning::texts(["no idea", "still nothing", "{broken"]));
        let engine = engine(reasoning.clone());

        let outcome = engine.run(&profile(), "Edit").await;
        let RunOutcome::Failed(failure) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(failure.code(), "plan_failure_threshold");
        assert_eq!(failure.state.iteration, 3);
        let rejected = failure
            .state
            .history
            .iter()
            .filter(|e| matches!(&e.event, HistoryEvent::Plan { rejected: Some(_), .. }))
            .count();
        assert_eq!(rejected, 3);
        assert_eq!(reasoning.call_count(), 3);
    }

    #[tokio::test]
    async fn a_valid_plan_resets_the_failure_counter() {
        let reasoning = Arc::new(ScriptedReasoning::texts([
            "garbage".to_string(),
            "more garbage".to_string(),
            plan("Recovering", &[("echo", json!({"text": "ok"}))]),
        ]));
        let engine = engine(reasoning);
        let profile = profile();
        let mut run = engine.start(&profile, "Edit");

        assert_eq!(run.step().await, LoopState::AwaitingModel);
        assert_eq!(run.step().await, LoopState::AwaitingModel);
        assert_eq!(run.consecutive_failures(), 1);
        assert_eq!(run.step().await, LoopState::AwaitingModel);
        assert_eq!(run.consecutive_failures(), 2);
        assert_eq!(run.step().await, LoopState::AwaitingToolResults);
        assert_eq!(run.consecutive_failures(), 0);
        assert!(run.outcome().is_none());
        assert_eq!(run.step().await, LoopState::AwaitingModel);
    }

    #[tokio::test]
    async fn failure_threshold_is_configurable() {
        let reasoning = Arc::new(ScriptedReasoning::texts(["nope"]));
        let mut settings = LoopSettings::default();
        settings.max_consecutive_plan_failures = 1;
        let engine = engine(reasoning).with_settings(settings);

        let outcome = engine.run(&profile(), "Edit").await;
        assert!(matches!(
            outcome,
            RunOutcome::Failed(f) if f.reason == FailureReason::PlanFailureThreshold
        ));
    }

    #[tokio::test]
    async fn suspend_and_resume_keeps_memory() {
        init_tracing();
        let reasoning = Arc::new(ScriptedReasoning::texts([
            plan(
                "Surveying",
                &[thought("analysis", "Intro repeats itself"), ("echo", json!({"text": "read"}))],
            ),
            plan(
                "Checking",
                &[thought("planning", "Cut the second paragraph"), ask("Cut paragraph two?")],
            ),
            plan("Applying", &[finish("Cut it")]),
        ]));
        let engine = engine(reasoning.clone());
        let profile = profile();

        let outcome = engine.run(&profile, "Tighten the intro").await;
        let RunOutcome::Suspended(suspended) = outcome else {
            panic!("expected suspension, got {outcome:?}");
        };
        assert_eq!(suspended.state.iteration, 2);
        assert_eq!(suspended.question(), "Cut paragraph two?");
        assert_eq!(engine.memory().count("writer").await, 2);

        // Hosts persist the snapshot as JSON between the two calls.
        let stored = serde_json::to_string(&suspended).unwrap();
        let suspended: SuspendedState = serde_json::from_str(&stored).unwrap();

        let outcome = engine.resume(&profile, suspended, "confirmed").await;
        let RunOutcome::Completed { state, .. } = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(user_replies(&state.history, 3), ["confirmed"]);
        assert!(state.history.for_iteration(3).any(|e| matches!(
            &e.event,
            HistoryEvent::PriorToolResult { tool, .. } if tool == "ask_user"
        )));
        assert_eq!(engine.memory().count("writer").await, 2);

        let third_prompt = &reasoning.payloads()[2];
        assert!(third_prompt.contains("Intro repeats itself"));
        assert!(third_prompt.contains("Cut the second paragraph"));
        assert!(third_prompt.contains("Latest User Reply\n\nconfirmed"));
    }

    #[tokio::test]
    async fn fresh_run_clears_memory() {
        let reasoning = Arc::new(ScriptedReasoning::texts([
            plan("Noting", &[thought("planning", "first run"), finish("done")]),
            plan("Noting", &[finish("done")]),
        ]));
        let engine = engine(reasoning);
        let profile = profile();

        engine.run(&profile, "one").await;
        assert_eq!(engine.memory().count("writer").await, 1);
        engine.run(&profile, "two").await;
        assert_eq!(engine.memory().count("writer").await, 0);
    }

    #[tokio::test]
    async fn recorded_thoughts_stay_out_of_history() {
        let reasoning = Arc::new(ScriptedReasoning::texts([
            plan("Thinking", &[thought("reflection", "SECRET NOTE"), finish("done")]),
        ]));
        let engine = engine(reasoning);

        let outcome = engine.run(&profile(), "t").await;
        let state = outcome.state();
        assert!(!state.history.iter().any(|e| matches!(
            &e.event,
            HistoryEvent::ToolResult { tool, .. } if tool == "record_thought"
        )));
        assert_eq!(engine.memory().count("writer").await, 1);
    }

    #[tokio::test]
    async fn thoughts_reach_later_prompts_only_through_memory() {
        let reasoning = Arc::new(ScriptedReasoning::texts([
            plan(
                "Thinking",
                &[thought("reflection", "SECRET NOTE"), ("echo", json!({"text": "hi"}))],
            ),
            plan("Done", &[finish("done")]),
        ]));
        let engine = engine(reasoning.clone());

        let outcome = engine.run(&profile(), "t").await;
        assert!(outcome.is_completed());

        let second = &reasoning.payloads()[1];
        let dynamic = section_body(second, "Dynamic Context");
        assert!(dynamic.contains("tool: record_thought"), "{dynamic}");
        assert!(dynamic.contains(THOUGHT_PLACEHOLDER));
        assert!(!dynamic.contains("SECRET NOTE"), "{dynamic}");
        assert!(section_body(second, "Prior Thoughts").contains("SECRET NOTE"));

        let history = serde_json::to_string(&outcome.state().history).unwrap();
        assert!(!history.contains("SECRET NOTE"));
    }

    #[tokio::test]
    async fn invalid_thought_is_reported_in_history() {
        let reasoning = Arc::new(ScriptedReasoning::texts([
            plan("Thinking", &[("record_thought", json!({"kind": "daydream", "content": "x"}))]),
            plan("Done", &[finish("done")]),
        ]));
        let engine = engine(reasoning);

        let outcome = engine.run(&profile(), "t").await;
        assert!(outcome.state().history.iter().any(|e| matches!(
            &e.event,
            HistoryEvent::ToolResult { tool, outcome, .. }
                if tool == "record_thought" && !outcome.success
        )));
        assert_eq!(engine.memory().count("writer").await, 0);
    }

    #[tokio::test]
    async fn tool_failures_are_recorded_and_the_run_continues() {
        let reasoning = Arc::new(ScriptedReasoning::texts([
            plan("Trying", &[("broken", json!({})), ("missing_tool", json!({}))]),
            plan("Done", &[finish("gave up on section 9")]),
        ]));
        let engine = engine(reasoning.clone());

        let outcome = engine.run(&profile(), "t").await;
        assert!(outcome.is_completed());
        let failures: Vec<&str> = outcome
            .state()
            .history
            .iter()
            .filter_map(|e| match &e.event {
                HistoryEvent::ToolResult { tool, outcome, .. } if !outcome.success => {
                    Some(tool.as_str())
                }
                _ => None,
            })
            .collect();
        assert_eq!(failures, ["broken", "missing_tool"]);
        assert!(reasoning.payloads()[1].contains("section 9 does not exist"));
    }

    #[tokio::test]
    async fn calls_after_finish_are_not_run() {
        let reasoning = Arc::new(ScriptedReasoning::texts([plan(
            "Ending",
            &[finish("done"), ("echo", json!({"text": "late"}))],
        )]));
        let engine = engine(reasoning);

        let outcome = engine.run(&profile(), "t").await;
        let history = &outcome.state().history;
        assert!(!history.iter().any(|e| matches!(&e.event, HistoryEvent::ToolResult { .. })));
    }

    #[tokio::test]
    async fn reasoning_errors_are_fatal() {
        let reasoning = Arc::new(ScriptedReasoning::new(vec![Err(ReasoningError::Timeout(
            "no response in 30s".into(),
        ))]));
        let engine = engine(reasoning);

        let outcome = engine.run(&profile(), "t").await;
        assert!(matches!(outcome, RunOutcome::Failed(f) if f.code() == "reasoning_service"));
    }

    #[tokio::test]
    async fn invalid_resume_state_fails_before_any_iteration() {
        let reasoning = Arc::new(ScriptedReasoning::texts(Vec::<String>::new()));
        let engine = engine(reasoning.clone());
        let mut state = ExecutionState::new("someone_else", "t");
        state.iteration = 1;
        let suspended = SuspendedState {
            state,
            ask_call: PlannedCall::new("ask_user", json!({"question": "?"})),
        };

        let outcome = engine.resume(&profile(), suspended, "yes").await;
        assert!(matches!(outcome, RunOutcome::Failed(ref f) if f.code() == "invalid_resume_state"));
        assert_eq!(reasoning.call_count(), 0);
    }

    #[tokio::test]
    async fn iteration_limit_stops_the_run() {
        let reasoning = Arc::new(ScriptedReasoning::texts([
            plan("a", &[("echo", json!({"text": "1"}))]),
            plan("b", &[("echo", json!({"text": "2"}))]),
        ]));
        let mut settings = LoopSettings::default();
        settings.max_iterations = 2;
        let engine = engine(reasoning).with_settings(settings);

        let outcome = engine.run(&profile(), "t").await;
        assert!(matches!(outcome, RunOutcome::Failed(ref f) if f.code() == "iteration_limit"));
        assert_eq!(outcome.state().iteration, 2);
    }

    #[tokio::test]
    async fn oversized_prompt_fails_the_token_budget() {
        let reasoning =
            Arc::new(ScriptedReasoning::texts(Vec::<String>::new()).with_context_window(10));
        let engine = engine(reasoning.clone());

        let outcome = engine.run(&profile(), "t").await;
        assert!(matches!(
            outcome,
            RunOutcome::Failed(ref f) if f.code() == "token_budget_exceeded"
        ));
        assert_eq!(reasoning.call_count(), 0);
    }

    #[tokio::test]
    async fn events_trace_the_run() {
        let reasoning = Arc::new(ScriptedReasoning::texts([plan(
            "Go",
            &[thought("planning", "p"), ("echo", json!({"text": "x"})), finish("done")],
        )]));
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let engine = engine(reasoning).with_event_bus(bus);

        engine.run(&profile(), "t").await;

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(match event.as_ref() {
                DomainEvent::IterationStarted { .. } => "iteration",
                DomainEvent::PlanRejected { .. } => "rejected",
                DomainEvent::ToolExecuted { .. } => "tool",
                DomainEvent::ThoughtRecorded { .. } => "thought",
                DomainEvent::StateChanged { to, .. } if to == "completed" => "completed",
                DomainEvent::StateChanged { .. } => "state",
            });
        }
        assert_eq!(names, ["state", "iteration", "state", "thought", "tool", "completed"]);
    }

    #[tokio::test]
    async fn editors_get_the_document_outline() {
        struct FixedOutline;

        #[async_trait::async_trait]
        impl OutlineProvider for FixedOutline {
            async fn outline(&self, _document: &std::path::Path) -> String {
                "# Chapter 1\n## Opening".into()
            }
        }

        let reasoning = Arc::new(ScriptedReasoning::texts([plan("Done", &[finish("ok")])]));
        let engine = engine(reasoning.clone()).with_outline_provider(Arc::new(FixedOutline));
        let profile = profile().with_document("book/ch1.md");

        engine.run(&profile, "t").await;
        assert!(reasoning.payloads()[0].contains("Document Structure\n\n# Chapter 1\n## Opening"));
    }
}
