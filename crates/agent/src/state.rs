//! Run state: the loop's phases, the resumable snapshot, and run outcomes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::history::{HistoryEntry, IterationHistory};
use crate::plan::PlannedCall;

/// Snapshot format understood by this crate.
pub const STATE_VERSION: u32 = 1;

fn current_version() -> u32 {
    STATE_VERSION
}

// ── Phases ────────────────────────────────────────────────────────────────

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Initializing,
    AwaitingModel,
    AwaitingToolResults,
    AwaitingUserInput,
    Completed,
    Error,
}

impl LoopState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::AwaitingModel => "awaiting_model",
            Self::AwaitingToolResults => "awaiting_tool_results",
            Self::AwaitingUserInput => "awaiting_user_input",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// `Completed` and `Error` end a run for good.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Whether the run has stopped advancing, terminally or pending a reply.
    pub fn is_stopped(self) -> bool {
        self.is_terminal() || self == Self::AwaitingUserInput
    }

    pub fn validate_transition(from: Self, to: Self) -> Result<(), StateError> {
        let valid = match (from, to) {
            (Self::Initializing, Self::AwaitingModel) => true,
            (Self::Initializing, Self::Error) => true,
            // A rejected plan sends the run straight back for another response
            (Self::AwaitingModel, Self::AwaitingModel) => true,
            (Self::AwaitingModel, Self::AwaitingToolResults) => true,
            (Self::AwaitingModel, Self::Error) => true,
            (Self::AwaitingToolResults, Self::AwaitingModel) => true,
            (Self::AwaitingToolResults, Self::AwaitingUserInput) => true,
            (Self::AwaitingToolResults, Self::Completed) => true,
            (Self::AwaitingToolResults, Self::Error) => true,
            // A suspended run continues through a fresh `restore`
            (Self::AwaitingUserInput, _) => false,
            (Self::Completed, _) | (Self::Error, _) => false,
            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(StateError::InvalidTransition { from, to })
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StateError {
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: LoopState, to: LoopState },

    #[error("invalid resume state: {0}")]
    InvalidResume(String),
}

// ── Snapshot ──────────────────────────────────────────────────────────────

/// Everything needed to pick a run back up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    #[serde(default = "current_version")]
    pub version: u32,
    pub agent_id: String,
    /// Iterations started so far.
    pub iteration: u32,
    pub history: IterationHistory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_thought_summary: Option<String>,
    pub pending_task: String,
    /// Question that suspended the run, if it is suspended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_question: Option<String>,
}

impl ExecutionState {
    pub fn new(agent_id: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            version: STATE_VERSION,
            agent_id: agent_id.into(),
            iteration: 0,
            history: IterationHistory::new(),
            last_thought_summary: None,
            pending_task: task.into(),
            pending_question: None,
        }
    }

    /// Check a snapshot before resuming it for `agent_id`.
    pub fn validate_for_resume(&self, agent_id: &str) -> Result<(), StateError> {
        let invalid = |msg: String| Err(StateError::InvalidResume(msg));

        if self.version != STATE_VERSION {
            return invalid(format!(
                "unsupported state version {} (expected {STATE_VERSION})",
                self.version
            ));
        }
        if self.agent_id.trim().is_empty() {
            return invalid("agent id is empty".into());
        }
        if self.agent_id != agent_id {
            return invalid(format!(
                "state belongs to agent '{}', not '{agent_id}'",
                self.agent_id
            ));
        }
        if self.pending_task.trim().is_empty() {
            return invalid("pending task is empty".into());
        }
        if self.iteration == 0 {
            return invalid("no iteration has run yet".into());
        }
        let out_of_range = |e: &&HistoryEntry| e.iteration == 0 || e.iteration > self.iteration;
        if let Some(entry) = self.history.iter().find(out_of_range) {
            return invalid(format!(
                "history entry for iteration {} outside 1..={}",
                entry.iteration, self.iteration
            ));
        }
        if self
            .history
            .entries()
            .windows(2)
            .any(|w| w[0].iteration > w[1].iteration)
        {
            return invalid("history entries are out of order".into());
        }
        Ok(())
    }
}

/// A run paused on a question to the user. Plain data; hosts persist it
/// however they like and hand it back to `resume`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspendedState {
    pub state: ExecutionState,
    /// The call that asked the question.
    pub ask_call: PlannedCall,
}

impl SuspendedState {
    pub fn question(&self) -> &str {
        self.state.pending_question.as_deref().unwrap_or_default()
    }

    pub fn agent_id(&self) -> &str {
        &self.state.agent_id
    }
}

// ── Outcomes ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    PlanFailureThreshold,
    ReasoningService,
    InvalidResumeState,
    IterationLimit,
    TokenBudgetExceeded,
    InvalidTransition,
}

impl FailureReason {
    /// Machine-readable reason code.
    pub fn code(self) -> &'static str {
        match self {
            Self::PlanFailureThreshold => "plan_failure_threshold",
            Self::ReasoningService => "reasoning_service",
            Self::InvalidResumeState => "invalid_resume_state",
            Self::IterationLimit => "iteration_limit",
            Self::TokenBudgetExceeded => "token_budget_exceeded",
            Self::InvalidTransition => "invalid_transition",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopFailure {
    pub reason: FailureReason,
    pub message: String,
    /// State at the moment of failure.
    pub state: ExecutionState,
}

impl LoopFailure {
    pub fn code(&self) -> &'static str {
        self.reason.code()
    }
}

impl fmt::Display for LoopFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason, self.message)
    }
}

/// How a call to `run` or `resume` ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed {
        summary: String,
        result: Value,
        state: ExecutionState,
    },
    Suspended(SuspendedState),
    Failed(LoopFailure),
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn state(&self) -> &ExecutionState {
        match self {
            Self::Completed { state, .. } => state,
            Self::Suspended(suspended) => &suspended.state,
            Self::Failed(failure) => &failure.state,
        }
    }
}
