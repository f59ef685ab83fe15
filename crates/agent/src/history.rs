//! Iteration history: the append-only record of what happened in a run.
//!
//! Every entry is tagged with the iteration that produced it. Entries are
//! never edited once pushed; the prompt assembler only formats them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plan::PlannedCall;
use quillclaw_core::tool::ToolOutcome;

/// One line item of an iteration's record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub iteration: u32,
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: HistoryEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEvent {
    /// The short label the agent gave its current line of thought.
    ThoughtSummary { label: String },

    /// The calls the reasoning service asked for. Empty with a `rejected`
    /// reason when the response could not be parsed.
    Plan {
        calls: Vec<PlannedCall>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rejected: Option<String>,
    },

    /// Outcome of a registry tool, successful or not.
    ToolResult {
        tool: String,
        #[serde(default)]
        arguments: Value,
        outcome: ToolOutcome,
        duration_ms: u64,
    },

    /// The call that suspended the run, replayed into the resumed iteration.
    PriorToolResult {
        tool: String,
        #[serde(default)]
        arguments: Value,
        outcome: ToolOutcome,
    },

    /// What the user answered after a suspension.
    UserReply { text: String },
}

impl HistoryEvent {
    /// Display rank within one iteration.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            Self::ThoughtSummary { .. } => 0,
            Self::Plan { .. } => 1,
            Self::ToolResult { .. } => 2,
            Self::PriorToolResult { .. } => 3,
            Self::UserReply { .. } => 4,
        }
    }
}

/// Ordered, append-only list of [`HistoryEntry`] values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IterationHistory {
    entries: Vec<HistoryEntry>,
}

impl IterationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, iteration: u32, event: HistoryEvent) {
        self.entries.push(HistoryEntry {
            iteration,
            recorded_at: Utc::now(),
            event,
        });
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries written during `iteration`, in append order.
    pub fn for_iteration(&self, iteration: u32) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter().filter(move |e| e.iteration == iteration)
    }

    /// The most recent user reply in the run, if the run was ever resumed.
    pub fn latest_user_reply(&self) -> Option<&str> {
        self.entries.iter().rev().find_map(|e| match &e.event {
            HistoryEvent::UserReply { text } => Some(text.as_str()),
            _ => None,
        })
    }
}
