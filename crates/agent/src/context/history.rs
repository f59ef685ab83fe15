//! Iteration history rendering.
//!
//! History is grouped by iteration, oldest first, separated by
//! [`ITERATION_DELIMITER`]. Inside an iteration entries appear as: thought
//! summary, plan, tool results, results carried over from before a pause,
//! user reply. Results of tools listed as condensed are reduced to their
//! outcome, counts and duration; everything else goes through the
//! serializer as is.

use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use crate::history::{HistoryEntry, HistoryEvent, IterationHistory};
use crate::serializer::{self, RenderLimits};
use quillclaw_core::tool::ToolOutcome;

pub const ITERATION_DELIMITER: &str = "----------------------------------------";

/// Formats an [`IterationHistory`] for the prompt.
#[derive(Debug, Clone, Default)]
pub struct HistoryFormatter {
    limits: RenderLimits,
    condensed_tools: BTreeSet<String>,
}

impl HistoryFormatter {
    pub fn new(limits: RenderLimits, condensed_tools: BTreeSet<String>) -> Self {
        Self {
            limits,
            condensed_tools,
        }
    }

    pub fn format(&self, history: &IterationHistory) -> String {
        let mut by_iteration: BTreeMap<u32, Vec<&HistoryEntry>> = BTreeMap::new();
        for entry in history.iter() {
            by_iteration.entry(entry.iteration).or_default().push(entry);
        }

        let blocks: Vec<String> = by_iteration
            .into_iter()
            .map(|(iteration, mut entries)| {
                // Stable: entries of the same kind keep append order.
                entries.sort_by_key(|e| e.event.rank());
                let mut block = format!("Iteration {iteration}\n");
                for entry in entries {
                    self.write_entry(&mut block, &entry.event);
                }
                block
            })
            .collect();

        blocks.join(&format!("{ITERATION_DELIMITER}\n"))
    }

    fn write_entry(&self, out: &mut String, event: &HistoryEvent) {
        match event {
            HistoryEvent::ThoughtSummary { label } => {
                let _ = writeln!(out, "Thought: {label}");
            }
            HistoryEvent::Plan {
                calls,
                rejected: Some(reason),
            } if calls.is_empty() => {
                let _ = writeln!(out, "Plan: (empty, the response could not be used: {reason})");
            }
            HistoryEvent::Plan { calls, .. } => {
                out.push_str("Plan:\n");
                let value = serde_json::to_value(calls).unwrap_or(Value::Null);
                self.render(out, &value, Some("calls"));
            }
            HistoryEvent::ToolResult {
                tool,
                arguments,
                outcome,
                duration_ms,
            } => {
                let status = if outcome.success { "success" } else { "failed" };
                if self.condensed_tools.contains(tool) {
                    let _ = writeln!(
                        out,
                        "Result of {tool} ({status}, {duration_ms} ms, condensed):"
                    );
                    self.render(out, &condense(outcome, arguments, *duration_ms), None);
                } else {
                    let _ = writeln!(out, "Result of {tool} ({status}, {duration_ms} ms):");
                    let value = serde_json::to_value(outcome).unwrap_or(Value::Null);
                    self.render(out, &value, None);
                }
            }
            HistoryEvent::PriorToolResult { tool, outcome, .. } => {
                let _ = writeln!(out, "Carried over from before the pause, result of {tool}:");
                let value = serde_json::to_value(outcome).unwrap_or(Value::Null);
                self.render(out, &value, None);
            }
            HistoryEvent::UserReply { text } => {
                let _ = writeln!(out, "User reply: {text}");
            }
        }
    }

    fn render(&self, out: &mut String, value: &Value, array_context: Option<&str>) {
        let (graph, root) = serializer::DataGraph::from_json(value);
        let mut visited = Default::default();
        serializer::render_into(
            out,
            &graph,
            root,
            serializer::Position {
                indent: 0,
                array_context,
            },
            &mut visited,
            &self.limits,
        );
    }
}

/// Outcome flag, duration and sizes of a tool result without its payload.
fn condense(outcome: &ToolOutcome, arguments: &Value, duration_ms: u64) -> Value {
    let mut summary = Map::new();
    summary.insert("success".into(), json!(outcome.success));
    summary.insert("duration_ms".into(), json!(duration_ms));
    let requested = counts(arguments);
    if !requested.is_empty() {
        summary.insert("requested".into(), Value::Object(requested));
    }
    if let Some(result) = &outcome.result {
        let produced = counts(result);
        if !produced.is_empty() {
            summary.insert("result_counts".into(), Value::Object(produced));
        }
    }
    if let Some(error) = &outcome.error {
        summary.insert("error".into(), json!(error));
    }
    Value::Object(summary)
}

fn counts(value: &Value) -> Map<String, Value> {
    let mut counts = Map::new();
    match value {
        Value::Object(fields) => {
            for (key, field) in fields {
                match field {
                    Value::Array(items) => {
                        counts.insert(key.clone(), json!(items.len()));
                    }
                    Value::Object(inner) => {
                        counts.insert(key.clone(), json!(inner.len()));
                    }
                    Value::Number(n) => {
                        counts.insert(key.clone(), Value::Number(n.clone()));
                    }
                    _ => {}
                }
            }
        }
        Value::Array(items) => {
            counts.insert("items".into(), json!(items.len()));
        }
        _ => {}
    }
    counts
}
