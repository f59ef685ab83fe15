//! Tool plans: turning reasoning-service output into tool calls.
//!
//! The reasoning service is asked for a JSON object:
//!
//! ```json
//! {
//!   "thought_summary": "Tightening the introduction",
//!   "tool_calls": [{ "tool": "replace_content", "arguments": { "section": 1 } }]
//! }
//! ```
//!
//! Models drift from that shape, so a strict parse is followed by exactly
//! one repair pass (fenced or prose-wrapped JSON, smart quotes, single
//! quotes, trailing commas). Anything still unreadable is a [`PlanError`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// One requested tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedCall {
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
}

impl PlannedCall {
    pub fn new(tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool: tool.into(),
            arguments,
        }
    }
}

/// The ordered calls for one iteration, plus the agent's label for them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolPlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_summary: Option<String>,
    pub calls: Vec<PlannedCall>,
}

/// A successfully parsed plan and whether the repair pass was needed.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPlan {
    pub plan: ToolPlan,
    pub repaired: bool,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    #[error("reasoning service returned an empty response")]
    Empty,

    #[error("response is not valid JSON even after repair: {0}")]
    Malformed(String),

    #[error("plan has an unexpected shape: {0}")]
    InvalidShape(String),

    #[error("plan contains no tool calls")]
    NoCalls,
}

const SUMMARY_KEYS: [&str; 3] = ["thought_summary", "thoughtSummary", "current_thought"];
const CALLS_KEYS: [&str; 3] = ["tool_calls", "toolCalls", "calls"];
const NAME_KEYS: [&str; 3] = ["tool", "name", "tool_name"];
const ARGUMENT_KEYS: [&str; 4] = ["arguments", "args", "parameters", "input"];

/// Parse raw reasoning output into a plan.
pub fn parse_plan(raw: &str) -> Result<ParsedPlan, PlanError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PlanError::Empty);
    }

    let strict = serde_json::from_str::<Value>(trimmed)
        .map_err(|e| PlanError::Malformed(e.to_string()))
        .and_then(plan_from_value);
    let first_error = match strict {
        Ok(plan) => {
            return Ok(ParsedPlan {
                plan,
                repaired: false,
            });
        }
        Err(e) => e,
    };

    let Some(candidate) = repair(trimmed) else {
        return Err(first_error);
    };
    debug!(error = %first_error, "Strict plan parse failed, trying repaired text");

    let value = serde_json::from_str::<Value>(&candidate)
        .map_err(|e| PlanError::Malformed(e.to_string()))?;
    let plan = plan_from_value(value)?;
    Ok(ParsedPlan {
        plan,
        repaired: true,
    })
}

/// Interpret a JSON value as a plan: an object carrying a call list, a bare
/// array of calls, or a single call object.
pub fn plan_from_value(value: Value) -> Result<ToolPlan, PlanError> {
    let plan = match value {
        Value::Array(items) => ToolPlan {
            thought_summary: None,
            calls: calls_from_items(items)?,
        },
        Value::Object(mut map) => {
            let thought_summary = take_first(&mut map, &SUMMARY_KEYS).and_then(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                _ => None,
            });
            match take_first(&mut map, &CALLS_KEYS) {
                Some(Value::Array(items)) => ToolPlan {
                    thought_summary,
                    calls: calls_from_items(items)?,
                },
                Some(_) => return Err(PlanError::InvalidShape("tool_calls must be a list".into())),
                None if NAME_KEYS.iter().any(|k| map.contains_key(*k)) => ToolPlan {
                    thought_summary,
                    calls: vec![call_from_map(map)?],
                },
                None => return Err(PlanError::InvalidShape("missing tool_calls".into())),
            }
        }
        other => {
            return Err(PlanError::InvalidShape(format!(
                "expected an object or a list, got {}",
                kind_name(&other)
            )));
        }
    };

    if plan.calls.is_empty() {
        return Err(PlanError::NoCalls);
    }
    Ok(plan)
}

fn calls_from_items(items: Vec<Value>) -> Result<Vec<PlannedCall>, PlanError> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => call_from_map(map),
            other => Err(PlanError::InvalidShape(format!(
                "call {} is {}, not an object",
                i + 1,
                kind_name(&other)
            ))),
        })
        .collect()
}

fn call_from_map(mut map: Map<String, Value>) -> Result<PlannedCall, PlanError> {
    let tool = match take_first(&mut map, &NAME_KEYS) {
        Some(Value::String(name)) if !name.trim().is_empty() => name.trim().to_string(),
        _ => return Err(PlanError::InvalidShape("call without a tool name".into())),
    };
    let arguments = match take_first(&mut map, &ARGUMENT_KEYS) {
        None | Some(Value::Null) => Value::Object(Map::new()),
        // Some models double-encode arguments as a JSON string.
        Some(Value::String(text)) => match serde_json::from_str::<Value>(&text) {
            Ok(parsed @ Value::Object(_)) => parsed,
            _ => Value::String(text),
        },
        Some(other) => other,
    };
    Ok(PlannedCall { tool, arguments })
}

fn take_first(map: &mut Map<String, Value>, keys: &[&str]) -> Option<Value> {
    keys.iter().find_map(|k| map.remove(*k))
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

// ── Repair ────────────────────────────────────────────────────────────────

/// Produce a repaired candidate, or `None` when the text contains nothing
/// that looks like JSON.
fn repair(raw: &str) -> Option<String> {
    let normalized = normalize_quotes(raw);
    let extracted = extract_json(&normalized)?;
    let quoted = single_to_double_quotes(&extracted);
    Some(strip_trailing_commas(&quoted))
}

/// Pull JSON out of a fenced block or surrounding prose.
fn extract_json(content: &str) -> Option<String> {
    if let Some(start) = content.find("```json") {
        let body = start + "```json".len();
        if let Some(end) = content[body..].find("```") {
            return Some(content[body..body + end].trim().to_string());
        }
    }

    if let Some(start) = content.find("```") {
        let fence = start + 3;
        let body = content[fence..].find('\n').map_or(fence, |n| fence + n + 1);
        if let Some(end) = content[body..].find("```") {
            return Some(content[body..body + end].trim().to_string());
        }
    }

    let open = content.find(['{', '['])?;
    let close_char = if content[open..].starts_with('{') { '}' } else { ']' };
    let close = content.rfind(close_char)?;
    (close > open).then(|| content[open..=close].to_string())
}

fn normalize_quotes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' => '"',
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' => '\'',
            other => other,
        })
        .collect()
}

/// Rewrite single-quoted strings as double-quoted ones. Apostrophes inside
/// double-quoted strings are left alone.
fn single_to_double_quotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                out.push('"');
                copy_string_body(&mut chars, &mut out, '"');
            }
            '\'' => {
                out.push('"');
                let mut escaped = false;
                for c in chars.by_ref() {
                    if escaped {
                        if c != '\'' {
                            out.push('\\');
                        }
                        out.push(c);
                        escaped = false;
                    } else if c == '\\' {
                        escaped = true;
                    } else if c == '\'' {
                        break;
                    } else if c == '"' {
                        out.push_str("\\\"");
                    } else {
                        out.push(c);
                    }
                }
                out.push('"');
            }
            other => out.push(other),
        }
    }
    out
}

/// Drop commas that directly precede `}` or `]`.
fn strip_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                out.push('"');
                copy_string_body(&mut chars, &mut out, '"');
            }
            ',' => {
                let rest: String =
                    chars.clone().skip_while(|c| c.is_whitespace()).take(1).collect();
                if rest != "}" && rest != "]" {
                    out.push(',');
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Copy a string body up to and including its closing `quote`, honouring
/// backslash escapes.
fn copy_string_body(chars: &mut impl Iterator<Item = char>, out: &mut String, quote: char) {
    let mut escaped = false;
    for c in chars.by_ref() {
        out.push(c);
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return;
        }
    }
}
