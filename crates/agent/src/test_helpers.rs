//! Shared test helpers for loop and assembler tests.

use async_trait::async_trait;
use quillclaw_core::error::{ReasoningError, ToolError};
use quillclaw_core::reasoning::ReasoningService;
use quillclaw_core::tool::{Tool, ToolOutcome, ToolRegistry};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Route `tracing` output to the test harness. Set `RUST_LOG` to see it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A reasoning service that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and keeps
/// the payload it was given. Panics if more calls are made than responses
/// provided.
pub struct ScriptedReasoning {
    responses: Mutex<VecDeque<Result<String, ReasoningError>>>,
    payloads: Mutex<Vec<String>>,
    context_window: Option<usize>,
}

impl ScriptedReasoning {
    pub fn new(responses: Vec<Result<String, ReasoningError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            payloads: Mutex::new(Vec::new()),
            context_window: None,
        }
    }

    /// Responses that all succeed with the given text.
    pub fn texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(|t| Ok(t.into())).collect())
    }

    pub fn with_context_window(mut self, tokens: usize) -> Self {
        self.context_window = Some(tokens);
        self
    }

    pub fn call_count(&self) -> usize {
        self.payloads.lock().unwrap().len()
    }

    /// Every payload received so far, in call order.
    pub fn payloads(&self) -> Vec<String> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReasoningService for ScriptedReasoning {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, payload: &str) -> Result<String, ReasoningError> {
        self.payloads.lock().unwrap().push(payload.to_string());
        let mut responses = self.responses.lock().unwrap();
        match responses.pop_front() {
            Some(response) => response,
            None => panic!(
                "ScriptedReasoning: no more responses (call #{})",
                self.payloads.lock().unwrap().len()
            ),
        }
    }

    fn context_window(&self) -> Option<usize> {
        self.context_window
    }
}

/// A JSON plan calling `calls` in order.
pub fn plan(summary: &str, calls: &[(&str, Value)]) -> String {
    let calls: Vec<Value> = calls
        .iter()
        .map(|(tool, arguments)| json!({"tool": tool, "arguments": arguments}))
        .collect();
    json!({"thought_summary": summary, "tool_calls": calls}).to_string()
}

pub fn thought(kind: &str, content: &str) -> (&'static str, Value) {
    ("record_thought", json!({"kind": kind, "content": content}))
}

pub fn ask(question: &str) -> (&'static str, Value) {
    ("ask_user", json!({"question": question}))
}

pub fn finish(summary: &str) -> (&'static str, Value) {
    ("finish", json!({"summary": summary, "result": {"done": true}}))
}

/// Echoes its `text` argument.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes back the input"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"text": {"type": "string"}},
            "required": ["text"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutcome, ToolError> {
        let text = arguments["text"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("text is required".into()))?;
        Ok(ToolOutcome::ok(json!({"echo": text})))
    }
}

/// Always reports a failed outcome.
pub struct BrokenTool;

#[async_trait]
impl Tool for BrokenTool {
    fn name(&self) -> &str {
        "broken"
    }

    fn description(&self) -> &str {
        "Never works"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn execute(&self, _arguments: Value) -> Result<ToolOutcome, ToolError> {
        Ok(ToolOutcome::failure("section 9 does not exist"))
    }
}

pub fn registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(EchoTool));
    registry.register(Box::new(BrokenTool));
    registry
}
