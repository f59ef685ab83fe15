//! Thought records: an agent's structured notes about its own reasoning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The kind of reasoning a thought captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtKind {
    Planning,
    Analysis,
    Synthesis,
    Reflection,
    Derivation,
}

impl ThoughtKind {
    pub const ALL: [ThoughtKind; 5] = [
        ThoughtKind::Planning,
        ThoughtKind::Analysis,
        ThoughtKind::Synthesis,
        ThoughtKind::Reflection,
        ThoughtKind::Derivation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Analysis => "analysis",
            Self::Synthesis => "synthesis",
            Self::Reflection => "reflection",
            Self::Derivation => "derivation",
        }
    }
}

impl fmt::Display for ThoughtKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThoughtKind {
    type Err = ThoughtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| ThoughtError::UnknownKind(s.to_string()))
    }
}

/// Thought content: free text or a keyed structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThoughtContent {
    Text(String),
    Structured(Map<String, Value>),
}

impl From<&str> for ThoughtContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for ThoughtContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Map<String, Value>> for ThoughtContent {
    fn from(map: Map<String, Value>) -> Self {
        Self::Structured(map)
    }
}

/// One recorded thought. Fields are private: a record never changes after
/// it has been built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThoughtRecord {
    id: String,
    kind: ThoughtKind,
    content: ThoughtContent,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    next_steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context: Option<String>,
    recorded_at: DateTime<Utc>,
}

/// Errors building a thought from tool-call arguments.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ThoughtError {
    #[error("unknown thought kind '{0}' (expected planning, analysis, synthesis, reflection or derivation)")]
    UnknownKind(String),

    #[error("thought is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("thought field '{field}' has the wrong type: {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}

impl ThoughtRecord {
    pub fn new(kind: ThoughtKind, content: impl Into<ThoughtContent>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            content: content.into(),
            next_steps: Vec::new(),
            context: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_next_steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.next_steps = steps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Build a record from the arguments of a "record thought" tool call.
    ///
    /// Accepts `kind` (or `type`), `content`, and optional `next_steps`
    /// (or `nextSteps`) and `context`.
    pub fn from_arguments(args: &Value) -> Result<Self, ThoughtError> {
        let kind = args
            .get("kind")
            .or_else(|| args.get("type"))
            .ok_or(ThoughtError::MissingField("kind"))?
            .as_str()
            .ok_or(ThoughtError::WrongType {
                field: "kind",
                expected: "string",
            })?
            .parse::<ThoughtKind>()?;

        let content = match args.get("content") {
            Some(Value::String(text)) => ThoughtContent::Text(text.clone()),
            Some(Value::Object(map)) => ThoughtContent::Structured(map.clone()),
            Some(_) => {
                return Err(ThoughtError::WrongType {
                    field: "content",
                    expected: "string or object",
                });
            }
            None => return Err(ThoughtError::MissingField("content")),
        };

        let next_steps = match args.get("next_steps").or_else(|| args.get("nextSteps")) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            Some(Value::String(single)) => vec![single.clone()],
            Some(_) => {
                return Err(ThoughtError::WrongType {
                    field: "next_steps",
                    expected: "list of strings",
                });
            }
        };

        let context = match args.get("context") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                return Err(ThoughtError::WrongType {
                    field: "context",
                    expected: "string",
                });
            }
        };

        let mut record = Self::new(kind, content).with_next_steps(next_steps);
        record.context = context;
        Ok(record)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ThoughtKind {
        self.kind
    }

    pub fn content(&self) -> &ThoughtContent {
        &self.content
    }

    pub fn next_steps(&self) -> &[String] {
        &self.next_steps
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}
