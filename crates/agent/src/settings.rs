//! Loop settings derived from [`AppConfig`].

use serde_json::json;
use std::collections::BTreeSet;

use crate::serializer::RenderLimits;
use quillclaw_config::AppConfig;
use quillclaw_core::tool::ToolDefinition;

/// Names of the tools the loop handles itself instead of the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesignatedTools {
    pub record_thought: String,
    pub ask_user: String,
    pub finish: String,
}

impl Default for DesignatedTools {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for DesignatedTools {
    fn from(config: &AppConfig) -> Self {
        Self {
            record_thought: config.execution.record_thought_tool.clone(),
            ask_user: config.execution.ask_user_tool.clone(),
            finish: config.execution.finish_tool.clone(),
        }
    }
}

impl DesignatedTools {
    pub fn is_designated(&self, name: &str) -> bool {
        name == self.record_thought || name == self.ask_user || name == self.finish
    }

    /// Definitions advertised to the reasoning service alongside registry tools.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: self.record_thought.clone(),
                description: "Record a thought about your own reasoning. It is kept across iterations \
                              and shown back to you; it does not appear in the iteration history."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "kind": {
                            "type": "string",
                            "enum": ["planning", "analysis", "synthesis", "reflection", "derivation"]
                        },
                        "content": {
                            "description": "Free text, or an object of named findings",
                            "oneOf": [{"type": "string"}, {"type": "object"}]
                        },
                        "next_steps": {"type": "array", "items": {"type": "string"}},
                        "context": {"type": "string"}
                    },
                    "required": ["kind", "content"]
                }),
            },
            ToolDefinition {
                name: self.ask_user.clone(),
                description: "Pause and ask the user a question. The run resumes when they reply."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {"question": {"type": "string"}},
                    "required": ["question"]
                }),
            },
            ToolDefinition {
                name: self.finish.clone(),
                description: "Finish the task with a short summary and an optional result.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "summary": {"type": "string"},
                        "result": {}
                    },
                    "required": ["summary"]
                }),
            },
        ]
    }
}

/// Everything the execution loop needs to know about its limits.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub max_iterations: u32,
    pub max_consecutive_plan_failures: u32,
    pub tools: DesignatedTools,
    /// Tools whose results appear in history as counts instead of payloads.
    pub condensed_result_tools: BTreeSet<String>,
    pub render_limits: RenderLimits,
    pub extra_guidance: Vec<String>,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for LoopSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_iterations: config.execution.max_iterations,
            max_consecutive_plan_failures: config.execution.max_consecutive_plan_failures,
            tools: DesignatedTools::from(config),
            condensed_result_tools: config
                .execution
                .condensed_result_tools
                .iter()
                .cloned()
                .collect(),
            render_limits: RenderLimits::from(&config.serializer),
            extra_guidance: config.prompt.extra_guidance.clone(),
        }
    }
}
