//! Agent profile types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What kind of work an agent does.
///
/// Only categories that edit or review a concrete document get its outline
/// injected into their prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentCategory {
    /// Writes and restructures document content (default)
    #[default]
    Editor,
    /// Critiques an existing document
    Reviewer,
    /// Gathers material, does not touch the document
    Researcher,
    /// Breaks a goal into tasks for other agents
    Planner,
}

impl AgentCategory {
    /// Whether prompts for this category include the document outline.
    pub fn needs_document_outline(self) -> bool {
        matches!(self, Self::Editor | Self::Reviewer)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Editor => "editor",
            Self::Reviewer => "reviewer",
            Self::Researcher => "researcher",
            Self::Planner => "planner",
        }
    }
}

/// Static description of one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Stable identifier; keys the thought memory store
    pub id: String,

    /// Display name
    pub name: String,

    /// Agent category
    #[serde(default)]
    pub category: AgentCategory,

    /// Role instructions placed at the top of every prompt
    pub instructions: String,

    /// Document the agent works on, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<PathBuf>,
}

impl AgentProfile {
    pub fn new(
        id: impl Into<String>,
        category: AgentCategory,
        instructions: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            category,
            instructions: instructions.into(),
            document: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_document(mut self, document: impl Into<PathBuf>) -> Self {
        self.document = Some(document.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_defaults_to_editor() {
        assert_eq!(AgentCategory::default(), AgentCategory::Editor);
    }

    #[test]
    fn only_document_categories_need_outline() {
        assert!(AgentCategory::Editor.needs_document_outline());
        assert!(AgentCategory::Reviewer.needs_document_outline());
        assert!(!AgentCategory::Researcher.needs_document_outline());
        assert!(!AgentCategory::Planner.needs_document_outline());
    }

    #[test]
    fn profile_builder() {
        let profile = AgentProfile::new("writer-1", AgentCategory::Editor, "Write clearly.")
            .with_name("Writer")
            .with_document("chapters/01.md");
        assert_eq!(profile.id, "writer-1");
        assert_eq!(profile.name, "Writer");
        assert_eq!(profile.document.as_deref(), Some(std::path::Path::new("chapters/01.md")));
    }

    #[test]
    fn category_serializes_snake_case() {
        let json = serde_json::to_string(&AgentCategory::Researcher).unwrap();
        assert_eq!(json, "\"researcher\"");
    }
}
