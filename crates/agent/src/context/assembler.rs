//! Prompt assembly: the text handed to the reasoning service each iteration.
//!
//! A prompt is an ordered list of numbered sections:
//!
//! 1. **Agent instructions**
//! 2. **Current task**
//! 3. **Latest user reply** (only after a resume)
//! 4. **Prior thoughts** (only when memory holds records)
//! 5. **Dynamic context** (only when history is non-empty)
//! 6. **Tool-use guidance**
//! 7. **Tool catalogue**
//! 8. **Output format**
//! 9. **Document structure** (only for categories that need it, with a non-empty outline)
//! 10. **Final directive**
//!
//! Optional sections are skipped, not left blank. Numbering, the table of
//! contents, and the body are all derived from the same `Vec<PromptSection>`,
//! so the contents list can never disagree with what follows it.
//!
//! # Determinism
//!
//! Identical inputs always produce identical prompts. Tool definitions are
//! emitted in the order given.

use std::fmt::Write as _;

use crate::context::history::HistoryFormatter;
use crate::context::token;
use crate::history::IterationHistory;
use crate::settings::{DesignatedTools, LoopSettings};
use quillclaw_core::agent::AgentProfile;
use quillclaw_core::tool::ToolDefinition;

// ── Types ─────────────────────────────────────────────────────────────────

/// Kind of a prompt section, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SectionKind {
    Instructions,
    Task,
    UserReply,
    PriorThoughts,
    DynamicContext,
    ToolGuidance,
    ToolCatalogue,
    OutputFormat,
    DocumentStructure,
    FinalDirective,
}

impl SectionKind {
    pub fn title(self) -> &'static str {
        match self {
            Self::Instructions => "Agent Instructions",
            Self::Task => "Current Task",
            Self::UserReply => "Latest User Reply",
            Self::PriorThoughts => "Prior Thoughts",
            Self::DynamicContext => "Dynamic Context",
            Self::ToolGuidance => "Tool-Use Guidance",
            Self::ToolCatalogue => "Available Tools",
            Self::OutputFormat => "Output Format",
            Self::DocumentStructure => "Document Structure",
            Self::FinalDirective => "Final Directive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSection {
    pub kind: SectionKind,
    pub body: String,
}

/// An assembled prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    sections: Vec<PromptSection>,
}

impl PromptContext {
    pub fn sections(&self) -> &[PromptSection] {
        &self.sections
    }

    pub fn contains(&self, kind: SectionKind) -> bool {
        self.sections.iter().any(|s| s.kind == kind)
    }

    pub fn section(&self, kind: SectionKind) -> Option<&PromptSection> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    /// Numbered list of the present sections.
    pub fn table_of_contents(&self) -> String {
        let mut out = String::from("Contents:\n");
        for (i, section) in self.sections.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, section.kind.title());
        }
        out
    }

    /// Contents list followed by every section body under its numbered heading.
    pub fn render(&self) -> String {
        let mut out = self.table_of_contents();
        for (i, section) in self.sections.iter().enumerate() {
            let _ = write!(out, "\n## {}. {}\n\n{}", i + 1, section.kind.title(), section.body);
            if !section.body.ends_with('\n') {
                out.push('\n');
            }
        }
        out
    }

    pub fn estimated_tokens(&self) -> usize {
        token::estimate_tokens(&self.render())
    }
}

/// Everything that varies between iterations.
pub struct PromptInput<'a> {
    pub profile: &'a AgentProfile,
    pub task: &'a str,
    pub iteration: u32,
    pub latest_user_reply: Option<&'a str>,
    /// Memory store output; empty when there is nothing recorded.
    pub prior_thoughts: &'a str,
    pub history: &'a IterationHistory,
    /// Registry tools, excluding the designated ones.
    pub tools: &'a [ToolDefinition],
    /// Outline text; only used when the agent category needs it.
    pub document_outline: Option<&'a str>,
}

// ── Assembler ─────────────────────────────────────────────────────────────

const OUTPUT_FORMAT: &str = r#"Respond with a single JSON object and nothing else:

{
  "thought_summary": "<one short line describing what you are doing now>",
  "tool_calls": [
    { "tool": "<tool name>", "arguments": { } }
  ]
}

Calls run in the order listed. Do not wrap the object in prose or code fences."#;

/// Builds [`PromptContext`]s. Stateless apart from settings; reuse it.
pub struct PromptAssembler {
    tools: DesignatedTools,
    history: HistoryFormatter,
    extra_guidance: Vec<String>,
}

impl PromptAssembler {
    pub fn new(settings: &LoopSettings) -> Self {
        Self {
            tools: settings.tools.clone(),
            history: HistoryFormatter::new(
                settings.render_limits,
                settings.condensed_result_tools.clone(),
            ),
            extra_guidance: settings.extra_guidance.clone(),
        }
    }

    pub fn assemble(&self, input: &PromptInput<'_>) -> PromptContext {
        let mut sections = Vec::with_capacity(10);
        let mut push =
            |kind: SectionKind, body: String| sections.push(PromptSection { kind, body });

        push(SectionKind::Instructions, self.instructions(input.profile));
        push(SectionKind::Task, input.task.trim().to_string());

        if let Some(reply) = input.latest_user_reply {
            push(SectionKind::UserReply, reply.to_string());
        }
        if !input.prior_thoughts.trim().is_empty() {
            push(SectionKind::PriorThoughts, input.prior_thoughts.to_string());
        }
        let history = self.history.format(input.history);
        if !history.is_empty() {
            push(SectionKind::DynamicContext, history);
        }

        push(SectionKind::ToolGuidance, self.guidance());
        push(SectionKind::ToolCatalogue, self.catalogue(input.tools));
        push(SectionKind::OutputFormat, OUTPUT_FORMAT.to_string());

        if input.profile.category.needs_document_outline() {
            if let Some(outline) = input.document_outline.filter(|o| !o.trim().is_empty()) {
                push(SectionKind::DocumentStructure, outline.to_string());
            }
        }

        push(
            SectionKind::FinalDirective,
            format!(
                "This is iteration {}. Decide the next tool calls and answer with the JSON object only.",
                input.iteration
            ),
        );

        PromptContext { sections }
    }

    fn instructions(&self, profile: &AgentProfile) -> String {
        format!(
            "You are {} ({} agent).\n\n{}",
            profile.name,
            profile.category.as_str(),
            profile.instructions.trim()
        )
    }

    fn guidance(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "- Work in small steps; each response is one iteration of tool calls."
        );
        let _ = writeln!(
            out,
            "- Use `{}` to note analysis, plans and conclusions you want to keep. Those notes are shown back to you under Prior Thoughts.",
            self.tools.record_thought
        );
        let _ = writeln!(
            out,
            "- Use `{}` only when you cannot continue without the user. Calls after it in the same response are not run.",
            self.tools.ask_user
        );
        let _ = writeln!(
            out,
            "- Use `{}` once the task is done. Calls after it in the same response are not run.",
            self.tools.finish
        );
        let _ = writeln!(
            out,
            "- Failed tool calls are reported in the dynamic context; adjust instead of repeating them."
        );
        for line in &self.extra_guidance {
            let _ = writeln!(out, "- {}", line.trim());
        }
        out
    }

    fn catalogue(&self, registry_tools: &[ToolDefinition]) -> String {
        let designated = self.tools.definitions();
        let mut out = String::new();
        for tool in registry_tools
            .iter()
            .filter(|t| !self.tools.is_designated(&t.name))
            .chain(designated.iter())
        {
            let _ = writeln!(out, "### {}\n{}", tool.name, tool.description.trim());
            let _ = writeln!(out, "Parameters: {}\n", tool.parameters);
        }
        out
    }
}
