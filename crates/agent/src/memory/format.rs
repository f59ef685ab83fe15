//! Rendering of thought records into prompt guidance.
//!
//! The newest records are shown in full; older ones are abridged so the
//! prior-thoughts block stays bounded no matter how verbose the agent was.

use serde_json::Value;
use std::fmt::Write as _;

use crate::memory::thought::{ThoughtContent, ThoughtRecord};
use crate::serializer::{self, RenderLimits};
use quillclaw_config::AppConfig;

pub const PRIOR_THOUGHTS_HEADER: &str =
    "These are the thoughts you recorded in earlier iterations, newest first.";

pub const CONTINUATION_GUIDANCE: &str = "\
Continue from the reasoning above instead of repeating it:
- Treat your most recent next steps as the current plan unless new results contradict them.
- Do not re-record a thought that says the same thing; record one only when your understanding has moved forward.
- If an earlier thought turned out to be wrong, record a reflection that says so before changing course.";

/// Limits on how thought records are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySettings {
    /// Records kept per agent.
    pub capacity: usize,
    /// Newest records rendered unabridged.
    pub full_detail: usize,
    /// Keys enumerated for abridged composite content.
    pub summary_keys: usize,
    /// Characters kept for abridged free text.
    pub summary_text_chars: usize,
    /// Elements kept for abridged lists.
    pub summary_list_items: usize,
    /// Serializer bounds for structured content shown in full.
    pub render_limits: RenderLimits,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for MemorySettings {
    fn from(config: &AppConfig) -> Self {
        let memory = &config.memory;
        Self {
            capacity: memory.capacity,
            full_detail: memory.full_detail,
            summary_keys: memory.summary_keys,
            summary_text_chars: memory.summary_text_chars,
            summary_list_items: memory.summary_list_items,
            render_limits: RenderLimits::from(&config.serializer),
        }
    }
}

/// Render `records` (newest first). Empty input renders as an empty string.
pub fn format_thoughts(records: &[ThoughtRecord], settings: &MemorySettings) -> String {
    if records.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    out.push_str(PRIOR_THOUGHTS_HEADER);
    out.push_str("\n\n");

    for (i, record) in records.iter().enumerate() {
        if i < settings.full_detail {
            write_full(&mut out, i + 1, record, &settings.render_limits);
        } else {
            write_abridged(&mut out, i + 1, record, settings);
        }
        out.push('\n');
    }

    out.push_str(CONTINUATION_GUIDANCE);
    out.push('\n');
    out
}

fn write_heading(out: &mut String, position: usize, record: &ThoughtRecord, abridged: bool) {
    let _ = writeln!(
        out,
        "### Thought {} [{}] {}{}",
        position,
        record.kind(),
        record.recorded_at().format("%Y-%m-%d %H:%M:%S UTC"),
        if abridged { " (abridged)" } else { "" }
    );
}

fn write_full(out: &mut String, position: usize, record: &ThoughtRecord, limits: &RenderLimits) {
    write_heading(out, position, record, false);
    match record.content() {
        ThoughtContent::Text(text) => {
            let _ = writeln!(out, "Content: {text}");
        }
        ThoughtContent::Structured(map) => {
            out.push_str("Content:\n");
            let value = Value::Object(map.clone());
            out.push_str(&serializer::render_json(&value, limits));
        }
    }
    if !record.next_steps().is_empty() {
        out.push_str("Next steps:\n");
        for (i, step) in record.next_steps().iter().enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, step);
        }
    }
    if let Some(context) = record.context() {
        let _ = writeln!(out, "Context: {context}");
    }
}

fn write_abridged(
    out: &mut String,
    position: usize,
    record: &ThoughtRecord,
    settings: &MemorySettings,
) {
    write_heading(out, position, record, true);
    match record.content() {
        ThoughtContent::Text(text) => {
            let _ = writeln!(out, "Content: {}", truncate(text, settings.summary_text_chars));
        }
        ThoughtContent::Structured(map) => {
            out.push_str("Content:\n");
            for (key, value) in map.iter().take(settings.summary_keys) {
                let _ = writeln!(out, "- {key}: {}", abridge_value(value, settings));
            }
            if map.len() > settings.summary_keys {
                let _ = writeln!(out, "- … {} more items", map.len() - settings.summary_keys);
            }
        }
    }
    if !record.next_steps().is_empty() {
        let steps: Vec<String> = record
            .next_steps()
            .iter()
            .map(|s| truncate(s, settings.summary_text_chars))
            .collect();
        let _ = writeln!(out, "Next steps: {}", abridge_list(steps, settings));
    }
    if let Some(context) = record.context() {
        let _ = writeln!(out, "Context: {}", truncate(context, settings.summary_text_chars));
    }
}

fn abridge_value(value: &Value, settings: &MemorySettings) -> String {
    match value {
        Value::String(s) => truncate(s, settings.summary_text_chars),
        Value::Array(items) => {
            let shown: Vec<String> = items.iter().map(|v| abridge_value(v, settings)).collect();
            format!("[{}]", abridge_list(shown, settings))
        }
        Value::Object(_) => truncate(&value.to_string(), settings.summary_text_chars),
        other => other.to_string(),
    }
}

fn abridge_list(mut items: Vec<String>, settings: &MemorySettings) -> String {
    let total = items.len();
    if total > settings.summary_list_items {
        items.truncate(settings.summary_list_items);
        items.push(format!("… {} more items", total - settings.summary_list_items));
    }
    items.join("; ")
}

/// Truncate to `max` characters, marking the cut with an ellipsis.
pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::thought::ThoughtKind;
    use serde_json::json;

    fn structured(value: Value) -> ThoughtContent {
        match value {
            Value::Object(map) => ThoughtContent::Structured(map),
            _ => unreachable!("test helper takes objects"),
        }
    }

    #[test]
    fn empty_records_render_nothing() {
        assert_eq!(format_thoughts(&[], &MemorySettings::default()), "");
    }

    #[test]
    fn recent_records_are_unabridged() {
        let long = "x".repeat(250);
        let records = vec![ThoughtRecord::new(ThoughtKind::Analysis, long.clone())
            .with_next_steps(["a", "b", "c", "d", "e", "f", "g"])];
        let text = format_thoughts(&records, &MemorySettings::default());
        assert!(text.contains(&long));
        assert!(text.contains("7. g"));
        assert!(!text.contains("(abridged)"));
        assert!(text.ends_with(&format!("{CONTINUATION_GUIDANCE}\n")));
    }

    #[test]
    fn older_text_is_truncated() {
        let long = "y".repeat(250);
        let mut records: Vec<ThoughtRecord> = (0..3)
            .map(|i| ThoughtRecord::new(ThoughtKind::Planning, format!("recent {i}")))
            .collect();
        records.push(
            ThoughtRecord::new(ThoughtKind::Planning, long.clone()).with_context("z".repeat(150)),
        );

        let text = format_thoughts(&records, &MemorySettings::default());
        assert!(!text.contains(&long));
        assert!(text.contains(&format!("{}…", "y".repeat(100))));
        assert!(text.contains(&format!("Context: {}…", "z".repeat(100))));
        assert!(text.contains("### Thought 4 [planning]"));
        assert!(text.contains("(abridged)"));
    }

    #[test]
    fn older_structured_content_lists_three_keys() {
        let mut records: Vec<ThoughtRecord> = (0..3)
            .map(|i| ThoughtRecord::new(ThoughtKind::Analysis, format!("recent {i}")))
            .collect();
        records.push(ThoughtRecord::new(
            ThoughtKind::Synthesis,
            structured(json!({
                "alpha": 1, "beta": 2, "gamma": 3, "delta": 4, "epsilon": 5
            })),
        ));

        let text = format_thoughts(&records, &MemorySettings::default());
        assert!(text.contains("- alpha: 1"));
        assert!(text.contains("- gamma: 3"));
        assert!(!text.contains("delta"));
        assert!(text.contains("- … 2 more items"));
    }

    #[test]
    fn older_lists_are_summarized() {
        let mut records: Vec<ThoughtRecord> = (0..3)
            .map(|i| ThoughtRecord::new(ThoughtKind::Analysis, format!("recent {i}")))
            .collect();
        records.push(
            ThoughtRecord::new(
                ThoughtKind::Derivation,
                structured(json!({"sections": [1, 2, 3, 4, 5, 6, 7, 8]})),
            )
            .with_next_steps(["s1", "s2", "s3", "s4", "s5", "s6"]),
        );

        let text = format_thoughts(&records, &MemorySettings::default());
        assert!(text.contains("- sections: [1; 2; 3; 4; 5; … 3 more items]"));
        assert!(text.contains("Next steps: s1; s2; s3; s4; s5; … 1 more items"));
    }

    #[test]
    fn structured_recent_content_uses_bullets() {
        let records = vec![ThoughtRecord::new(
            ThoughtKind::Planning,
            structured(json!({"goal": "tighten intro", "steps": ["cut", "merge"]})),
        )];
        let text = format_thoughts(&records, &MemorySettings::default());
        assert!(text.contains("- goal: tighten intro"));
        assert!(text.contains("  - step #1: cut"));
    }

    #[test]
    fn full_detail_follows_serializer_config() {
        let mut config = AppConfig::default();
        config.serializer.max_array_items = 2;
        config.serializer.max_depth = 2;
        let settings = MemorySettings::from(&config);
        assert_eq!(settings.render_limits.max_array_items, 2);

        let records = vec![ThoughtRecord::new(
            ThoughtKind::Analysis,
            structured(json!({
                "steps": ["cut", "merge", "reorder", "trim"],
                "outer": {"inner": {"deep": 1}}
            })),
        )];
        let text = format_thoughts(&records, &settings);
        assert!(text.contains("  - step #2: merge"));
        assert!(!text.contains("reorder"));
        assert!(text.contains("… 2 more items"));
        assert!(text.contains(serializer::MAX_DEPTH_MARKER));
        assert!(!text.contains("deep"));
    }

    #[test]
    fn truncate_counts_characters() {
        assert_eq!(truncate("héllo", 10), "héllo");
        assert_eq!(truncate("héllo", 2), "hé…");
    }
}
