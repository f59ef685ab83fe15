//! Agent memory store: per-agent, size-capped thought records.
//!
//! Each agent id owns a newest-first list of at most `capacity` records.
//! The store is shared across runs behind an `Arc`; it performs no per-key
//! coordination, so callers must keep at most one in-flight run per agent id.
//!
//! Lifecycle rules the execution loop depends on:
//!
//! - `clear` runs once at the start of a **fresh** run.
//! - A resumed run never clears: the records written before suspension are
//!   exactly what the agent sees after the user replies.

use std::collections::{BTreeMap, HashMap, VecDeque};
use tokio::sync::RwLock;
use tracing::debug;

use crate::memory::format::{MemorySettings, format_thoughts};
use crate::memory::thought::ThoughtRecord;

pub struct AgentMemoryStore {
    records: RwLock<HashMap<String, VecDeque<ThoughtRecord>>>,
    settings: MemorySettings,
}

impl AgentMemoryStore {
    pub fn new(settings: MemorySettings) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            settings,
        }
    }

    pub fn settings(&self) -> &MemorySettings {
        &self.settings
    }

    /// Prepend `thought` for `agent_id`, evicting the oldest record when
    /// full. Returns the number of records held afterwards.
    pub async fn record(&self, agent_id: &str, thought: ThoughtRecord) -> usize {
        let mut records = self.records.write().await;
        let list = records.entry(agent_id.to_string()).or_default();
        list.push_front(thought);
        list.truncate(self.settings.capacity);
        debug!(agent_id, stored = list.len(), "Recorded thought");
        list.len()
    }

    /// Drop every record for `agent_id`. Returns how many were removed.
    pub async fn clear(&self, agent_id: &str) -> usize {
        let removed = self
            .records
            .write()
            .await
            .remove(agent_id)
            .map_or(0, |list| list.len());
        debug!(agent_id, removed, "Cleared agent memory");
        removed
    }

    pub async fn count(&self, agent_id: &str) -> usize {
        self.records
            .read()
            .await
            .get(agent_id)
            .map_or(0, VecDeque::len)
    }

    /// Record counts for every agent that has any, sorted by agent id.
    pub async fn all_counts(&self) -> BTreeMap<String, usize> {
        self.records
            .read()
            .await
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(id, list)| (id.clone(), list.len()))
            .collect()
    }

    /// Copy of the records for `agent_id`, newest first.
    pub async fn snapshot(&self, agent_id: &str) -> Vec<ThoughtRecord> {
        self.records
            .read()
            .await
            .get(agent_id)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Prompt guidance text for `agent_id`; empty when nothing is recorded.
    pub async fn formatted(&self, agent_id: &str) -> String {
        let snapshot = self.snapshot(agent_id).await;
        format_thoughts(&snapshot, &self.settings)
    }
}

impl Default for AgentMemoryStore {
    fn default() -> Self {
        Self::new(MemorySettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::thought::ThoughtKind;

    /// Whether `text` mentions `label` as a whole token ("Step 1" but not "Step 15").
    fn mentions(text: &str, label: &str) -> bool {
        text.match_indices(label).any(|(at, _)| {
            !text[at + label.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit())
        })
    }

    #[tokio::test]
    async fn fifteen_steps_keep_the_last_ten() {
        let store = AgentMemoryStore::default();
        for step in 1..=15 {
            store
                .record("writer", ThoughtRecord::new(ThoughtKind::Planning, format!("Step {step}")))
                .await;
        }

        assert_eq!(store.count("writer").await, 10);
        let text = store.formatted("writer").await;
        assert!(mentions(&text, "Step 15"));
        assert!(mentions(&text, "Step 6"));
        assert!(!mentions(&text, "Step 5"));
        assert!(!mentions(&text, "Step 1"));
    }

    #[tokio::test]
    async fn count_never_exceeds_capacity() {
        let store = AgentMemoryStore::default();
        for i in 0..40 {
            let after = store
                .record("a", ThoughtRecord::new(ThoughtKind::Analysis, format!("t{i}")))
                .await;
            assert!(after <= 10);
            assert!(store.count("a").await <= 10);
        }
    }

    #[tokio::test]
    async fn formatted_lists_newest_first() {
        let store = AgentMemoryStore::default();
        for step in 1..=12 {
            store
                .record("a", ThoughtRecord::new(ThoughtKind::Planning, format!("Step {step}")))
                .await;
        }
        let text = store.formatted("a").await;

        let positions: Vec<usize> = (3..=12)
            .rev()
            .map(|step| {
                text.find(&format!("Content: Step {step}\n"))
                    .unwrap_or_else(|| panic!("Step {step} missing"))
            })
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn clear_empties_only_that_agent() {
        let store = AgentMemoryStore::default();
        store.record("a", ThoughtRecord::new(ThoughtKind::Planning, "x")).await;
        store.record("a", ThoughtRecord::new(ThoughtKind::Planning, "y")).await;
        store.record("b", ThoughtRecord::new(ThoughtKind::Planning, "z")).await;

        assert_eq!(store.clear("a").await, 2);
        assert_eq!(store.count("a").await, 0);
        assert_eq!(store.formatted("a").await, "");
        assert_eq!(store.count("b").await, 1);
    }

    #[tokio::test]
    async fn clear_unknown_agent_is_noop() {
        let store = AgentMemoryStore::default();
        assert_eq!(store.clear("ghost").await, 0);
        assert_eq!(store.formatted("ghost").await, "");
    }

    #[tokio::test]
    async fn all_counts_reports_each_agent() {
        let store = AgentMemoryStore::default();
        store.record("b", ThoughtRecord::new(ThoughtKind::Planning, "1")).await;
        store.record("a", ThoughtRecord::new(ThoughtKind::Planning, "1")).await;
        store.record("a", ThoughtRecord::new(ThoughtKind::Planning, "2")).await;

        let counts = store.all_counts().await;
        assert_eq!(counts.into_iter().collect::<Vec<_>>(), vec![
            ("a".to_string(), 2),
            ("b".to_string(), 1),
        ]);
    }

    #[tokio::test]
    async fn snapshot_is_newest_first() {
        let store = AgentMemoryStore::default();
        let first = ThoughtRecord::new(ThoughtKind::Planning, "first");
        let second = ThoughtRecord::new(ThoughtKind::Planning, "second");
        store.record("a", first.clone()).await;
        store.record("a", second.clone()).await;
        assert_eq!(store.snapshot("a").await, vec![second, first]);
    }

    #[tokio::test]
    async fn custom_capacity() {
        let store = AgentMemoryStore::new(MemorySettings {
            capacity: 2,
            full_detail: 1,
            ..MemorySettings::default()
        });
        for i in 0..5 {
            store.record("a", ThoughtRecord::new(ThoughtKind::Planning, format!("{i}"))).await;
        }
        assert_eq!(store.count("a").await, 2);
    }
}
