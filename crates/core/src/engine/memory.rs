use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemoryAction {
    AddFact,
    RemoveFact,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryChange {
    pub action: MemoryAction,
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

/// Fact store with an append-only change log.
#[derive(Clone, Debug, Default)]
pub struct WorkingMemory {
    facts: BTreeMap<String, Value>,
    history: Vec<MemoryChange>,
}

impl WorkingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_fact(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let old_value = self.facts.insert(key.clone(), value.clone());
        self.history.push(MemoryChange {
            action: MemoryAction::AddFact,
            key,
            old_value,
            new_value: Some(value),
            timestamp: Utc::now(),
        });
    }

    pub fn remove_fact(&mut self, key: &str) -> Option<Value> {
        let old_value = self.facts.remove(key);
        self.history.push(MemoryChange {
            action: MemoryAction::RemoveFact,
            key: key.to_string(),
            old_value: old_value.clone(),
            new_value: None,
            timestamp: Utc::now(),
        });
        old_value
    }

    pub fn get_fact(&self, key: &str) -> Option<&Value> {
        self.facts.get(key)
    }

    pub fn has_fact(&self, key: &str) -> bool {
        self.facts.contains_key(key)
    }

    pub fn facts(&self) -> &BTreeMap<String, Value> {
        &self.facts
    }

    pub fn history(&self) -> &[MemoryChange] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Drops facts and history together.
    pub fn clear(&mut self) {
        self.facts.clear();
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{MemoryAction, WorkingMemory};

    #[test]
    fn every_mutation_is_logged_with_old_and_new_values() {
        let mut memory = WorkingMemory::new();
        memory.add_fact("tier", json!("silver"));
        memory.add_fact("tier", json!("gold"));
        assert_eq!(memory.remove_fact("tier"), Some(json!("gold")));

        let history = memory.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].old_value, Some(json!("silver")));
        assert_eq!(history[1].new_value, Some(json!("gold")));
        assert_eq!(history[2].action, MemoryAction::RemoveFact);
        assert!(!memory.has_fact("tier"));
    }

    #[test]
    fn clear_resets_facts_and_history() {
        let mut memory = WorkingMemory::new();
        memory.add_fact("vip", json!(true));
        memory.clear();

        assert!(memory.is_empty());
        assert!(memory.history().is_empty());
        assert!(memory.get_fact("vip").is_none());
    }
}
