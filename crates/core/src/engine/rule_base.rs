use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::rule::{Rule, RuleId};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleBaseStatistics {
    pub total_rules: usize,
    pub active_rules: usize,
    pub rule_types: Vec<String>,
    pub rules_by_type: BTreeMap<String, usize>,
}

/// Rule storage with a type index and a priority view.
///
/// Both indexes are rebuilt after every mutation. The priority view holds
/// active rules only, ordered by descending priority; equal priorities keep
/// insertion order.
#[derive(Clone, Debug, Default)]
pub struct RuleBase {
    rules: Vec<Rule>,
    by_type: BTreeMap<String, Vec<usize>>,
    by_priority: Vec<usize>,
}

impl RuleBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule. A rule with an existing id replaces the old one in place.
    pub fn add_rule(&mut self, rule: Rule) {
        match self.rules.iter_mut().find(|existing| existing.id == rule.id) {
            Some(existing) => *existing = rule,
            None => self.rules.push(rule),
        }
        self.reindex();
    }

    pub fn remove_rule(&mut self, rule_id: &RuleId) -> Option<Rule> {
        let position = self.rules.iter().position(|rule| &rule.id == rule_id)?;
        let removed = self.rules.remove(position);
        self.reindex();
        Some(removed)
    }

    /// Soft delete: the rule stays stored but leaves the priority view.
    pub fn deactivate_rule(&mut self, rule_id: &RuleId) -> bool {
        let Some(rule) = self.rules.iter_mut().find(|rule| &rule.id == rule_id) else {
            return false;
        };
        rule.active = false;
        self.reindex();
        true
    }

    pub fn record_usage(&mut self, rule_ids: &[RuleId]) {
        for rule in self.rules.iter_mut().filter(|rule| rule_ids.contains(&rule.id)) {
            rule.usage_count = rule.usage_count.saturating_add(1);
        }
    }

    pub fn get_rule(&self, rule_id: &RuleId) -> Option<&Rule> {
        self.rules.iter().find(|rule| &rule.id == rule_id)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rules_by_type(&self, rule_type: &str) -> Vec<&Rule> {
        self.by_type
            .get(rule_type)
            .map(|indexes| indexes.iter().map(|index| &self.rules[*index]).collect())
            .unwrap_or_default()
    }

    pub fn rules_by_priority(&self) -> Vec<&Rule> {
        self.by_priority.iter().map(|index| &self.rules[*index]).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn clear(&mut self) {
        self.rules.clear();
        self.reindex();
    }

    pub fn statistics(&self) -> RuleBaseStatistics {
        RuleBaseStatistics {
            total_rules: self.rules.len(),
            active_rules: self.by_priority.len(),
            rule_types: self.by_type.keys().cloned().collect(),
            rules_by_type: self
                .by_type
                .iter()
                .map(|(rule_type, indexes)| (rule_type.clone(), indexes.len()))
                .collect(),
        }
    }

    fn reindex(&mut self) {
        self.by_type.clear();
        for (index, rule) in self.rules.iter().enumerate() {
            self.by_type.entry(rule.rule_type.clone()).or_default().push(index);
        }

        let mut active: Vec<usize> = (0..self.rules.len()).filter(|i| self.rules[*i].active).collect();
        // `sort_by` is stable, so ties keep insertion order.
        active.sort_by(|left, right| self.rules[*right].priority.cmp(&self.rules[*left].priority));
        self.by_priority = active;
    }
}

#[cfg(test)]
mod tests {
    use super::RuleBase;
    use crate::engine::rule::{Rule, RuleId};

    fn ids(rules: Vec<&Rule>) -> Vec<&str> {
        rules.into_iter().map(|rule| rule.id.0.as_str()).collect()
    }

    #[test]
    fn priority_view_is_descending_and_stable() {
        let mut base = RuleBase::new();
        base.add_rule(Rule::new("a", "A").with_priority(5));
        base.add_rule(Rule::new("b", "B").with_priority(10));
        base.add_rule(Rule::new("c", "C").with_priority(5));
        base.add_rule(Rule::new("d", "D").with_priority(10));
        base.add_rule(Rule::new("e", "E").with_priority(1).inactive());

        assert_eq!(ids(base.rules_by_priority()), vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn add_then_get_and_remove_then_get() {
        let mut base = RuleBase::new();
        let rule = Rule::new("r-1", "Student").with_type("DISCOUNT").with_priority(3);
        base.add_rule(rule.clone());

        assert_eq!(base.get_rule(&RuleId::new("r-1")), Some(&rule));
        assert_eq!(base.remove_rule(&RuleId::new("r-1")), Some(rule));
        assert!(base.get_rule(&RuleId::new("r-1")).is_none());
        assert!(base.rules_by_type("DISCOUNT").is_empty());
        assert!(base.remove_rule(&RuleId::new("r-1")).is_none());
    }

    #[test]
    fn re_adding_an_id_replaces_without_duplicating() {
        let mut base = RuleBase::new();
        base.add_rule(Rule::new("r-1", "Old").with_type("DISCOUNT"));
        base.add_rule(Rule::new("r-1", "New").with_type("RECOMMENDATION"));

        assert_eq!(base.len(), 1);
        assert_eq!(base.get_rule(&RuleId::new("r-1")).map(|rule| rule.name.as_str()), Some("New"));
        assert!(base.rules_by_type("DISCOUNT").is_empty());
        assert_eq!(base.rules_by_type("RECOMMENDATION").len(), 1);
    }

    #[test]
    fn deactivation_keeps_rule_but_drops_it_from_priority_view() {
        let mut base = RuleBase::new();
        base.add_rule(Rule::new("r-1", "One").with_type("DISCOUNT"));
        base.add_rule(Rule::new("r-2", "Two").with_type("GENERAL"));

        assert!(base.deactivate_rule(&RuleId::new("r-1")));
        assert!(!base.deactivate_rule(&RuleId::new("missing")));

        let stats = base.statistics();
        assert_eq!(stats.total_rules, 2);
        assert_eq!(stats.active_rules, 1);
        assert_eq!(stats.rule_types, vec!["DISCOUNT".to_string(), "GENERAL".to_string()]);
        assert_eq!(stats.rules_by_type.get("DISCOUNT"), Some(&1));
        assert_eq!(ids(base.rules_by_priority()), vec!["r-2"]);
    }

    #[test]
    fn usage_is_recorded_per_rule() {
        let mut base = RuleBase::new();
        base.add_rule(Rule::new("r-1", "One"));
        base.record_usage(&[RuleId::new("r-1"), RuleId::new("missing")]);

        assert_eq!(base.get_rule(&RuleId::new("r-1")).map(|rule| rule.usage_count), Some(1));
    }
}
