use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::engine::memory::WorkingMemory;
use crate::engine::rule::{Rule, RuleId};
use crate::engine::rule_base::RuleBase;
use crate::rules::{ContextSnapshot, RuleExpression, ShoppingContext, SnapshotChange};

pub const DEFAULT_MAX_ITERATIONS: usize = 100;
pub const DEFAULT_MAX_DEPTH: usize = 10;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    #[default]
    Priority,
    Specificity,
    Recency,
}

impl ConflictStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Priority => "priority",
            Self::Specificity => "specificity",
            Self::Recency => "recency",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    pub before: ContextSnapshot,
    pub after: ContextSnapshot,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ForwardChainResult {
    pub fired_rules: Vec<RuleId>,
    pub failed_rules: Vec<RuleId>,
    pub iterations: usize,
    /// Set only when applicable rules were still waiting at the cap.
    pub cap_reached: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackwardChainResult {
    pub success: bool,
    pub goal: String,
    pub chain: Vec<RuleId>,
    pub reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    pub changes: Vec<SnapshotChange>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineStatistics {
    pub rules_fired: usize,
    pub successful_executions: usize,
    pub failed_executions: usize,
    pub working_memory_size: usize,
    pub conflict_resolution: ConflictStrategy,
}

/// Forward and backward chaining over a borrowed rule base.
///
/// An engine is scoped to one evaluation: it owns its working memory and
/// trace, and only reads the rule base. Usage counts are written back by the
/// caller through [`RuleBase::record_usage`].
#[derive(Debug)]
pub struct InferenceEngine<'a> {
    rule_base: &'a RuleBase,
    memory: WorkingMemory,
    conflict_resolution: ConflictStrategy,
    max_iterations: usize,
    max_depth: usize,
    trace: Vec<TraceEntry>,
}

impl<'a> InferenceEngine<'a> {
    pub fn new(rule_base: &'a RuleBase) -> Self {
        Self {
            rule_base,
            memory: WorkingMemory::new(),
            conflict_resolution: ConflictStrategy::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_depth: DEFAULT_MAX_DEPTH,
            trace: Vec::new(),
        }
    }

    pub fn from_config(rule_base: &'a RuleBase, config: &EngineConfig) -> Self {
        Self::new(rule_base)
            .with_conflict_resolution(config.conflict_resolution)
            .with_limits(config.max_iterations, config.max_depth)
    }

    pub fn with_conflict_resolution(mut self, strategy: ConflictStrategy) -> Self {
        self.conflict_resolution = strategy;
        self
    }

    pub fn with_limits(mut self, max_iterations: usize, max_depth: usize) -> Self {
        self.max_iterations = max_iterations;
        self.max_depth = max_depth;
        self
    }

    pub fn memory(&self) -> &WorkingMemory {
        &self.memory
    }

    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    /// Available rules whose condition holds, in priority order.
    ///
    /// A condition that fails to evaluate is logged and skipped; it never
    /// aborts the scan.
    pub fn find_applicable_rules(&self, context: &ShoppingContext<'_>) -> Vec<&'a Rule> {
        let rule_base: &'a RuleBase = self.rule_base;
        rule_base
            .rules_by_priority()
            .into_iter()
            .filter(|rule| rule.is_available_at(context.timestamp))
            .filter(|rule| condition_holds(rule, context))
            .collect()
    }

    pub fn resolve_conflict(&self, candidates: &[&'a Rule]) -> Option<&'a Rule> {
        let (first, rest) = candidates.split_first()?;
        let chosen = match self.conflict_resolution {
            ConflictStrategy::Priority => *first,
            ConflictStrategy::Specificity => rest.iter().copied().fold(*first, |best, rule| {
                if rule.complexity() > best.complexity() {
                    rule
                } else {
                    best
                }
            }),
            ConflictStrategy::Recency => rest.iter().copied().fold(*first, |best, rule| {
                if rule.created_at > best.created_at {
                    rule
                } else {
                    best
                }
            }),
        };
        Some(chosen)
    }

    /// Executes the rule action and records a trace entry. Returns whether the
    /// action succeeded.
    pub fn fire_rule(&mut self, rule: &Rule, context: &mut ShoppingContext<'_>) -> bool {
        let before = context.snapshot();
        let outcome = match &rule.action {
            Some(action) => action.execute(&rule.id, context),
            None => Ok(()),
        };
        let after = context.snapshot();
        let timestamp = Utc::now();

        let error = match outcome {
            Ok(()) => {
                debug!(
                    event_name = "rules.fired",
                    rule_id = %rule.id,
                    action = rule.action.as_ref().map_or("NONE", |action| action.kind()),
                    "rule fired"
                );
                self.memory.add_fact(
                    format!("rule_fired_{}", rule.id),
                    json!({ "rule": rule.name, "timestamp": timestamp.to_rfc3339() }),
                );
                None
            }
            Err(error) => {
                warn!(
                    event_name = "rules.action_failed",
                    rule_id = %rule.id,
                    error = %error,
                    "rule action failed"
                );
                Some(error.to_string())
            }
        };

        let success = error.is_none();
        self.trace.push(TraceEntry {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            timestamp,
            success,
            error,
            before,
            after,
        });
        success
    }

    /// Fires applicable rules until none remain unattempted or the iteration
    /// cap is reached. Each rule is attempted at most once per pass.
    pub fn forward_chain(&mut self, context: &mut ShoppingContext<'_>) -> ForwardChainResult {
        let mut result = ForwardChainResult::default();

        loop {
            let candidates: Vec<&'a Rule> = self
                .find_applicable_rules(context)
                .into_iter()
                .filter(|rule| {
                    !result.fired_rules.contains(&rule.id) && !result.failed_rules.contains(&rule.id)
                })
                .collect();
            let Some(rule) = self.resolve_conflict(&candidates) else {
                break;
            };
            if result.iterations >= self.max_iterations {
                result.cap_reached = true;
                warn!(
                    event_name = "rules.iteration_cap_reached",
                    max_iterations = self.max_iterations,
                    pending = candidates.len(),
                    "forward chaining stopped at the iteration cap"
                );
                break;
            }

            result.iterations += 1;
            if self.fire_rule(rule, context) {
                result.fired_rules.push(rule.id.clone());
            } else {
                result.failed_rules.push(rule.id.clone());
            }
        }

        result
    }

    /// Tries to make `goal` hold by firing rules that write the variables it
    /// reads, proving their conditions recursively up to the depth limit.
    pub fn backward_chain(
        &mut self,
        goal: &RuleExpression,
        context: &mut ShoppingContext<'_>,
    ) -> BackwardChainResult {
        let mut chain = Vec::new();
        let mut in_progress = Vec::new();
        let outcome = self.prove(goal, context, 0, &mut in_progress, &mut chain);

        BackwardChainResult {
            success: outcome.is_ok(),
            goal: goal.to_string(),
            chain,
            reason: outcome.err(),
        }
    }

    fn prove(
        &mut self,
        goal: &RuleExpression,
        context: &mut ShoppingContext<'_>,
        depth: usize,
        in_progress: &mut Vec<RuleId>,
        chain: &mut Vec<RuleId>,
    ) -> Result<(), String> {
        if depth >= self.max_depth {
            return Err("Max depth reached".to_string());
        }
        if goal.interpret(context) {
            return Ok(());
        }

        for rule in self.rules_for_goal(goal, context.timestamp) {
            if in_progress.contains(&rule.id) {
                continue;
            }

            if !condition_holds(rule, context) {
                let Some(condition) = rule.condition.as_ref() else {
                    continue;
                };
                let Ok(expression) = condition.resolve() else {
                    continue;
                };

                in_progress.push(rule.id.clone());
                let satisfied = expression
                    .subgoals()
                    .into_iter()
                    .all(|subgoal| self.prove(subgoal, &mut *context, depth + 1, in_progress, chain).is_ok());
                in_progress.pop();
                if !satisfied {
                    continue;
                }
            }

            if self.fire_rule(rule, context) {
                chain.push(rule.id.clone());
            }
            if goal.interpret(context) {
                return Ok(());
            }
        }

        Err("No applicable rules".to_string())
    }

    fn rules_for_goal(&self, goal: &RuleExpression, at: DateTime<Utc>) -> Vec<&'a Rule> {
        let rule_base: &'a RuleBase = self.rule_base;
        let wanted = goal.referenced_variables();
        rule_base
            .rules_by_priority()
            .into_iter()
            .filter(|rule| rule.is_available_at(at))
            .filter(|rule| match rule.action.as_ref() {
                None => false,
                Some(_) if wanted.is_empty() => true,
                Some(action) => action.target_variable().is_some_and(|name| wanted.contains(&name)),
            })
            .collect()
    }

    /// Variable-level changes made by each firing of `rule_id`.
    pub fn explain_reasoning(&self, rule_id: &RuleId) -> Vec<ReasoningStep> {
        self.trace
            .iter()
            .filter(|entry| &entry.rule_id == rule_id)
            .map(|entry| ReasoningStep {
                rule_id: entry.rule_id.clone(),
                rule_name: entry.rule_name.clone(),
                timestamp: entry.timestamp,
                success: entry.success,
                error: entry.error.clone(),
                changes: entry.before.changes_to(&entry.after),
            })
            .collect()
    }

    pub fn statistics(&self) -> EngineStatistics {
        let successful = self.trace.iter().filter(|entry| entry.success).count();
        EngineStatistics {
            rules_fired: self.trace.len(),
            successful_executions: successful,
            failed_executions: self.trace.len() - successful,
            working_memory_size: self.memory.len(),
            conflict_resolution: self.conflict_resolution,
        }
    }

    pub fn reset(&mut self) {
        self.memory.clear();
        self.trace.clear();
    }
}

fn condition_holds(rule: &Rule, context: &ShoppingContext<'_>) -> bool {
    let Some(condition) = rule.condition.as_ref() else {
        return true;
    };
    match condition.evaluate(context) {
        Ok(holds) => holds,
        Err(error) => {
            warn!(
                event_name = "rules.condition_failed",
                rule_id = %rule.id,
                error = %error,
                "rule condition could not be evaluated"
            );
            false
        }
    }
}
