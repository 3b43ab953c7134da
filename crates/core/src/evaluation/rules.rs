use tracing::debug;

use crate::config::EngineConfig;
use crate::engine::InferenceEngine;
use crate::evaluation::{CartEvaluator, Contribution, EvaluationInput, EvaluatorError, RuleFindings};
use crate::rules::ShoppingContext;

/// Runs a forward-chaining pass over the rule base.
pub struct RuleEvaluator {
    config: EngineConfig,
}

impl RuleEvaluator {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl CartEvaluator for RuleEvaluator {
    fn name(&self) -> &'static str {
        "RuleInterpreter"
    }

    fn priority(&self) -> u8 {
        10
    }

    fn evaluate(&self, input: &EvaluationInput<'_>) -> Result<Contribution, EvaluatorError> {
        let mut context = ShoppingContext::new(input.user, input.cart, input.inventory, input.now);
        let mut engine = InferenceEngine::from_config(input.rule_base, &self.config);
        let result = engine.forward_chain(&mut context);

        debug!(
            event_name = "evaluation.rules_evaluated",
            fired = result.fired_rules.len(),
            failed = result.failed_rules.len(),
            iterations = result.iterations,
            "forward chaining finished"
        );

        Ok(Contribution::Rules(RuleFindings {
            fired_rules: result.fired_rules,
            failed_rules: result.failed_rules,
            iterations: result.iterations,
            issued_discounts: context.issued_discounts,
            recommendations: context.recommendations,
            cart_updates: context.cart_updates,
            variables: context.variables,
        }))
    }
}
