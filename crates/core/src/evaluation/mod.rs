//! Cart evaluation pipeline.
//!
//! Independent evaluators run in descending priority. Each one either
//! contributes a typed finding or fails on its own; a failure is logged and
//! recorded, and the remaining evaluators still run.

pub mod discounts;
pub mod inventory;
pub mod optimizer;
pub mod personalization;
pub mod rules;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::discounts::{DiscountComponent, DiscountDetail, DiscountError, ItemAdjustment};
use crate::domain::cart::Cart;
use crate::domain::product::{Product, ProductId};
use crate::domain::user::UserProfile;
use crate::engine::{RuleBase, RuleId};
use crate::rules::{CartUpdateRequest, IssuedDiscount, IssuedRecommendation};

pub use discounts::DiscountEvaluator;
pub use inventory::InventoryEvaluator;
pub use optimizer::CartOptimizer;
pub use personalization::PersonalizationEvaluator;
pub use rules::RuleEvaluator;

/// Read-only inputs of one evaluation pass.
#[derive(Clone, Copy)]
pub struct EvaluationInput<'a> {
    pub user: &'a UserProfile,
    pub cart: &'a Cart,
    pub inventory: &'a [Product],
    pub rule_base: &'a RuleBase,
    pub now: DateTime<Utc>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EvaluatorError {
    #[error("discount tree `{tree}` failed: {source}")]
    Discount {
        tree: String,
        #[source]
        source: DiscountError,
    },
    #[error("{evaluator} failed: {reason}")]
    Failed { evaluator: String, reason: String },
}

pub trait CartEvaluator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Higher runs first.
    fn priority(&self) -> u8;

    fn applies_to(&self, _input: &EvaluationInput<'_>) -> bool {
        true
    }

    fn evaluate(&self, input: &EvaluationInput<'_>) -> Result<Contribution, EvaluatorError>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleFindings {
    pub fired_rules: Vec<RuleId>,
    pub failed_rules: Vec<RuleId>,
    pub iterations: usize,
    pub issued_discounts: Vec<IssuedDiscount>,
    pub recommendations: Vec<IssuedRecommendation>,
    pub cart_updates: Vec<CartUpdateRequest>,
    pub variables: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppliedDiscount {
    pub name: String,
    pub amount: Decimal,
    pub message: String,
    pub detail: DiscountDetail,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscountFindings {
    pub applied: Vec<AppliedDiscount>,
    pub total_discount: Decimal,
    pub adjustments: Vec<ItemAdjustment>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InventoryIssueKind {
    NotFound,
    LowStock,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryIssue {
    pub kind: InventoryIssueKind,
    pub product_id: ProductId,
    pub requested: u32,
    pub available: Option<u32>,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub product_id: ProductId,
    pub name: String,
    pub category: String,
    pub price: Decimal,
    pub score: f64,
    pub reason: String,
    pub student_discount: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuggestionKind {
    Bundle,
    FreeShipping,
    Alternative,
    Duplicate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuggestionPriority {
    Low,
    Medium,
    High,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub kind: SuggestionKind,
    pub priority: SuggestionPriority,
    pub message: String,
    pub product_id: Option<ProductId>,
    pub potential_saving: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimizationFindings {
    pub suggestions: Vec<Suggestion>,
    pub potential_savings: Decimal,
}

/// What a single evaluator adds to the aggregate.
#[derive(Clone, Debug, PartialEq)]
pub enum Contribution {
    Rules(RuleFindings),
    Discounts(DiscountFindings),
    Inventory(Vec<InventoryIssue>),
    Recommendations(Vec<Recommendation>),
    Suggestions(OptimizationFindings),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorFailure {
    pub evaluator: String,
    pub error: String,
}

/// Aggregate of every contribution from one pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartEvaluation {
    pub discounts: Vec<AppliedDiscount>,
    pub total_discount: Decimal,
    pub adjustments: Vec<ItemAdjustment>,
    pub suggestions: Vec<Suggestion>,
    pub potential_savings: Decimal,
    pub recommendations: Vec<Recommendation>,
    pub inventory_issues: Vec<InventoryIssue>,
    pub rules: Option<RuleFindings>,
    pub evaluators_run: Vec<String>,
    pub failures: Vec<EvaluatorFailure>,
    pub evaluated_at: DateTime<Utc>,
}

impl CartEvaluation {
    fn empty(evaluated_at: DateTime<Utc>) -> Self {
        Self {
            discounts: Vec::new(),
            total_discount: Decimal::ZERO,
            adjustments: Vec::new(),
            suggestions: Vec::new(),
            potential_savings: Decimal::ZERO,
            recommendations: Vec::new(),
            inventory_issues: Vec::new(),
            rules: None,
            evaluators_run: Vec::new(),
            failures: Vec::new(),
            evaluated_at,
        }
    }

    pub fn has_inventory_issues(&self) -> bool {
        !self.inventory_issues.is_empty()
    }

    fn merge(&mut self, contribution: Contribution) {
        match contribution {
            Contribution::Rules(findings) => self.rules = Some(findings),
            Contribution::Discounts(findings) => {
                self.discounts = findings.applied;
                self.total_discount = findings.total_discount;
                self.adjustments = findings.adjustments;
            }
            Contribution::Inventory(issues) => self.inventory_issues = issues,
            Contribution::Recommendations(recommendations) => {
                self.recommendations = recommendations;
            }
            Contribution::Suggestions(findings) => {
                self.suggestions = findings.suggestions;
                self.potential_savings = findings.potential_savings;
            }
        }
    }
}

#[derive(Default)]
pub struct EvaluationPipeline {
    evaluators: Vec<Box<dyn CartEvaluator>>,
}

impl EvaluationPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// The five standard evaluators configured from `config`.
    pub fn standard(config: &AppConfig, discount_trees: Vec<DiscountComponent>) -> Self {
        let mut pipeline = Self::new();
        pipeline.register(Box::new(RuleEvaluator::new(config.engine.clone())));
        pipeline.register(Box::new(DiscountEvaluator::new(discount_trees)));
        pipeline.register(Box::new(InventoryEvaluator));
        pipeline.register(Box::new(PersonalizationEvaluator::new(config.recommendations.clone())));
        pipeline.register(Box::new(CartOptimizer::new(config.checkout.clone())));
        pipeline
    }

    /// Adds an evaluator, keeping descending priority; equal priorities keep
    /// registration order.
    pub fn register(&mut self, evaluator: Box<dyn CartEvaluator>) {
        let position = self
            .evaluators
            .iter()
            .position(|existing| existing.priority() < evaluator.priority())
            .unwrap_or(self.evaluators.len());
        self.evaluators.insert(position, evaluator);
    }

    pub fn evaluator_names(&self) -> Vec<&'static str> {
        self.evaluators.iter().map(|evaluator| evaluator.name()).collect()
    }

    pub fn evaluate(&self, input: &EvaluationInput<'_>) -> CartEvaluation {
        let mut evaluation = CartEvaluation::empty(input.now);

        for evaluator in &self.evaluators {
            if !evaluator.applies_to(input) {
                debug!(
                    event_name = "evaluation.evaluator_skipped",
                    evaluator = evaluator.name(),
                    "evaluator not applicable"
                );
                continue;
            }
            match evaluator.evaluate(input) {
                Ok(contribution) => {
                    evaluation.evaluators_run.push(evaluator.name().to_string());
                    evaluation.merge(contribution);
                }
                Err(error) => {
                    warn!(
                        event_name = "evaluation.evaluator_failed",
                        evaluator = evaluator.name(),
                        user_id = %input.user.id,
                        error = %error,
                        "evaluator failed; continuing without its contribution"
                    );
                    evaluation.failures.push(EvaluatorFailure {
                        evaluator: evaluator.name().to_string(),
                        error: error.to_string(),
                    });
                }
            }
        }
        evaluation
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{
        CartEvaluator, Contribution, EvaluationInput, EvaluationPipeline, EvaluatorError,
        InventoryEvaluator,
    };
    use crate::config::AppConfig;
    use crate::discounts::default_discount_trees;
    use crate::domain::cart::{Cart, CartItem};
    use crate::domain::product::Product;
    use crate::domain::session::SessionId;
    use crate::domain::user::{UserId, UserProfile};
    use crate::engine::RuleBase;

    struct BrokenEvaluator;

    impl CartEvaluator for BrokenEvaluator {
        fn name(&self) -> &'static str {
            "Broken"
        }

        fn priority(&self) -> u8 {
            100
        }

        fn evaluate(&self, _input: &EvaluationInput<'_>) -> Result<Contribution, EvaluatorError> {
            Err(EvaluatorError::Failed {
                evaluator: "Broken".to_string(),
                reason: "always fails".to_string(),
            })
        }
    }

    fn fixture() -> (UserProfile, Cart, Vec<Product>, RuleBase) {
        let user = UserProfile::new("u-1", "John Student").student();
        let mut cart = Cart::new(UserId::new("u-1"), SessionId::new("S-1"));
        cart.add_item(CartItem::new("p-1", "Keyboard", Decimal::new(150, 0), 1, "Electronics"));
        let inventory = vec![
            Product::new("p-1", "Keyboard", Decimal::new(150, 0), 5, "Electronics"),
            Product::new("p-2", "Mouse", Decimal::new(25, 0), 50, "Electronics").with_rating(4.5),
        ];
        (user, cart, inventory, RuleBase::new())
    }

    fn march() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).single().expect("valid timestamp")
    }

    #[test]
    fn standard_pipeline_runs_in_priority_order() {
        let pipeline = EvaluationPipeline::standard(&AppConfig::default(), default_discount_trees());

        assert_eq!(
            pipeline.evaluator_names(),
            vec![
                "RuleInterpreter",
                "DiscountCalculator",
                "InventoryChecker",
                "PersonalizationEngine",
                "CartOptimizer"
            ]
        );
    }

    #[test]
    fn failing_evaluator_does_not_block_the_rest() {
        let (user, cart, inventory, rule_base) = fixture();
        let mut pipeline = EvaluationPipeline::standard(&AppConfig::default(), default_discount_trees());
        pipeline.register(Box::new(BrokenEvaluator));
        let input = EvaluationInput {
            user: &user,
            cart: &cart,
            inventory: &inventory,
            rule_base: &rule_base,
            now: march(),
        };

        let evaluation = pipeline.evaluate(&input);

        assert_eq!(evaluation.failures.len(), 1);
        assert_eq!(evaluation.failures[0].evaluator, "Broken");
        assert_eq!(evaluation.evaluators_run.len(), 5);
        // Student 15% + high value 10% on a 150 subtotal.
        assert_eq!(evaluation.total_discount, Decimal::new(3750, 2));
        assert!(!evaluation.recommendations.is_empty());
    }

    #[test]
    fn empty_cart_skips_cart_only_evaluators() {
        let (user, _, inventory, rule_base) = fixture();
        let cart = Cart::new(UserId::new("u-1"), SessionId::new("S-1"));
        let mut pipeline = EvaluationPipeline::new();
        pipeline.register(Box::new(InventoryEvaluator));
        pipeline.register(Box::new(super::DiscountEvaluator::new(default_discount_trees())));
        let input = EvaluationInput {
            user: &user,
            cart: &cart,
            inventory: &inventory,
            rule_base: &rule_base,
            now: march(),
        };

        let evaluation = pipeline.evaluate(&input);

        assert_eq!(evaluation.evaluators_run, vec!["InventoryChecker".to_string()]);
        assert!(evaluation.discounts.is_empty());
    }
}
