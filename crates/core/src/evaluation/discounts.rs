use rust_decimal::Decimal;

use crate::discounts::{distribute, distributed_total, money, DiscountComponent, DiscountRule};
use crate::evaluation::{
    AppliedDiscount, CartEvaluator, Contribution, DiscountFindings, EvaluationInput, EvaluatorError,
};
use crate::rules::ShoppingContext;

/// Applies every configured discount tree and spreads the result over the cart.
pub struct DiscountEvaluator {
    trees: Vec<DiscountComponent>,
}

impl DiscountEvaluator {
    pub fn new(trees: Vec<DiscountComponent>) -> Self {
        Self { trees }
    }

    pub fn trees(&self) -> &[DiscountComponent] {
        &self.trees
    }
}

impl CartEvaluator for DiscountEvaluator {
    fn name(&self) -> &'static str {
        "DiscountCalculator"
    }

    fn priority(&self) -> u8 {
        9
    }

    fn applies_to(&self, input: &EvaluationInput<'_>) -> bool {
        !input.cart.is_empty()
    }

    fn evaluate(&self, input: &EvaluationInput<'_>) -> Result<Contribution, EvaluatorError> {
        let context = ShoppingContext::new(input.user, input.cart, input.inventory, input.now);
        let mut applied = Vec::new();

        for tree in &self.trees {
            let outcome = tree.apply(input.cart, &context).map_err(|source| {
                EvaluatorError::Discount { tree: tree.name().to_string(), source }
            })?;
            if outcome.applied && outcome.amount > Decimal::ZERO {
                applied.push(AppliedDiscount {
                    name: tree.name().to_string(),
                    amount: outcome.amount,
                    message: outcome.message,
                    detail: outcome.detail,
                });
            }
        }

        let raw_total: Decimal = applied.iter().map(|discount| discount.amount).sum();
        let capped = money(raw_total.min(input.cart.subtotal()));
        let labels: Vec<String> = applied.iter().map(|discount| discount.name.clone()).collect();
        let adjustments = distribute(input.cart, capped, &labels);
        let total_discount = distributed_total(&adjustments);

        Ok(Contribution::Discounts(DiscountFindings { applied, total_discount, adjustments }))
    }
}
