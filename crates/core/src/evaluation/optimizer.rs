use rust_decimal::Decimal;

use crate::config::CheckoutConfig;
use crate::discounts::money;
use crate::domain::cart::CartItem;
use crate::domain::product::{same_category, Product};
use crate::evaluation::{
    CartEvaluator, Contribution, EvaluationInput, EvaluatorError, OptimizationFindings, Suggestion,
    SuggestionKind, SuggestionPriority,
};

const BUNDLE_CATEGORY: &str = "Electronics";

/// Suggests cart changes that would lower the price the user pays.
pub struct CartOptimizer {
    checkout: CheckoutConfig,
}

impl CartOptimizer {
    pub fn new(checkout: CheckoutConfig) -> Self {
        Self { checkout }
    }

    fn bundle(&self, input: &EvaluationInput<'_>) -> Option<Suggestion> {
        (input.cart.category_line_count(BUNDLE_CATEGORY) == 1).then(|| Suggestion {
            kind: SuggestionKind::Bundle,
            priority: SuggestionPriority::High,
            message: "Add one more electronics item to get 20% off!".to_string(),
            product_id: None,
            potential_saving: Some(money(input.cart.subtotal() * Decimal::new(2, 1))),
        })
    }

    fn free_shipping(&self, input: &EvaluationInput<'_>) -> Option<Suggestion> {
        let total = input.cart.total();
        let threshold = self.checkout.free_shipping_threshold;
        (total > Decimal::ZERO && total < threshold).then(|| Suggestion {
            kind: SuggestionKind::FreeShipping,
            priority: SuggestionPriority::High,
            message: format!("Add ${:.2} more for FREE shipping!", threshold - total),
            product_id: None,
            potential_saving: Some(self.checkout.shipping_cost),
        })
    }

    fn alternative(item: &CartItem, inventory: &[Product]) -> Option<Suggestion> {
        let cheapest = inventory
            .iter()
            .filter(|product| {
                product.id != item.product_id
                    && same_category(&product.category, &item.category)
                    && product.stock >= item.quantity
                    && product.price < item.original_price
            })
            .min_by(|left, right| left.price.cmp(&right.price))?;
        let saving = (item.original_price - cheapest.price) * Decimal::from(item.quantity);
        Some(Suggestion {
            kind: SuggestionKind::Alternative,
            priority: SuggestionPriority::Medium,
            message: format!(
                "Consider {} instead of {} and save ${:.2}",
                cheapest.name, item.name, saving
            ),
            product_id: Some(cheapest.id.clone()),
            potential_saving: Some(saving),
        })
    }

    fn duplicate(item: &CartItem) -> Option<Suggestion> {
        (item.quantity > 1).then(|| Suggestion {
            kind: SuggestionKind::Duplicate,
            priority: SuggestionPriority::Low,
            message: format!("You have {} of \"{}\"", item.quantity, item.name),
            product_id: Some(item.product_id.clone()),
            potential_saving: None,
        })
    }
}

impl CartEvaluator for CartOptimizer {
    fn name(&self) -> &'static str {
        "CartOptimizer"
    }

    fn priority(&self) -> u8 {
        6
    }

    fn applies_to(&self, input: &EvaluationInput<'_>) -> bool {
        !input.cart.is_empty()
    }

    fn evaluate(&self, input: &EvaluationInput<'_>) -> Result<Contribution, EvaluatorError> {
        let mut suggestions: Vec<Suggestion> =
            self.bundle(input).into_iter().chain(self.free_shipping(input)).collect();
        for item in &input.cart.items {
            suggestions.extend(Self::alternative(item, input.inventory));
            suggestions.extend(Self::duplicate(item));
        }

        let potential_savings =
            suggestions.iter().filter_map(|suggestion| suggestion.potential_saving).sum();
        Ok(Contribution::Suggestions(OptimizationFindings { suggestions, potential_savings }))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::CartOptimizer;
    use crate::config::AppConfig;
    use crate::domain::cart::{Cart, CartItem};
    use crate::domain::product::Product;
    use crate::domain::session::SessionId;
    use crate::domain::user::{UserId, UserProfile};
    use crate::engine::RuleBase;
    use crate::evaluation::{
        CartEvaluator, Contribution, EvaluationInput, OptimizationFindings, SuggestionKind,
    };

    fn optimize(cart: &Cart, inventory: &[Product]) -> OptimizationFindings {
        let user = UserProfile::new("u-1", "Jane");
        let rule_base = RuleBase::new();
        let input = EvaluationInput { user: &user, cart, inventory, rule_base: &rule_base, now: Utc::now() };
        match CartOptimizer::new(AppConfig::default().checkout).evaluate(&input) {
            Ok(Contribution::Suggestions(findings)) => findings,
            other => panic!("unexpected optimizer result: {other:?}"),
        }
    }

    #[test]
    fn single_electronics_line_gets_bundle_and_alternative_hints() {
        let mut cart = Cart::new(UserId::new("u-1"), SessionId::new("S-1"));
        cart.add_item(CartItem::new("hp-1", "Studio Headphones", Decimal::new(120, 0), 1, "Electronics"));
        let inventory = vec![
            Product::new("hp-1", "Studio Headphones", Decimal::new(120, 0), 4, "Electronics"),
            Product::new("hp-2", "Budget Headphones", Decimal::new(45, 0), 9, "electronics"),
            Product::new("hp-3", "Mid Headphones", Decimal::new(80, 0), 9, "Electronics"),
        ];

        let findings = optimize(&cart, &inventory);
        let kinds: Vec<SuggestionKind> = findings.suggestions.iter().map(|s| s.kind).collect();

        assert_eq!(kinds, vec![SuggestionKind::Bundle, SuggestionKind::Alternative]);
        assert_eq!(findings.suggestions[1].message, "Consider Budget Headphones instead of Studio Headphones and save $75.00");
        assert_eq!(findings.potential_savings, Decimal::new(99, 0));
    }

    #[test]
    fn small_cart_gets_free_shipping_and_duplicate_hints() {
        let mut cart = Cart::new(UserId::new("u-1"), SessionId::new("S-1"));
        cart.add_item(CartItem::new("pen-1", "Pen", Decimal::new(250, 2), 4, "Office"));

        let findings = optimize(&cart, &[]);

        assert_eq!(findings.suggestions.len(), 2);
        assert_eq!(findings.suggestions[0].message, "Add $40.00 more for FREE shipping!");
        assert_eq!(findings.suggestions[1].message, "You have 4 of \"Pen\"");
        assert_eq!(findings.potential_savings, Decimal::new(999, 2));
    }
}
