use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::discounts::{
    money, DiscountComponent, DiscountDetail, DiscountError, DiscountOutcome, DiscountRule,
};
use crate::domain::cart::Cart;
use crate::rules::ShoppingContext;

/// How a composite folds the amounts of its applied children.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CompositeStrategy {
    Max,
    Min,
    /// Sum, capped at the cart subtotal.
    Sum,
    /// Compound in child registration order.
    Multiply,
    First,
}

impl CompositeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Max => "MAX",
            Self::Min => "MIN",
            Self::Sum => "SUM",
            Self::Multiply => "MULTIPLY",
            Self::First => "FIRST",
        }
    }

    /// Unrecognised names fall back to MAX.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "MIN" => Self::Min,
            "SUM" => Self::Sum,
            "MULTIPLY" => Self::Multiply,
            "FIRST" => Self::First,
            _ => Self::Max,
        }
    }

    /// Aggregates applied amounts in registration order.
    pub fn aggregate(&self, amounts: &[Decimal], subtotal: Decimal) -> Decimal {
        match self {
            Self::Max => amounts.iter().copied().max().unwrap_or_default(),
            Self::Min => amounts.iter().copied().min().unwrap_or_default(),
            Self::Sum => amounts.iter().copied().sum::<Decimal>().min(subtotal),
            Self::Multiply => {
                if subtotal <= Decimal::ZERO {
                    return Decimal::ZERO;
                }
                let remaining = amounts.iter().fold(subtotal, |remaining, amount| {
                    let fraction = (*amount / subtotal).min(Decimal::ONE);
                    remaining - remaining * fraction
                });
                money(subtotal - remaining)
            }
            Self::First => amounts.first().copied().unwrap_or_default(),
        }
    }
}

impl From<String> for CompositeStrategy {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<CompositeStrategy> for String {
    fn from(value: CompositeStrategy) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for CompositeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompositeDiscount {
    pub name: String,
    pub strategy: CompositeStrategy,
    children: Vec<DiscountComponent>,
}

impl CompositeDiscount {
    pub fn new(name: impl Into<String>, strategy: CompositeStrategy) -> Self {
        Self { name: name.into(), strategy, children: Vec::new() }
    }

    pub fn add(&mut self, child: impl Into<DiscountComponent>) -> &mut Self {
        self.children.push(child.into());
        self
    }

    pub fn with_child(mut self, child: impl Into<DiscountComponent>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn remove(&mut self, index: usize) -> Option<DiscountComponent> {
        (index < self.children.len()).then(|| self.children.remove(index))
    }

    pub fn child(&self, index: usize) -> Option<&DiscountComponent> {
        self.children.get(index)
    }

    pub fn children(&self) -> &[DiscountComponent] {
        &self.children
    }

    fn message(&self, applied: &[DiscountOutcome]) -> String {
        let rule_names = || applied.iter().filter_map(|outcome| outcome.rule.as_deref());
        match self.strategy {
            CompositeStrategy::Max => {
                let best = applied
                    .iter()
                    .max_by(|left, right| left.amount.cmp(&right.amount))
                    .and_then(|outcome| outcome.rule.as_deref())
                    .unwrap_or_default();
                format!("Best discount: {best}")
            }
            CompositeStrategy::Sum => {
                format!("Combined discounts: {}", rule_names().collect::<Vec<_>>().join(" + "))
            }
            CompositeStrategy::Multiply => {
                format!("Stacked discounts: {} rules applied", applied.len())
            }
            CompositeStrategy::Min | CompositeStrategy::First => {
                format!("{} discount(s) applied", applied.len())
            }
        }
    }
}

impl DiscountRule for CompositeDiscount {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(
        &self,
        cart: &Cart,
        context: &ShoppingContext<'_>,
    ) -> Result<DiscountOutcome, DiscountError> {
        let mut applied = Vec::new();
        for child in &self.children {
            let outcome = child.apply(cart, context)?;
            if outcome.applied {
                applied.push(outcome);
            }
        }

        if applied.is_empty() {
            return Ok(DiscountOutcome::not_applied("No applicable discounts"));
        }

        let amounts: Vec<Decimal> = applied.iter().map(|outcome| outcome.amount).collect();
        let amount = self.strategy.aggregate(&amounts, cart.subtotal());
        let message = self.message(&applied);
        let applied_rules =
            applied.iter().filter_map(|outcome| outcome.rule.clone()).collect::<Vec<_>>();

        Ok(DiscountOutcome::applied(
            &self.name,
            amount,
            message,
            DiscountDetail::Composite { strategy: self.strategy, applied_rules, breakdown: applied },
        ))
    }

    fn description(&self) -> String {
        let children: Vec<String> = self.children.iter().map(DiscountRule::description).collect();
        format!("Composite ({}): {}", self.strategy, children.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{CompositeDiscount, CompositeStrategy};
    use crate::discounts::leaves::{FixedAmountDiscount, PercentageDiscount};
    use crate::discounts::{DiscountDetail, DiscountRule};
    use crate::domain::cart::{Cart, CartItem};
    use crate::domain::session::SessionId;
    use crate::domain::user::{UserId, UserProfile};
    use crate::rules::{RuleCondition, RuleExpression, ShoppingContext};

    fn dollars(value: i64) -> Decimal {
        Decimal::new(value, 0)
    }

    fn cart_worth(total: i64) -> Cart {
        let mut cart = Cart::new(UserId::new("u-1"), SessionId::new("S-1"));
        cart.add_item(CartItem::new("p-1", "Thing", dollars(total), 1, "Home"));
        cart
    }

    fn tenth(name: &str) -> PercentageDiscount {
        PercentageDiscount::new(name, dollars(10), None)
    }

    #[test]
    fn multiply_compounds_in_registration_order() {
        let user = UserProfile::new("u-1", "Jane");
        let cart = cart_worth(100);
        let context = ShoppingContext::new(&user, &cart, &[], Utc::now());
        let composite = CompositeDiscount::new("Stack", CompositeStrategy::Multiply)
            .with_child(tenth("First Tenth"))
            .with_child(tenth("Second Tenth"));

        let outcome = composite.apply(&cart, &context).expect("composite applies");

        assert_eq!(outcome.amount, dollars(19));
        assert_eq!(outcome.message, "Stacked discounts: 2 rules applied");
    }

    #[test]
    fn sum_is_capped_at_subtotal() {
        let user = UserProfile::new("u-1", "Jane");
        let cart = cart_worth(40);
        let context = ShoppingContext::new(&user, &cart, &[], Utc::now());
        let composite = CompositeDiscount::new("Pile", CompositeStrategy::Sum)
            .with_child(FixedAmountDiscount::new("A", dollars(30), None))
            .with_child(FixedAmountDiscount::new("B", dollars(30), None));

        let outcome = composite.apply(&cart, &context).expect("composite applies");

        assert_eq!(outcome.amount, dollars(40));
        assert_eq!(outcome.message, "Combined discounts: A + B");
    }

    #[test]
    fn only_applied_children_are_aggregated() {
        let user = UserProfile::new("u-1", "Jane");
        let cart = cart_worth(100);
        let context = ShoppingContext::new(&user, &cart, &[], Utc::now());
        let never = RuleCondition::from(RuleExpression::min_total(dollars(1_000)));
        let composite = CompositeDiscount::new("Pick", CompositeStrategy::Min)
            .with_child(FixedAmountDiscount::new("Unreachable", dollars(1), Some(never)))
            .with_child(FixedAmountDiscount::new("Five", dollars(5), None))
            .with_child(FixedAmountDiscount::new("Seven", dollars(7), None));

        let outcome = composite.apply(&cart, &context).expect("composite applies");

        assert_eq!(outcome.amount, dollars(5));
        let DiscountDetail::Composite { applied_rules, .. } = outcome.detail else {
            panic!("composite detail expected");
        };
        assert_eq!(applied_rules, vec!["Five".to_string(), "Seven".to_string()]);
    }

    #[test]
    fn max_first_and_empty_composites() {
        let user = UserProfile::new("u-1", "Jane");
        let cart = cart_worth(100);
        let context = ShoppingContext::new(&user, &cart, &[], Utc::now());

        let best = CompositeDiscount::new("Best", CompositeStrategy::Max)
            .with_child(FixedAmountDiscount::new("Small", dollars(5), None))
            .with_child(FixedAmountDiscount::new("Large", dollars(12), None))
            .apply(&cart, &context)
            .expect("max applies");
        assert_eq!(best.amount, dollars(12));
        assert_eq!(best.message, "Best discount: Large");

        let first = CompositeDiscount::new("First", CompositeStrategy::First)
            .with_child(FixedAmountDiscount::new("Small", dollars(5), None))
            .with_child(FixedAmountDiscount::new("Large", dollars(12), None))
            .apply(&cart, &context)
            .expect("first applies");
        assert_eq!(first.amount, dollars(5));

        let empty = CompositeDiscount::new("Empty", CompositeStrategy::Sum)
            .apply(&cart, &context)
            .expect("empty evaluates");
        assert!(!empty.applied);
        assert_eq!(empty.message, "No applicable discounts");
    }

    #[test]
    fn unknown_strategy_names_fall_back_to_max() {
        assert_eq!(CompositeStrategy::from("AVERAGE".to_string()), CompositeStrategy::Max);
        assert_eq!(CompositeStrategy::from("multiply".to_string()), CompositeStrategy::Multiply);
        assert_eq!(CompositeStrategy::Multiply.aggregate(&[dollars(5)], Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn children_can_be_inspected_and_removed() {
        let mut composite = CompositeDiscount::new("Mixed", CompositeStrategy::Max);
        composite.add(tenth("One")).add(tenth("Two"));

        assert_eq!(composite.children().len(), 2);
        assert_eq!(composite.child(1).map(DiscountRule::name), Some("Two"));
        assert!(composite.remove(5).is_none());
        assert!(composite.remove(0).is_some());
        assert_eq!(composite.description(), "Composite (MAX): 10% off");
    }
}
