//! Composable discount trees.

pub mod builder;
pub mod catalog;
pub mod composite;
pub mod distribution;
pub mod leaves;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::cart::Cart;
use crate::rules::{RuleParseError, ShoppingContext};

pub use builder::DiscountBuilder;
pub use catalog::default_discount_trees;
pub use composite::{CompositeDiscount, CompositeStrategy};
pub use distribution::{apply_adjustments, distribute, distributed_total, ItemAdjustment};
pub use leaves::{BundleDiscount, CategoryDiscount, FixedAmountDiscount, PercentageDiscount};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DiscountError {
    #[error("discount condition could not be evaluated: {0}")]
    Condition(#[from] RuleParseError),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscountDetail {
    None,
    Percentage { percentage: Decimal },
    Fixed { fixed_amount: Decimal },
    Bundle { bundle_count: u32, free_units: u32 },
    Category { category: String, percentage: Decimal },
    Composite { strategy: CompositeStrategy, applied_rules: Vec<String>, breakdown: Vec<DiscountOutcome> },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscountOutcome {
    pub applied: bool,
    pub amount: Decimal,
    pub message: String,
    pub rule: Option<String>,
    pub detail: DiscountDetail,
}

impl DiscountOutcome {
    pub fn not_applied(message: impl Into<String>) -> Self {
        Self {
            applied: false,
            amount: Decimal::ZERO,
            message: message.into(),
            rule: None,
            detail: DiscountDetail::None,
        }
    }

    pub fn applied(
        rule: &str,
        amount: Decimal,
        message: impl Into<String>,
        detail: DiscountDetail,
    ) -> Self {
        Self {
            applied: true,
            amount: amount.max(Decimal::ZERO),
            message: message.into(),
            rule: Some(rule.to_string()),
            detail,
        }
    }
}

/// Capability shared by every node of a discount tree.
pub trait DiscountRule {
    fn name(&self) -> &str;

    /// Computes this node's discount against the cart's original prices.
    fn apply(
        &self,
        cart: &Cart,
        context: &ShoppingContext<'_>,
    ) -> Result<DiscountOutcome, DiscountError>;

    fn description(&self) -> String;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiscountComponent {
    Percentage(PercentageDiscount),
    Fixed(FixedAmountDiscount),
    Bundle(BundleDiscount),
    Category(CategoryDiscount),
    Composite(CompositeDiscount),
}

impl DiscountComponent {
    fn as_rule(&self) -> &dyn DiscountRule {
        match self {
            Self::Percentage(discount) => discount,
            Self::Fixed(discount) => discount,
            Self::Bundle(discount) => discount,
            Self::Category(discount) => discount,
            Self::Composite(discount) => discount,
        }
    }
}

impl DiscountRule for DiscountComponent {
    fn name(&self) -> &str {
        self.as_rule().name()
    }

    fn apply(
        &self,
        cart: &Cart,
        context: &ShoppingContext<'_>,
    ) -> Result<DiscountOutcome, DiscountError> {
        self.as_rule().apply(cart, context)
    }

    fn description(&self) -> String {
        self.as_rule().description()
    }
}

impl From<PercentageDiscount> for DiscountComponent {
    fn from(value: PercentageDiscount) -> Self {
        Self::Percentage(value)
    }
}

impl From<FixedAmountDiscount> for DiscountComponent {
    fn from(value: FixedAmountDiscount) -> Self {
        Self::Fixed(value)
    }
}

impl From<BundleDiscount> for DiscountComponent {
    fn from(value: BundleDiscount) -> Self {
        Self::Bundle(value)
    }
}

impl From<CategoryDiscount> for DiscountComponent {
    fn from(value: CategoryDiscount) -> Self {
        Self::Category(value)
    }
}

impl From<CompositeDiscount> for DiscountComponent {
    fn from(value: CompositeDiscount) -> Self {
        Self::Composite(value)
    }
}

/// Rounds to cents, half away from zero.
pub fn money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{money, DiscountComponent, DiscountRule, PercentageDiscount};
    use crate::domain::cart::{Cart, CartItem};
    use crate::domain::session::SessionId;
    use crate::domain::user::{UserId, UserProfile};
    use crate::rules::{RuleCondition, ShoppingContext};

    #[test]
    fn money_rounds_half_away_from_zero() {
        assert_eq!(money(Decimal::new(29_9985, 4)), Decimal::new(3_000, 2));
        assert_eq!(money(Decimal::new(1_005, 3)), Decimal::new(101, 2));
    }

    #[test]
    fn malformed_condition_surfaces_as_error() {
        let user = UserProfile::new("u-1", "Jane");
        let mut cart = Cart::new(UserId::new("u-1"), SessionId::new("S-1"));
        cart.add_item(CartItem::new("p-1", "Lamp", Decimal::new(20, 0), 1, "Home"));
        let context = ShoppingContext::new(&user, &cart, &[], Utc::now());
        let component = DiscountComponent::from(PercentageDiscount::new(
            "Broken",
            Decimal::new(10, 0),
            Some(RuleCondition::Source("user.isStudent ===".to_string())),
        ));

        assert!(component.apply(&cart, &context).is_err());
        assert_eq!(component.name(), "Broken");
    }
}
