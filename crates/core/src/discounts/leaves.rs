use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::discounts::{money, DiscountDetail, DiscountError, DiscountOutcome, DiscountRule};
use crate::domain::cart::Cart;
use crate::domain::product::same_category;
use crate::rules::{RuleCondition, ShoppingContext};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

fn clamp_percentage(percentage: Decimal) -> Decimal {
    percentage.max(Decimal::ZERO).min(HUNDRED)
}

fn condition_holds(
    condition: Option<&RuleCondition>,
    context: &ShoppingContext<'_>,
) -> Result<bool, DiscountError> {
    match condition {
        None => Ok(true),
        Some(condition) => Ok(condition.evaluate(context)?),
    }
}

fn when_clause(condition: Option<&RuleCondition>) -> String {
    condition.map(|condition| format!(" when {condition}")).unwrap_or_default()
}

/// Percentage of the whole cart subtotal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PercentageDiscount {
    pub name: String,
    pub percentage: Decimal,
    pub condition: Option<RuleCondition>,
}

impl PercentageDiscount {
    pub fn new(
        name: impl Into<String>,
        percentage: Decimal,
        condition: Option<RuleCondition>,
    ) -> Self {
        Self { name: name.into(), percentage: clamp_percentage(percentage), condition }
    }
}

impl DiscountRule for PercentageDiscount {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(
        &self,
        cart: &Cart,
        context: &ShoppingContext<'_>,
    ) -> Result<DiscountOutcome, DiscountError> {
        if !condition_holds(self.condition.as_ref(), context)? {
            return Ok(DiscountOutcome::not_applied("Condition not met"));
        }

        let amount = money(cart.subtotal() * self.percentage / HUNDRED);
        Ok(DiscountOutcome::applied(
            &self.name,
            amount,
            format!("{}% discount applied", self.percentage),
            DiscountDetail::Percentage { percentage: self.percentage },
        ))
    }

    fn description(&self) -> String {
        format!("{}% off{}", self.percentage, when_clause(self.condition.as_ref()))
    }
}

/// Flat amount, never more than the cart subtotal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FixedAmountDiscount {
    pub name: String,
    pub amount: Decimal,
    pub condition: Option<RuleCondition>,
}

impl FixedAmountDiscount {
    pub fn new(name: impl Into<String>, amount: Decimal, condition: Option<RuleCondition>) -> Self {
        Self { name: name.into(), amount: amount.max(Decimal::ZERO), condition }
    }
}

impl DiscountRule for FixedAmountDiscount {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(
        &self,
        cart: &Cart,
        context: &ShoppingContext<'_>,
    ) -> Result<DiscountOutcome, DiscountError> {
        if !condition_holds(self.condition.as_ref(), context)? {
            return Ok(DiscountOutcome::not_applied("Condition not met"));
        }

        let amount = self.amount.min(cart.subtotal());
        Ok(DiscountOutcome::applied(
            &self.name,
            amount,
            format!("${} discount applied", self.amount),
            DiscountDetail::Fixed { fixed_amount: self.amount },
        ))
    }

    fn description(&self) -> String {
        format!("${} off{}", self.amount, when_clause(self.condition.as_ref()))
    }
}

/// Buy `buy_quantity`, get `get_quantity` free. Free units are always the
/// cheapest eligible units.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BundleDiscount {
    pub name: String,
    pub buy_quantity: u32,
    pub get_quantity: u32,
    pub category: Option<String>,
}

impl BundleDiscount {
    pub fn new(
        name: impl Into<String>,
        buy_quantity: u32,
        get_quantity: u32,
        category: Option<String>,
    ) -> Self {
        Self { name: name.into(), buy_quantity, get_quantity, category }
    }

    /// Upper bound on free units for a given eligible quantity.
    pub fn free_unit_allowance(&self, eligible_quantity: u32) -> u32 {
        if self.buy_quantity == 0 {
            return 0;
        }
        (eligible_quantity / self.buy_quantity).saturating_mul(self.get_quantity)
    }
}

impl DiscountRule for BundleDiscount {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(
        &self,
        cart: &Cart,
        _context: &ShoppingContext<'_>,
    ) -> Result<DiscountOutcome, DiscountError> {
        let mut eligible: Vec<_> = cart
            .items
            .iter()
            .filter(|item| {
                self.category.as_deref().map_or(true, |category| same_category(&item.category, category))
            })
            .collect();

        let total_quantity =
            eligible.iter().fold(0u32, |total, item| total.saturating_add(item.quantity));
        let bundle_count = if self.buy_quantity == 0 { 0 } else { total_quantity / self.buy_quantity };
        let mut remaining = self.free_unit_allowance(total_quantity);
        if bundle_count == 0 || remaining == 0 {
            return Ok(DiscountOutcome::not_applied("Bundle requirement not met"));
        }

        eligible.sort_by(|left, right| left.original_price.cmp(&right.original_price));
        let mut amount = Decimal::ZERO;
        let mut free_units = 0;
        for item in eligible {
            if remaining == 0 {
                break;
            }
            let units = remaining.min(item.quantity);
            amount += item.original_price * Decimal::from(units);
            free_units += units;
            remaining -= units;
        }

        Ok(DiscountOutcome::applied(
            &self.name,
            amount,
            format!("Buy {} Get {} applied", self.buy_quantity, self.get_quantity),
            DiscountDetail::Bundle { bundle_count, free_units },
        ))
    }

    fn description(&self) -> String {
        let category = self.category.as_deref().map(|category| format!(" in {category}"));
        format!(
            "Buy {} Get {} Free{}",
            self.buy_quantity,
            self.get_quantity,
            category.unwrap_or_default()
        )
    }
}

/// Percentage of the subtotal of one category.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategoryDiscount {
    pub name: String,
    pub category: String,
    pub percentage: Decimal,
    pub condition: Option<RuleCondition>,
}

impl CategoryDiscount {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        percentage: Decimal,
        condition: Option<RuleCondition>,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            percentage: clamp_percentage(percentage),
            condition,
        }
    }
}

impl DiscountRule for CategoryDiscount {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(
        &self,
        cart: &Cart,
        context: &ShoppingContext<'_>,
    ) -> Result<DiscountOutcome, DiscountError> {
        if !condition_holds(self.condition.as_ref(), context)? {
            return Ok(DiscountOutcome::not_applied("Condition not met"));
        }

        let category_total: Decimal = cart
            .items
            .iter()
            .filter(|item| same_category(&item.category, &self.category))
            .map(|item| item.line_subtotal())
            .sum();
        let amount = money(category_total * self.percentage / HUNDRED);
        if amount.is_zero() {
            return Ok(DiscountOutcome::not_applied(format!("No {} items in cart", self.category)));
        }

        Ok(DiscountOutcome::applied(
            &self.name,
            amount,
            format!("{}% off {}", self.percentage, self.category),
            DiscountDetail::Category { category: self.category.clone(), percentage: self.percentage },
        ))
    }

    fn description(&self) -> String {
        format!("{}% off {} items", self.percentage, self.category)
    }
}
