use rust_decimal::Decimal;

use crate::discounts::{CompositeStrategy, DiscountBuilder, DiscountComponent};
use crate::rules::{ComparisonOperator, RuleCondition, RuleExpression, TimeCondition};

fn when(expression: RuleExpression) -> Option<RuleCondition> {
    Some(RuleCondition::Expression(expression))
}

/// Discount trees every assistant starts with.
pub fn default_discount_trees() -> Vec<DiscountComponent> {
    let student_combo = DiscountBuilder::new()
        .composite("Student & Cart Combo", CompositeStrategy::Sum)
        .percentage(
            "Student Discount",
            Decimal::new(15, 0),
            when(RuleExpression::user("isStudent", ComparisonOperator::Equal, true)),
        )
        .percentage(
            "High Value Cart",
            Decimal::new(10, 0),
            when(RuleExpression::min_total(Decimal::new(100, 0))),
        )
        .build();

    let electronics_bundle = DiscountBuilder::new()
        .composite("Electronics Bundle", CompositeStrategy::Max)
        .category(
            "Electronics Discount",
            "Electronics",
            Decimal::new(20, 0),
            when(RuleExpression::category_count("Electronics", 2)),
        )
        .bundle("Buy 2 Get 1", 2, 1, Some("Electronics"))
        .build();

    let holiday_season = DiscountBuilder::new()
        .composite("Holiday Season", CompositeStrategy::Max)
        .percentage(
            "December Sale",
            Decimal::new(25, 0),
            when(RuleExpression::time(TimeCondition::Month(12))),
        )
        .fixed_amount(
            "New Year Special",
            Decimal::new(50, 0),
            when(RuleExpression::min_total(Decimal::new(200, 0))),
        )
        .build();

    [student_combo, electronics_bundle, holiday_season].into_iter().flatten().collect()
}
