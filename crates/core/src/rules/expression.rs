use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Datelike, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::product::ProductId;
use crate::rules::context::ShoppingContext;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ComparisonOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    Includes,
    StartsWith,
    /// Kept so that rule definitions with a typo still load; never matches.
    Unknown(String),
}

impl ComparisonOperator {
    pub fn symbol(&self) -> &str {
        match self {
            Self::Equal => "===",
            Self::NotEqual => "!==",
            Self::GreaterThan => ">",
            Self::GreaterOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessOrEqual => "<=",
            Self::Includes => "includes",
            Self::StartsWith => "startsWith",
            Self::Unknown(raw) => raw,
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "===" | "==" => Self::Equal,
            "!==" | "!=" => Self::NotEqual,
            ">" => Self::GreaterThan,
            ">=" => Self::GreaterOrEqual,
            "<" => Self::LessThan,
            "<=" => Self::LessOrEqual,
            "includes" => Self::Includes,
            "startsWith" => Self::StartsWith,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Compares a resolved attribute against the expected literal.
    /// Ordering operators accept two numbers or two strings; anything else is false.
    pub fn compare(&self, actual: &Value, expected: &Value) -> bool {
        match self {
            Self::Equal => values_equal(actual, expected),
            Self::NotEqual => !values_equal(actual, expected),
            Self::GreaterThan => order(actual, expected) == Some(Ordering::Greater),
            Self::GreaterOrEqual => {
                matches!(order(actual, expected), Some(Ordering::Greater | Ordering::Equal))
            }
            Self::LessThan => order(actual, expected) == Some(Ordering::Less),
            Self::LessOrEqual => {
                matches!(order(actual, expected), Some(Ordering::Less | Ordering::Equal))
            }
            Self::Includes => match actual {
                Value::Array(items) => items.iter().any(|item| values_equal(item, expected)),
                _ => false,
            },
            Self::StartsWith => match (actual, expected) {
                (Value::String(actual), Value::String(prefix)) => actual.starts_with(prefix.as_str()),
                _ => false,
            },
            Self::Unknown(_) => false,
        }
    }
}

impl From<String> for ComparisonOperator {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<ComparisonOperator> for String {
    fn from(value: ComparisonOperator) -> Self {
        value.symbol().to_string()
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(left), Some(right)) if left.is_finite() && right.is_finite() => left == right,
        _ => left == right,
    }
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => left.as_f64()?.partial_cmp(&right.as_f64()?),
        (Value::String(left), Value::String(right)) => Some(left.cmp(right)),
        _ => None,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum TimeCondition {
    /// Calendar month, 1 = January.
    Month(u32),
    DayOfWeek(String),
    Hour(u32),
    DateRange { start: DateTime<Utc>, end: DateTime<Utc> },
}

impl TimeCondition {
    pub fn holds_at(&self, at: DateTime<Utc>) -> bool {
        match self {
            Self::Month(month) => at.month() == *month,
            Self::DayOfWeek(day) => weekday_name(at).eq_ignore_ascii_case(day.trim()),
            Self::Hour(hour) => at.hour() == *hour,
            Self::DateRange { start, end } => *start <= at && at <= *end,
        }
    }
}

fn weekday_name(at: DateTime<Utc>) -> &'static str {
    use chrono::Weekday;

    match at.weekday() {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

impl fmt::Display for TimeCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Month(month) => write!(f, "time.month === {month}"),
            Self::DayOfWeek(day) => write!(f, "time.dayOfWeek === {day}"),
            Self::Hour(hour) => write!(f, "time.hour === {hour}"),
            Self::DateRange { start, end } => {
                write!(f, "time.dateRange === {}..{}", start.to_rfc3339(), end.to_rfc3339())
            }
        }
    }
}

/// Boolean predicate over a [`ShoppingContext`].
///
/// Evaluation is pure and total: unresolvable attributes and variables make a
/// terminal evaluate to `false` rather than fail.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleExpression {
    UserAttribute { attribute: String, operator: ComparisonOperator, value: Value },
    Variable { name: String, operator: ComparisonOperator, value: Value },
    PriceRange { min: Decimal, max: Option<Decimal> },
    CategoryCount { category: String, min_count: usize },
    Time { condition: TimeCondition },
    ProductMembership { product_ids: Vec<ProductId> },
    And { children: Vec<RuleExpression> },
    Or { children: Vec<RuleExpression> },
    Not { child: Box<RuleExpression> },
}

impl RuleExpression {
    pub fn user(
        attribute: impl Into<String>,
        operator: ComparisonOperator,
        value: impl Into<Value>,
    ) -> Self {
        Self::UserAttribute { attribute: attribute.into(), operator, value: value.into() }
    }

    pub fn variable(
        name: impl Into<String>,
        operator: ComparisonOperator,
        value: impl Into<Value>,
    ) -> Self {
        Self::Variable { name: name.into(), operator, value: value.into() }
    }

    pub fn min_total(min: Decimal) -> Self {
        Self::PriceRange { min, max: None }
    }

    pub fn total_between(min: Decimal, max: Decimal) -> Self {
        Self::PriceRange { min, max: Some(max) }
    }

    pub fn category_count(category: impl Into<String>, min_count: usize) -> Self {
        Self::CategoryCount { category: category.into(), min_count }
    }

    pub fn time(condition: TimeCondition) -> Self {
        Self::Time { condition }
    }

    pub fn has_products<I, S>(product_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::ProductMembership { product_ids: product_ids.into_iter().map(ProductId::new).collect() }
    }

    pub fn and(children: Vec<RuleExpression>) -> Self {
        Self::And { children }
    }

    pub fn or(children: Vec<RuleExpression>) -> Self {
        Self::Or { children }
    }

    pub fn not(child: RuleExpression) -> Self {
        Self::Not { child: Box::new(child) }
    }

    pub fn interpret(&self, context: &ShoppingContext<'_>) -> bool {
        match self {
            Self::UserAttribute { attribute, operator, value } => context
                .user_attribute(attribute)
                .is_some_and(|actual| operator.compare(&actual, value)),
            Self::Variable { name, operator, value } => {
                context.variable(name).is_some_and(|actual| operator.compare(actual, value))
            }
            Self::PriceRange { min, max } => {
                let total = context.cart_total();
                total >= *min && max.map_or(true, |max| total <= max)
            }
            Self::CategoryCount { category, min_count } => {
                context.category_count(category) >= *min_count
            }
            Self::Time { condition } => condition.holds_at(context.timestamp),
            Self::ProductMembership { product_ids } => {
                product_ids.iter().any(|product_id| context.has_product(product_id))
            }
            Self::And { children } => children.iter().all(|child| child.interpret(context)),
            Self::Or { children } => children.iter().any(|child| child.interpret(context)),
            Self::Not { child } => !child.interpret(context),
        }
    }

    /// Number of terminal conditions, recursing through AND/OR. A negation counts as one.
    pub fn terminal_count(&self) -> usize {
        match self {
            Self::And { children } | Self::Or { children } => {
                children.iter().map(RuleExpression::terminal_count).sum()
            }
            _ => 1,
        }
    }

    /// Context variables read anywhere in the tree.
    pub fn referenced_variables(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables<'e>(&'e self, names: &mut Vec<&'e str>) {
        match self {
            Self::Variable { name, .. } => {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
            Self::And { children } | Self::Or { children } => {
                children.iter().for_each(|child| child.collect_variables(names));
            }
            Self::Not { child } => child.collect_variables(names),
            _ => {}
        }
    }

    /// Immediate sub-goals: the children of a conjunction, or the expression itself.
    pub fn subgoals(&self) -> Vec<&RuleExpression> {
        match self {
            Self::And { children } => children.iter().collect(),
            other => vec![other],
        }
    }
}

fn write_value(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::String(text) => f.write_str(text),
        other => write!(f, "{other}"),
    }
}

fn write_joined(
    f: &mut fmt::Formatter<'_>,
    children: &[RuleExpression],
    separator: &str,
) -> fmt::Result {
    f.write_str("(")?;
    for (index, child) in children.iter().enumerate() {
        if index > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{child}")?;
    }
    f.write_str(")")
}

impl fmt::Display for RuleExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserAttribute { attribute, operator, value } => {
                write!(f, "user.{attribute} {operator} ")?;
                write_value(f, value)
            }
            Self::Variable { name, operator, value } => {
                write!(f, "var.{name} {operator} ")?;
                write_value(f, value)
            }
            Self::PriceRange { min, max: None } => write!(f, "cart.total >= {min}"),
            Self::PriceRange { min, max: Some(max) } => {
                write!(f, "cart.total between {min} and {max}")
            }
            Self::CategoryCount { category, min_count } => {
                write!(f, "cart.{category}.count >= {min_count}")
            }
            Self::Time { condition } => write!(f, "{condition}"),
            Self::ProductMembership { product_ids } => {
                let ids: Vec<&str> = product_ids.iter().map(ProductId::as_str).collect();
                write!(f, "cart.hasProducts({})", ids.join(", "))
            }
            Self::And { children } => write_joined(f, children, " AND "),
            Self::Or { children } => write_joined(f, children, " OR "),
            Self::Not { child } => write!(f, "NOT ({child})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{ComparisonOperator, RuleExpression, TimeCondition};
    use crate::domain::cart::{Cart, CartItem};
    use crate::domain::session::SessionId;
    use crate::domain::user::{UserId, UserProfile};
    use crate::rules::context::ShoppingContext;

    fn cart_with(items: Vec<CartItem>) -> Cart {
        let mut cart = Cart::new(UserId::new("u-1"), SessionId::new("S-1"));
        items.into_iter().for_each(|item| cart.add_item(item));
        cart
    }

    fn student() -> UserProfile {
        UserProfile::new("u-1", "John Student")
            .student()
            .with_attribute("interests", json!(["audio", "gaming"]))
            .with_attribute("email", json!("john@campus.edu"))
            .with_attribute("age", json!(21))
    }

    #[test]
    fn attribute_operators_follow_strict_comparison_rules() {
        let user = student();
        let cart = cart_with(Vec::new());
        let context = ShoppingContext::new(&user, &cart, &[], Utc::now());

        let holds = |attribute: &str, operator: &str, value: serde_json::Value| {
            RuleExpression::user(attribute, ComparisonOperator::parse(operator), value)
                .interpret(&context)
        };

        assert!(holds("isStudent", "===", json!(true)));
        assert!(!holds("isStudent", "!==", json!(true)));
        assert!(holds("age", ">=", json!(21.0)));
        assert!(holds("age", "<", json!(30)));
        assert!(!holds("age", ">", json!("20")));
        assert!(holds("interests", "includes", json!("audio")));
        assert!(!holds("email", "includes", json!("campus")));
        assert!(holds("email", "startsWith", json!("john@")));
        assert!(!holds("age", "~=", json!(21)));
    }

    #[test]
    fn missing_attributes_never_match() {
        let user = UserProfile::new("u-2", "Jane");
        let cart = cart_with(Vec::new());
        let context = ShoppingContext::new(&user, &cart, &[], Utc::now());

        let expression =
            RuleExpression::user("membership.tier", ComparisonOperator::NotEqual, json!("gold"));
        assert!(!expression.interpret(&context));
    }

    #[test]
    fn price_category_and_membership_terminals_read_the_cart() {
        let user = student();
        let cart = cart_with(vec![
            CartItem::new("p-1", "Earbuds", Decimal::new(80, 0), 1, "Electronics"),
            CartItem::new("p-2", "Watch", Decimal::new(50, 0), 1, "electronics"),
        ]);
        let context = ShoppingContext::new(&user, &cart, &[], Utc::now());

        assert!(RuleExpression::min_total(Decimal::new(130, 0)).interpret(&context));
        assert!(!RuleExpression::total_between(Decimal::ZERO, Decimal::new(100, 0))
            .interpret(&context));
        assert!(RuleExpression::category_count("Electronics", 2).interpret(&context));
        assert!(RuleExpression::has_products(["missing", "p-2"]).interpret(&context));
        assert!(!RuleExpression::has_products(["missing"]).interpret(&context));
    }

    #[test]
    fn time_conditions_use_the_context_timestamp() {
        let user = student();
        let cart = cart_with(Vec::new());
        let at = Utc
            .with_ymd_and_hms(2026, 12, 4, 9, 30, 0)
            .single()
            .expect("friday in december is a valid timestamp");
        let context = ShoppingContext::new(&user, &cart, &[], at);

        assert!(RuleExpression::time(TimeCondition::Month(12)).interpret(&context));
        assert!(RuleExpression::time(TimeCondition::DayOfWeek("Friday".into())).interpret(&context));
        assert!(RuleExpression::time(TimeCondition::Hour(9)).interpret(&context));
        assert!(!RuleExpression::time(TimeCondition::Month(1)).interpret(&context));
    }

    #[test]
    fn combinators_compose_and_render_stable_text() {
        let expression = RuleExpression::or(vec![
            RuleExpression::and(vec![
                RuleExpression::user("isStudent", ComparisonOperator::Equal, json!(true)),
                RuleExpression::min_total(Decimal::new(100, 0)),
            ]),
            RuleExpression::not(RuleExpression::category_count("Books", 1)),
        ]);

        assert_eq!(
            expression.to_string(),
            "((user.isStudent === true AND cart.total >= 100) OR NOT (cart.Books.count >= 1))"
        );
        assert_eq!(expression.terminal_count(), 3);

        let user = student();
        let cart = cart_with(Vec::new());
        let context = ShoppingContext::new(&user, &cart, &[], Utc::now());
        assert!(expression.interpret(&context));
    }

    #[test]
    fn variable_terminals_read_context_variables() {
        let user = student();
        let cart = cart_with(Vec::new());
        let mut context = ShoppingContext::new(&user, &cart, &[], Utc::now());
        let expression = RuleExpression::variable("tier", ComparisonOperator::Equal, json!("gold"));

        assert!(!expression.interpret(&context));
        context.set_variable("tier", json!("gold"));
        assert!(expression.interpret(&context));
        assert_eq!(expression.referenced_variables(), vec!["tier"]);
        assert_eq!(expression.to_string(), "var.tier === gold");
    }

    #[test]
    fn unknown_operator_survives_serde_round_trip() {
        let operator: ComparisonOperator =
            serde_json::from_value(json!("approximately")).expect("operator deserializes");
        assert_eq!(operator, ComparisonOperator::Unknown("approximately".to_string()));
        assert_eq!(serde_json::to_value(&operator).expect("serializes"), json!("approximately"));
    }
}
