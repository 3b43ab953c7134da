//! Boolean rule conditions evaluated against a shopping context.

pub mod context;
pub mod expression;
pub mod parser;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use context::{
    CartUpdateRequest, ContextSnapshot, IssuedDiscount, IssuedDiscountKind, IssuedRecommendation,
    ShoppingContext, SnapshotChange,
};
pub use expression::{ComparisonOperator, RuleExpression, TimeCondition};
pub use parser::{RuleParseError, RuleParser};

/// Condition attached to a rule or a discount leaf.
///
/// `Source` holds unparsed rule text as authored by an operator. It is parsed
/// on every evaluation, so a malformed source surfaces as an evaluation error
/// that callers isolate per rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleCondition {
    Expression(RuleExpression),
    Source(String),
}

impl RuleCondition {
    pub fn evaluate(&self, context: &ShoppingContext<'_>) -> Result<bool, RuleParseError> {
        match self {
            Self::Expression(expression) => Ok(expression.interpret(context)),
            Self::Source(source) => Ok(RuleParser::parse(source)?.interpret(context)),
        }
    }

    pub fn resolve(&self) -> Result<RuleExpression, RuleParseError> {
        match self {
            Self::Expression(expression) => Ok(expression.clone()),
            Self::Source(source) => RuleParser::parse(source),
        }
    }

    /// Terminal count used for specificity ordering; unparseable text counts as one.
    pub fn terminal_count(&self) -> usize {
        self.resolve().map(|expression| expression.terminal_count()).unwrap_or(1)
    }
}

impl From<RuleExpression> for RuleCondition {
    fn from(value: RuleExpression) -> Self {
        Self::Expression(value)
    }
}

impl fmt::Display for RuleCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expression(expression) => write!(f, "{expression}"),
            Self::Source(source) => f.write_str(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{RuleCondition, RuleParseError};
    use crate::domain::cart::Cart;
    use crate::domain::session::SessionId;
    use crate::domain::user::{UserId, UserProfile};
    use crate::rules::context::ShoppingContext;

    #[test]
    fn source_conditions_parse_on_evaluation() {
        let user = UserProfile::new("u-1", "John").student();
        let cart = Cart::new(UserId::new("u-1"), SessionId::new("S-1"));
        let context = ShoppingContext::new(&user, &cart, &[], Utc::now());

        let valid = RuleCondition::Source("user.isStudent === true".to_string());
        assert_eq!(valid.evaluate(&context), Ok(true));
        assert_eq!(valid.terminal_count(), 1);

        let broken = RuleCondition::Source("user.isStudent ===".to_string());
        assert!(matches!(broken.evaluate(&context), Err(RuleParseError::UnexpectedEnd { .. })));
    }
}
