use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::product::{find_product, ProductId};
use crate::rules::{
    CartUpdateRequest, IssuedDiscount, IssuedDiscountKind, IssuedRecommendation, RuleCondition,
    ShoppingContext,
};

pub const DEFAULT_RULE_TYPE: &str = "GENERAL";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId(pub String);

impl RuleId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RuleActionError {
    #[error("discount `{label}` is invalid: {reason}")]
    InvalidDiscount { label: String, reason: String },
    #[error("product `{0}` is not in the inventory")]
    UnknownProduct(ProductId),
    #[error("product `{0}` is not in the cart")]
    ProductNotInCart(ProductId),
}

/// Effect of a fired rule on the shopping context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleAction {
    SetVariable { variable: String, value: Value },
    AddDiscount { label: String, discount: IssuedDiscountKind },
    AddRecommendation { product_id: ProductId, reason: String },
    UpdateCart { product_id: ProductId, quantity: u32 },
}

impl RuleAction {
    pub fn set_variable(variable: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::SetVariable { variable: variable.into(), value: value.into() }
    }

    pub fn percentage_discount(label: impl Into<String>, percent: Decimal) -> Self {
        Self::AddDiscount {
            label: label.into(),
            discount: IssuedDiscountKind::Percentage { percent },
        }
    }

    pub fn fixed_discount(label: impl Into<String>, amount: Decimal) -> Self {
        Self::AddDiscount { label: label.into(), discount: IssuedDiscountKind::Fixed { amount } }
    }

    pub fn recommend(product_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AddRecommendation { product_id: ProductId::new(product_id), reason: reason.into() }
    }

    pub fn update_cart(product_id: impl Into<String>, quantity: u32) -> Self {
        Self::UpdateCart { product_id: ProductId::new(product_id), quantity }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::SetVariable { .. } => "SET_VARIABLE",
            Self::AddDiscount { .. } => "ADD_DISCOUNT",
            Self::AddRecommendation { .. } => "ADD_RECOMMENDATION",
            Self::UpdateCart { .. } => "UPDATE_CART",
        }
    }

    /// Variable written by this action, if any.
    pub fn target_variable(&self) -> Option<&str> {
        match self {
            Self::SetVariable { variable, .. } => Some(variable),
            _ => None,
        }
    }

    pub fn execute(
        &self,
        rule_id: &RuleId,
        context: &mut ShoppingContext<'_>,
    ) -> Result<(), RuleActionError> {
        match self {
            Self::SetVariable { variable, value } => {
                context.set_variable(variable.clone(), value.clone());
            }
            Self::AddDiscount { label, discount } => {
                validate_discount(label, discount)?;
                context.issued_discounts.push(IssuedDiscount {
                    rule_id: rule_id.0.clone(),
                    label: label.clone(),
                    kind: discount.clone(),
                });
            }
            Self::AddRecommendation { product_id, reason } => {
                if find_product(context.inventory, product_id).is_none() {
                    return Err(RuleActionError::UnknownProduct(product_id.clone()));
                }
                context.recommendations.push(IssuedRecommendation {
                    rule_id: rule_id.0.clone(),
                    product_id: product_id.clone(),
                    reason: reason.clone(),
                });
            }
            Self::UpdateCart { product_id, quantity } => {
                if !context.has_product(product_id) {
                    return Err(RuleActionError::ProductNotInCart(product_id.clone()));
                }
                context.cart_updates.push(CartUpdateRequest {
                    rule_id: rule_id.0.clone(),
                    product_id: product_id.clone(),
                    quantity: *quantity,
                });
            }
        }
        Ok(())
    }
}

fn validate_discount(label: &str, discount: &IssuedDiscountKind) -> Result<(), RuleActionError> {
    let invalid = |reason: &str| RuleActionError::InvalidDiscount {
        label: label.to_string(),
        reason: reason.to_string(),
    };
    match discount {
        IssuedDiscountKind::Percentage { percent } => {
            if percent.is_sign_negative() || *percent > Decimal::ONE_HUNDRED {
                return Err(invalid("percentage must be within 0..=100"));
            }
        }
        IssuedDiscountKind::Fixed { amount } => {
            if amount.is_sign_negative() {
                return Err(invalid("amount must not be negative"));
            }
        }
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    pub rule_type: String,
    /// Higher fires first.
    pub priority: i32,
    pub condition: Option<RuleCondition>,
    pub action: Option<RuleAction>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub usage_limit: Option<u32>,
    pub usage_count: u32,
    pub metadata: BTreeMap<String, String>,
}

impl Rule {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: RuleId::new(id),
            name: name.into(),
            rule_type: DEFAULT_RULE_TYPE.to_string(),
            priority: 0,
            condition: None,
            action: None,
            active: true,
            created_at: Utc::now(),
            valid_from: None,
            valid_until: None,
            usage_limit: None,
            usage_count: 0,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_type(mut self, rule_type: impl Into<String>) -> Self {
        self.rule_type = rule_type.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_condition(mut self, condition: impl Into<RuleCondition>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_source_condition(mut self, source: impl Into<String>) -> Self {
        self.condition = Some(RuleCondition::Source(source.into()));
        self
    }

    pub fn with_action(mut self, action: RuleAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_validity(
        mut self,
        valid_from: Option<DateTime<Utc>>,
        valid_until: Option<DateTime<Utc>>,
    ) -> Self {
        self.valid_from = valid_from;
        self.valid_until = valid_until;
        self
    }

    pub fn with_usage_limit(mut self, limit: u32) -> Self {
        self.usage_limit = Some(limit);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Active, inside its validity window and under its usage limit.
    pub fn is_available_at(&self, at: DateTime<Utc>) -> bool {
        self.active
            && self.valid_from.map_or(true, |from| at >= from)
            && self.valid_until.map_or(true, |until| at <= until)
            && self.usage_limit.map_or(true, |limit| self.usage_count < limit)
    }

    /// Number of terminal conditions; zero when unconditional.
    pub fn complexity(&self) -> usize {
        self.condition.as_ref().map_or(0, RuleCondition::terminal_count)
    }
}
