use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::cart::Cart;
use crate::domain::product::{Product, ProductId};
use crate::domain::user::{lookup_path, UserProfile};

/// Discount issued by a fired rule. Informational: it is reported in the
/// evaluation result but never written back to item prices.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IssuedDiscount {
    pub rule_id: String,
    pub label: String,
    pub kind: IssuedDiscountKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IssuedDiscountKind {
    Percentage { percent: Decimal },
    Fixed { amount: Decimal },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IssuedRecommendation {
    pub rule_id: String,
    pub product_id: ProductId,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartUpdateRequest {
    pub rule_id: String,
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Per-evaluation view over a user, their cart and the inventory.
///
/// Borrowed data is read-only; the owned vectors collect the effects of rule
/// actions fired during one inference pass.
#[derive(Clone, Debug)]
pub struct ShoppingContext<'a> {
    pub user: &'a UserProfile,
    pub cart: &'a Cart,
    pub inventory: &'a [Product],
    pub timestamp: DateTime<Utc>,
    pub variables: BTreeMap<String, Value>,
    pub issued_discounts: Vec<IssuedDiscount>,
    pub recommendations: Vec<IssuedRecommendation>,
    pub cart_updates: Vec<CartUpdateRequest>,
    user_view: Value,
}

impl<'a> ShoppingContext<'a> {
    pub fn new(
        user: &'a UserProfile,
        cart: &'a Cart,
        inventory: &'a [Product],
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user,
            cart,
            inventory,
            timestamp,
            variables: BTreeMap::new(),
            issued_discounts: Vec::new(),
            recommendations: Vec::new(),
            cart_updates: Vec::new(),
            user_view: user.attribute_view(),
        }
    }

    pub fn set_variable(&mut self, key: impl Into<String>, value: Value) {
        self.variables.insert(key.into(), value);
    }

    pub fn variable(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    pub fn user_attribute(&self, path: &str) -> Option<Value> {
        lookup_path(&self.user_view, path)
    }

    /// Cart value at original prices, so rule outcomes do not shift once
    /// discounts have been written back to the items.
    pub fn cart_total(&self) -> Decimal {
        self.cart.subtotal()
    }

    pub fn cart_item_count(&self) -> u32 {
        self.cart.item_count()
    }

    pub fn category_count(&self, category: &str) -> usize {
        self.cart.category_line_count(category)
    }

    pub fn has_product(&self, product_id: &ProductId) -> bool {
        self.cart.contains(product_id)
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            variables: self.variables.clone(),
            issued_discounts: self.issued_discounts.len(),
            recommendations: self.recommendations.len(),
            cart_updates: self.cart_updates.len(),
        }
    }
}

/// Mutable part of a context captured before and after a rule fires.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub variables: BTreeMap<String, Value>,
    pub issued_discounts: usize,
    pub recommendations: usize,
    pub cart_updates: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotChange {
    pub variable: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

impl ContextSnapshot {
    /// Variable-level differences between two snapshots, ordered by name.
    pub fn changes_to(&self, after: &ContextSnapshot) -> Vec<SnapshotChange> {
        let mut changes = Vec::new();

        let mut names: Vec<&String> = self.variables.keys().chain(after.variables.keys()).collect();
        names.sort();
        names.dedup();
        for name in names {
            let before = self.variables.get(name);
            let later = after.variables.get(name);
            if before != later {
                changes.push(SnapshotChange {
                    variable: name.clone(),
                    before: before.cloned(),
                    after: later.cloned(),
                });
            }
        }

        let counters = [
            ("issued_discounts", self.issued_discounts, after.issued_discounts),
            ("recommendations", self.recommendations, after.recommendations),
            ("cart_updates", self.cart_updates, after.cart_updates),
        ];
        for (name, before, later) in counters {
            if before != later {
                changes.push(SnapshotChange {
                    variable: name.to_string(),
                    before: Some(Value::from(before)),
                    after: Some(Value::from(later)),
                });
            }
        }

        changes
    }
}
