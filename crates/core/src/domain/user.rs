use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::product::ProductId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowsingEntry {
    pub product_id: ProductId,
    pub category: String,
    pub viewed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseEntry {
    pub order_id: String,
    pub product_id: ProductId,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub price: Decimal,
    pub purchased_at: DateTime<Utc>,
}

/// User snapshot consumed by rule evaluation.
///
/// Serialized field names are camelCase because attribute rules address them
/// by dotted path (`user.isStudent`, `user.purchaseHistory.length`, ...).
/// Free-form attributes are flattened into the same namespace.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub is_student: bool,
    #[serde(default)]
    pub browsing_history: Vec<BrowsingEntry>,
    #[serde(default)]
    pub purchase_history: Vec<PurchaseEntry>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl UserProfile {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
            name: name.into(),
            is_student: false,
            browsing_history: Vec::new(),
            purchase_history: Vec::new(),
            attributes: Map::new(),
        }
    }

    pub fn student(mut self) -> Self {
        self.is_student = true;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_purchase(mut self, entry: PurchaseEntry) -> Self {
        self.purchase_history.push(entry);
        self
    }

    pub fn with_browsing(mut self, entry: BrowsingEntry) -> Self {
        self.browsing_history.push(entry);
        self
    }

    /// JSON projection used for attribute-path lookups.
    pub fn attribute_view(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Resolves a dotted path against a JSON value. Any missing segment yields `None`.
/// Arrays accept numeric indices and `length`; strings accept `length`.
pub fn lookup_path(root: &Value, path: &str) -> Option<Value> {
    let mut current = root;
    let mut segments = path.split('.').filter(|segment| !segment.is_empty()).peekable();

    while let Some(segment) = segments.next() {
        let is_last = segments.peek().is_none();
        match current {
            Value::Object(map) => current = map.get(segment)?,
            Value::Array(items) => {
                if segment == "length" && is_last {
                    return Some(Value::from(items.len()));
                }
                let index = segment.parse::<usize>().ok()?;
                current = items.get(index)?;
            }
            Value::String(text) if segment == "length" && is_last => {
                return Some(Value::from(text.chars().count()));
            }
            _ => return None,
        }
    }

    Some(current.clone())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use serde_json::{json, Value};

    use super::{lookup_path, PurchaseEntry, UserProfile};
    use crate::domain::product::ProductId;

    #[test]
    fn attribute_view_exposes_camel_case_fields_and_flattened_attributes() {
        let user = UserProfile::new("u-1", "John Student")
            .student()
            .with_attribute("membership", json!({ "tier": "gold", "years": 3 }));
        let view = user.attribute_view();

        assert_eq!(lookup_path(&view, "isStudent"), Some(Value::Bool(true)));
        assert_eq!(lookup_path(&view, "membership.tier"), Some(json!("gold")));
        assert_eq!(lookup_path(&view, "membership.years"), Some(json!(3)));
    }

    #[test]
    fn missing_segments_resolve_to_none() {
        let view = UserProfile::new("u-1", "Jane").attribute_view();

        assert_eq!(lookup_path(&view, "membership.tier"), None);
        assert_eq!(lookup_path(&view, "name.first"), None);
    }

    #[test]
    fn arrays_support_length_and_index_segments() {
        let user = UserProfile::new("u-2", "Bob").with_purchase(PurchaseEntry {
            order_id: "ORD-1".to_string(),
            product_id: ProductId::new("p-1"),
            name: "Earbuds".to_string(),
            category: "Electronics".to_string(),
            tags: vec!["audio".to_string()],
            price: Decimal::new(19_999, 2),
            purchased_at: Utc::now(),
        });
        let view = user.attribute_view();

        assert_eq!(lookup_path(&view, "purchaseHistory.length"), Some(json!(1)));
        assert_eq!(lookup_path(&view, "purchaseHistory.0.category"), Some(json!("Electronics")));
        assert_eq!(lookup_path(&view, "name.length"), Some(json!(3)));
    }
}
