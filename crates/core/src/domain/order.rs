use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::cart::CartItemView;
use crate::domain::session::SessionId;
use crate::domain::user::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn generate(now: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("ORD-{}-{}", now.timestamp_millis(), &suffix[..9]))
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingInfo {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
}

#[derive(Clone, Debug)]
pub struct PaymentInfo {
    pub card_number: SecretString,
}

impl PaymentInfo {
    pub fn card(number: impl Into<String>) -> Self {
        Self { card_number: SecretString::from(number.into()) }
    }

    pub fn last_four(&self) -> String {
        let digits: Vec<char> =
            self.card_number.expose_secret().chars().filter(char::is_ascii_digit).collect();
        let start = digits.len().saturating_sub(4);
        digits[start..].iter().collect()
    }
}

#[derive(Clone, Debug)]
pub struct CheckoutDetails {
    pub billing: BillingInfo,
    pub payment: PaymentInfo,
}

impl CheckoutDetails {
    /// Names of the required fields that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.billing.name.trim().is_empty() {
            missing.push("billing.name");
        }
        if self.billing.email.trim().is_empty() {
            missing.push("billing.email");
        }
        if self.payment.card_number.expose_secret().trim().is_empty() {
            missing.push("payment.card_number");
        }
        missing
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Confirmed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub session_id: SessionId,
    pub items: Vec<CartItemView>,
    pub billing: BillingInfo,
    pub payment_method: String,
    pub card_last_four: String,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::{BillingInfo, CheckoutDetails, PaymentInfo};

    #[test]
    fn missing_fields_lists_every_blank_requirement() {
        let details = CheckoutDetails {
            billing: BillingInfo { name: " ".to_string(), ..BillingInfo::default() },
            payment: PaymentInfo::card(""),
        };

        assert_eq!(
            details.missing_fields(),
            vec!["billing.name", "billing.email", "payment.card_number"]
        );
    }

    #[test]
    fn card_number_is_redacted_from_debug_output() {
        let payment = PaymentInfo::card("4111 1111 1111 1234");
        let debug = format!("{payment:?}");

        assert!(!debug.contains("4111"));
        assert_eq!(payment.last_four(), "1234");
    }
}
