//! Promotional coupon codes.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::discounts::money;
use crate::domain::cart::Cart;
use crate::domain::product::same_category;
use crate::domain::user::UserProfile;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CouponValue {
    Percentage { percent: Decimal },
    Fixed { amount: Decimal },
    CategoryPercentage { category: String, percent: Decimal },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CouponRequirement {
    StudentsOnly,
    MinimumPurchase { amount: Decimal },
    FirstPurchase,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    pub description: String,
    pub value: CouponValue,
    pub requirement: Option<CouponRequirement>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedCoupon {
    pub code: String,
    pub discount: Decimal,
    pub message: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CouponError {
    #[error("Invalid or ineligible coupon")]
    Invalid { code: String },
    #[error("This coupon is only available for students")]
    StudentsOnly,
    #[error("Minimum purchase of ${minimum} required")]
    MinimumNotMet { minimum: Decimal },
    #[error("This coupon is only valid on your first purchase")]
    NotFirstPurchase,
    #[error("Cart is empty. Add items before applying a coupon.")]
    EmptyCart,
}

/// Coupons every assistant recognises.
pub fn coupon_catalog() -> Vec<Coupon> {
    vec![
        Coupon {
            code: "STUDENT2024".to_string(),
            description: "15% off for students".to_string(),
            value: CouponValue::Percentage { percent: Decimal::new(15, 0) },
            requirement: Some(CouponRequirement::StudentsOnly),
        },
        Coupon {
            code: "NEWYEAR25".to_string(),
            description: "$25 off orders over $100".to_string(),
            value: CouponValue::Fixed { amount: Decimal::new(25, 0) },
            requirement: Some(CouponRequirement::MinimumPurchase { amount: Decimal::new(100, 0) }),
        },
        Coupon {
            code: "TECH20".to_string(),
            description: "20% off electronics".to_string(),
            value: CouponValue::CategoryPercentage {
                category: "Electronics".to_string(),
                percent: Decimal::new(20, 0),
            },
            requirement: None,
        },
        Coupon {
            code: "FIRSTBUY".to_string(),
            description: "$10 off your first purchase".to_string(),
            value: CouponValue::Fixed { amount: Decimal::new(10, 0) },
            requirement: Some(CouponRequirement::FirstPurchase),
        },
    ]
}

impl Coupon {
    /// Whether the user qualifies, ignoring cart contents.
    pub fn is_available_to(&self, user: &UserProfile) -> bool {
        match &self.requirement {
            Some(CouponRequirement::StudentsOnly) => user.is_student,
            Some(CouponRequirement::FirstPurchase) => user.purchase_history.is_empty(),
            Some(CouponRequirement::MinimumPurchase { .. }) | None => true,
        }
    }

    fn check(&self, user: &UserProfile, cart: &Cart) -> Result<(), CouponError> {
        match &self.requirement {
            Some(CouponRequirement::StudentsOnly) if !user.is_student => {
                Err(CouponError::StudentsOnly)
            }
            Some(CouponRequirement::FirstPurchase) if !user.purchase_history.is_empty() => {
                Err(CouponError::NotFirstPurchase)
            }
            Some(CouponRequirement::MinimumPurchase { amount }) if cart.total() < *amount => {
                Err(CouponError::MinimumNotMet { minimum: *amount })
            }
            _ => Ok(()),
        }
    }

    /// Discount against current item prices, never more than the cart total.
    pub fn discount_for(&self, cart: &Cart) -> Decimal {
        let total = cart.total();
        let amount = match &self.value {
            CouponValue::Percentage { percent } => total * percent / HUNDRED,
            CouponValue::Fixed { amount } => *amount,
            CouponValue::CategoryPercentage { category, percent } => {
                let category_total: Decimal = cart
                    .items
                    .iter()
                    .filter(|item| same_category(&item.category, category))
                    .map(|item| item.line_total())
                    .sum();
                category_total * percent / HUNDRED
            }
        };
        money(amount.max(Decimal::ZERO).min(total))
    }
}

pub fn find_coupon(code: &str) -> Option<Coupon> {
    let code = code.trim().to_ascii_uppercase();
    coupon_catalog().into_iter().find(|coupon| coupon.code == code)
}

pub fn available_coupons(user: &UserProfile) -> Vec<Coupon> {
    coupon_catalog().into_iter().filter(|coupon| coupon.is_available_to(user)).collect()
}

/// Validates `code` for this user and cart and prices it.
pub fn apply_coupon(
    code: &str,
    user: &UserProfile,
    cart: &Cart,
) -> Result<AppliedCoupon, CouponError> {
    if cart.is_empty() {
        return Err(CouponError::EmptyCart);
    }
    let coupon =
        find_coupon(code).ok_or_else(|| CouponError::Invalid { code: code.to_string() })?;
    coupon.check(user, cart)?;

    let discount = coupon.discount_for(cart);
    if discount <= Decimal::ZERO {
        return Err(CouponError::Invalid { code: coupon.code });
    }
    Ok(AppliedCoupon {
        message: format!("Coupon {} applied! You saved ${:.2}", coupon.code, discount),
        code: coupon.code,
        discount,
    })
}
