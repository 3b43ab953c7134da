//! Checkout totals and cart analytics.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::CheckoutConfig;
use crate::discounts::money;
use crate::domain::cart::Cart;
use crate::domain::product::ProductId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSummary {
    pub subtotal: Decimal,
    pub coupon_discount: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
    pub free_shipping: bool,
}

impl PriceSummary {
    /// Prices the cart at its current (discounted) item prices.
    ///
    /// The coupon comes off before tax; shipping is judged on the discounted
    /// amount.
    pub fn for_cart(cart: &Cart, coupon_discount: Decimal, config: &CheckoutConfig) -> Self {
        let subtotal = cart.total();
        let coupon_discount = coupon_discount.max(Decimal::ZERO).min(subtotal);
        let taxable = subtotal - coupon_discount;
        let tax = money(taxable * config.tax_rate);
        let free_shipping = cart.is_empty() || taxable >= config.free_shipping_threshold;
        let shipping = if free_shipping { Decimal::ZERO } else { config.shipping_cost };
        Self {
            subtotal,
            coupon_discount,
            tax,
            shipping,
            total: money(taxable + tax + shipping),
            free_shipping,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBands {
    pub under_50: u32,
    pub under_200: u32,
    pub premium: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedItem {
    pub product_id: ProductId,
    pub name: String,
    pub price: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartAnalytics {
    /// Units per category.
    pub categories: BTreeMap<String, u32>,
    /// Units per price band.
    pub price_bands: PriceBands,
    pub average_unit_price: Decimal,
    pub cheapest: Option<PricedItem>,
    pub most_expensive: Option<PricedItem>,
}

impl CartAnalytics {
    pub fn for_cart(cart: &Cart) -> Self {
        let mut categories = BTreeMap::new();
        let mut price_bands = PriceBands::default();
        for item in &cart.items {
            let units = categories.entry(item.category.clone()).or_insert(0u32);
            *units = units.saturating_add(item.quantity);
            let band = if item.price < Decimal::new(50, 0) {
                &mut price_bands.under_50
            } else if item.price < Decimal::new(200, 0) {
                &mut price_bands.under_200
            } else {
                &mut price_bands.premium
            };
            *band = band.saturating_add(item.quantity);
        }

        let units = cart.item_count();
        let average_unit_price = if units == 0 {
            Decimal::ZERO
        } else {
            money(cart.total() / Decimal::from(units))
        };
        let priced = |item: &crate::domain::cart::CartItem| PricedItem {
            product_id: item.product_id.clone(),
            name: item.name.clone(),
            price: item.price,
        };

        Self {
            categories,
            price_bands,
            average_unit_price,
            cheapest: cart.items.iter().min_by(|a, b| a.price.cmp(&b.price)).map(priced),
            most_expensive: cart.items.iter().max_by(|a, b| a.price.cmp(&b.price)).map(priced),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{CartAnalytics, PriceSummary};
    use crate::config::AppConfig;
    use crate::domain::cart::{Cart, CartItem};
    use crate::domain::session::SessionId;
    use crate::domain::user::UserId;

    fn cart() -> Cart {
        let mut cart = Cart::new(UserId::new("u-1"), SessionId::new("S-1"));
        cart.add_item(CartItem::new("cable", "Cable", Decimal::new(10, 0), 3, "Accessories"));
        cart.add_item(CartItem::new("monitor", "Monitor", Decimal::new(250, 0), 1, "Electronics"));
        cart.add_item(CartItem::new("mouse", "Mouse", Decimal::new(60, 0), 1, "Electronics"));
        cart
    }

    #[test]
    fn summary_adds_tax_and_waives_shipping_over_threshold() {
        let summary = PriceSummary::for_cart(&cart(), Decimal::new(40, 0), &AppConfig::default().checkout);

        assert_eq!(summary.subtotal, Decimal::new(340, 0));
        assert_eq!(summary.tax, Decimal::new(2400, 2));
        assert!(summary.free_shipping);
        assert_eq!(summary.total, Decimal::new(324, 0));
    }

    #[test]
    fn small_orders_pay_shipping() {
        let mut cart = Cart::new(UserId::new("u-1"), SessionId::new("S-1"));
        cart.add_item(CartItem::new("pen", "Pen", Decimal::new(5, 0), 2, "Office"));

        let summary = PriceSummary::for_cart(&cart, Decimal::ZERO, &AppConfig::default().checkout);

        assert!(!summary.free_shipping);
        assert_eq!(summary.shipping, Decimal::new(999, 2));
        assert_eq!(summary.total, Decimal::new(2079, 2));
    }

    #[test]
    fn analytics_bucket_units() {
        let analytics = CartAnalytics::for_cart(&cart());

        assert_eq!(analytics.categories.get("Electronics"), Some(&2));
        assert_eq!(analytics.price_bands.under_50, 3);
        assert_eq!(analytics.price_bands.under_200, 1);
        assert_eq!(analytics.price_bands.premium, 1);
        assert_eq!(analytics.average_unit_price, Decimal::new(68, 0));
        assert_eq!(analytics.cheapest.map(|item| item.name), Some("Cable".to_string()));
        assert_eq!(analytics.most_expensive.map(|item| item.name), Some("Monitor".to_string()));
    }

    #[test]
    fn analytics_unit_counts_saturate() {
        let mut cart = Cart::new(UserId::new("u-1"), SessionId::new("S-1"));
        cart.add_item(CartItem::new("pen", "Pen", Decimal::ONE, 3_000_000_000, "Office"));
        cart.add_item(CartItem::new("pad", "Pad", Decimal::ONE, 3_000_000_000, "Office"));

        let analytics = CartAnalytics::for_cart(&cart);

        assert_eq!(analytics.categories.get("Office"), Some(&u32::MAX));
        assert_eq!(analytics.price_bands.under_50, u32::MAX);
    }
}
