use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::product::{same_category, ProductId};
use crate::domain::session::SessionId;
use crate::domain::user::UserId;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub name: String,
    pub original_price: Decimal,
    pub price: Decimal,
    pub quantity: u32,
    pub category: String,
    pub tags: Vec<String>,
    pub applied_discounts: Vec<String>,
}

impl CartItem {
    pub fn new(
        product_id: impl Into<String>,
        name: impl Into<String>,
        price: Decimal,
        quantity: u32,
        category: impl Into<String>,
    ) -> Self {
        let price = price.max(Decimal::ZERO);
        Self {
            product_id: ProductId::new(product_id),
            name: name.into(),
            original_price: price,
            price,
            quantity,
            category: category.into(),
            tags: Vec::new(),
            applied_discounts: Vec::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn line_subtotal(&self) -> Decimal {
        self.original_price * Decimal::from(self.quantity)
    }

    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }

    pub fn discount_amount(&self) -> Decimal {
        (self.original_price - self.price) * Decimal::from(self.quantity)
    }

    /// Sets the discounted unit price, clamped to `0..=original_price`.
    pub fn set_discounted_price(&mut self, unit_price: Decimal, labels: Vec<String>) {
        self.price = unit_price.max(Decimal::ZERO).min(self.original_price);
        self.applied_discounts = labels;
    }

    pub fn clear_discounts(&mut self) {
        self.price = self.original_price;
        self.applied_discounts.clear();
    }

    pub fn view(&self) -> CartItemView {
        CartItemView {
            product_id: self.product_id.clone(),
            name: self.name.clone(),
            original_price: self.original_price,
            price: self.price,
            quantity: self.quantity,
            category: self.category.clone(),
            tags: self.tags.clone(),
            total_price: self.line_total(),
            discount_amount: self.discount_amount(),
            applied_discounts: self.applied_discounts.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(user_id: UserId, session_id: SessionId) -> Self {
        let now = Utc::now();
        Self { user_id, session_id, items: Vec::new(), created_at: now, updated_at: now }
    }

    /// Adds an item, merging quantities when the product is already present.
    pub fn add_item(&mut self, item: CartItem) {
        match self.items.iter_mut().find(|existing| existing.product_id == item.product_id) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(item.quantity),
            None => self.items.push(item),
        }
        self.touch();
    }

    pub fn remove_item(&mut self, product_id: &ProductId) -> bool {
        let before = self.items.len();
        self.items.retain(|item| &item.product_id != product_id);
        self.touch();
        self.items.len() != before
    }

    /// Sets a line quantity; zero removes the line. Returns false for unknown products.
    pub fn update_quantity(&mut self, product_id: &ProductId, quantity: u32) -> bool {
        let Some(item) = self.items.iter_mut().find(|item| &item.product_id == product_id) else {
            return false;
        };

        if quantity == 0 {
            self.remove_item(product_id);
        } else {
            item.quantity = quantity;
            self.touch();
        }
        true
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.touch();
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, product_id: &ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| &item.product_id == product_id)
    }

    pub fn contains(&self, product_id: &ProductId) -> bool {
        self.item(product_id).is_some()
    }

    /// Sum of original prices; the base every discount is computed against.
    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(CartItem::line_subtotal).sum()
    }

    pub fn total(&self) -> Decimal {
        self.items.iter().map(CartItem::line_total).sum()
    }

    pub fn total_discount(&self) -> Decimal {
        self.subtotal() - self.total()
    }

    /// Total units across lines, saturating at `u32::MAX`.
    pub fn item_count(&self) -> u32 {
        self.items.iter().fold(0u32, |count, item| count.saturating_add(item.quantity))
    }

    /// Number of distinct lines in a category (not units).
    pub fn category_line_count(&self, category: &str) -> usize {
        self.items.iter().filter(|item| same_category(&item.category, category)).count()
    }

    pub fn clear_discounts(&mut self) {
        self.items.iter_mut().for_each(CartItem::clear_discounts);
    }

    pub fn view(&self) -> CartView {
        CartView {
            user_id: self.user_id.clone(),
            session_id: self.session_id.clone(),
            items: self.items.iter().map(CartItem::view).collect(),
            subtotal: self.subtotal(),
            total: self.total(),
            total_discount: self.total_discount(),
            item_count: self.item_count(),
            updated_at: self.updated_at,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartItemView {
    pub product_id: ProductId,
    pub name: String,
    pub original_price: Decimal,
    pub price: Decimal,
    pub quantity: u32,
    pub category: String,
    pub tags: Vec<String>,
    pub total_price: Decimal,
    pub discount_amount: Decimal,
    pub applied_discounts: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartView {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub items: Vec<CartItemView>,
    pub subtotal: Decimal,
    pub total: Decimal,
    pub total_discount: Decimal,
    pub item_count: u32,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{Cart, CartItem};
    use crate::domain::product::ProductId;
    use crate::domain::session::SessionId;
    use crate::domain::user::UserId;

    fn cart() -> Cart {
        Cart::new(UserId::new("u-1"), SessionId::new("SESSION-1"))
    }

    #[test]
    fn duplicate_adds_merge_quantities() {
        let mut cart = cart();
        cart.add_item(CartItem::new("p-1", "Earbuds", Decimal::new(5_000, 2), 1, "Electronics"));
        cart.add_item(CartItem::new("p-1", "Earbuds", Decimal::new(5_000, 2), 2, "Electronics"));

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.item_count(), 3);
        assert_eq!(cart.subtotal(), Decimal::new(15_000, 2));
    }

    #[test]
    fn unit_count_saturates_instead_of_overflowing() {
        let mut cart = cart();
        cart.add_item(CartItem::new("p-1", "Earbuds", Decimal::ONE, 3_000_000_000, "Electronics"));
        cart.add_item(CartItem::new("p-2", "Watch", Decimal::ONE, 3_000_000_000, "Electronics"));

        assert_eq!(cart.item_count(), u32::MAX);
        assert_eq!(cart.view().subtotal, Decimal::new(6_000_000_000, 0));
    }

    #[test]
    fn updating_quantity_to_zero_removes_line() {
        let mut cart = cart();
        cart.add_item(CartItem::new("p-1", "Earbuds", Decimal::new(5_000, 2), 1, "Electronics"));

        assert!(cart.update_quantity(&ProductId::new("p-1"), 0));
        assert!(cart.is_empty());
        assert!(!cart.update_quantity(&ProductId::new("p-1"), 3));
    }

    #[test]
    fn discounted_price_is_clamped_between_zero_and_original() {
        let mut item = CartItem::new("p-1", "Earbuds", Decimal::new(5_000, 2), 2, "Electronics");

        item.set_discounted_price(Decimal::new(-100, 0), vec!["Too Much".to_string()]);
        assert_eq!(item.price, Decimal::ZERO);

        item.set_discounted_price(Decimal::new(9_999, 2), Vec::new());
        assert_eq!(item.price, item.original_price);

        item.set_discounted_price(Decimal::new(4_000, 2), vec!["Sale".to_string()]);
        assert_eq!(item.discount_amount(), Decimal::new(2_000, 2));

        item.clear_discounts();
        assert_eq!(item.price, item.original_price);
        assert!(item.applied_discounts.is_empty());
    }

    #[test]
    fn category_count_counts_lines_case_insensitively() {
        let mut cart = cart();
        cart.add_item(CartItem::new("p-1", "Earbuds", Decimal::ONE, 4, "Electronics"));
        cart.add_item(CartItem::new("p-2", "Watch", Decimal::ONE, 1, "electronics"));
        cart.add_item(CartItem::new("p-3", "Shirt", Decimal::ONE, 1, "Clothing"));

        assert_eq!(cart.category_line_count("ELECTRONICS"), 2);
        assert_eq!(cart.view().item_count, 6);
    }
}
