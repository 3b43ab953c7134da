use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductId(pub String);

impl ProductId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read-only inventory record supplied to every evaluation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub stock: u32,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub rating: Option<f64>,
}

impl Product {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        price: Decimal,
        stock: u32,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: ProductId::new(id),
            name: name.into(),
            price,
            stock,
            category: category.into(),
            tags: Vec::new(),
            rating: None,
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

    pub fn with_rating(mut self, rating: f64) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn in_category(&self, category: &str) -> bool {
        same_category(&self.category, category)
    }
}

/// Categories arrive from several sources with inconsistent casing.
pub fn same_category(left: &str, right: &str) -> bool {
    left.trim().eq_ignore_ascii_case(right.trim())
}

pub fn find_product<'a>(inventory: &'a [Product], product_id: &ProductId) -> Option<&'a Product> {
    inventory.iter().find(|product| &product.id == product_id)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{find_product, same_category, Product, ProductId};

    #[test]
    fn category_comparison_ignores_case_and_padding() {
        assert!(same_category("Electronics", "electronics"));
        assert!(same_category(" books", "Books "));
        assert!(!same_category("books", "clothing"));
    }

    #[test]
    fn find_product_returns_matching_record() {
        let inventory = vec![
            Product::new("p-1", "Earbuds", Decimal::new(19_999, 2), 10, "Electronics"),
            Product::new("p-2", "T-Shirt", Decimal::new(2_999, 2), 50, "Clothing"),
        ];

        let found = find_product(&inventory, &ProductId::new("p-2")).expect("p-2 exists");
        assert_eq!(found.name, "T-Shirt");
        assert!(find_product(&inventory, &ProductId::new("missing")).is_none());
    }
}
