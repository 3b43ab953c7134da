use crate::domain::product::find_product;
use crate::evaluation::{
    CartEvaluator, Contribution, EvaluationInput, EvaluatorError, InventoryIssue, InventoryIssueKind,
};

/// Flags cart lines that the inventory cannot fulfil.
pub struct InventoryEvaluator;

impl CartEvaluator for InventoryEvaluator {
    fn name(&self) -> &'static str {
        "InventoryChecker"
    }

    fn priority(&self) -> u8 {
        8
    }

    fn evaluate(&self, input: &EvaluationInput<'_>) -> Result<Contribution, EvaluatorError> {
        let issues = input
            .cart
            .items
            .iter()
            .filter_map(|item| match find_product(input.inventory, &item.product_id) {
                None => Some(InventoryIssue {
                    kind: InventoryIssueKind::NotFound,
                    product_id: item.product_id.clone(),
                    requested: item.quantity,
                    available: None,
                    message: format!("Product {} not found in inventory", item.name),
                }),
                Some(product) if product.stock < item.quantity => Some(InventoryIssue {
                    kind: InventoryIssueKind::LowStock,
                    product_id: item.product_id.clone(),
                    requested: item.quantity,
                    available: Some(product.stock),
                    message: format!("Only {} units available for {}", product.stock, item.name),
                }),
                Some(_) => None,
            })
            .collect();

        Ok(Contribution::Inventory(issues))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::InventoryEvaluator;
    use crate::domain::cart::{Cart, CartItem};
    use crate::domain::product::Product;
    use crate::domain::session::SessionId;
    use crate::domain::user::{UserId, UserProfile};
    use crate::engine::RuleBase;
    use crate::evaluation::{CartEvaluator, Contribution, EvaluationInput, InventoryIssueKind};

    #[test]
    fn missing_and_short_stock_lines_are_reported() {
        let user = UserProfile::new("u-1", "Jane");
        let mut cart = Cart::new(UserId::new("u-1"), SessionId::new("S-1"));
        cart.add_item(CartItem::new("p-1", "Headphones", Decimal::new(80, 0), 3, "Audio"));
        cart.add_item(CartItem::new("p-9", "Discontinued", Decimal::new(5, 0), 1, "Misc"));
        cart.add_item(CartItem::new("p-2", "Cable", Decimal::new(10, 0), 2, "Accessories"));
        let inventory = vec![
            Product::new("p-1", "Headphones", Decimal::new(80, 0), 2, "Audio"),
            Product::new("p-2", "Cable", Decimal::new(10, 0), 2, "Accessories"),
        ];
        let rule_base = RuleBase::new();
        let input = EvaluationInput {
            user: &user,
            cart: &cart,
            inventory: &inventory,
            rule_base: &rule_base,
            now: Utc::now(),
        };

        let Contribution::Inventory(issues) = InventoryEvaluator.evaluate(&input).expect("checks run")
        else {
            panic!("expected inventory issues");
        };

        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].kind, InventoryIssueKind::LowStock);
        assert_eq!(issues[0].available, Some(2));
        assert_eq!(issues[0].message, "Only 2 units available for Headphones");
        assert_eq!(issues[1].kind, InventoryIssueKind::NotFound);
        assert_eq!(issues[1].message, "Product Discontinued not found in inventory");
    }
}
