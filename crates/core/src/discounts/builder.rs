use rust_decimal::Decimal;

use crate::discounts::{
    BundleDiscount, CategoryDiscount, CompositeDiscount, CompositeStrategy, DiscountComponent,
    FixedAmountDiscount, PercentageDiscount,
};
use crate::rules::RuleCondition;

/// Fluent construction of discount trees.
///
/// `composite` opens a node (nested inside the currently open one, if any) and
/// `end` closes it. Leaves go into the innermost open composite; a leaf added
/// with nothing open becomes the root. Each builder produces one tree, and
/// `build` closes anything still open.
#[derive(Debug, Default)]
pub struct DiscountBuilder {
    open: Vec<CompositeDiscount>,
    root: Option<DiscountComponent>,
}

impl DiscountBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn composite(mut self, name: impl Into<String>, strategy: CompositeStrategy) -> Self {
        self.open.push(CompositeDiscount::new(name, strategy));
        self
    }

    pub fn end(mut self) -> Self {
        if let Some(finished) = self.open.pop() {
            self.attach(finished.into());
        }
        self
    }

    pub fn percentage(
        self,
        name: impl Into<String>,
        percentage: Decimal,
        condition: Option<RuleCondition>,
    ) -> Self {
        self.leaf(PercentageDiscount::new(name, percentage, condition).into())
    }

    pub fn fixed_amount(
        self,
        name: impl Into<String>,
        amount: Decimal,
        condition: Option<RuleCondition>,
    ) -> Self {
        self.leaf(FixedAmountDiscount::new(name, amount, condition).into())
    }

    pub fn bundle(
        self,
        name: impl Into<String>,
        buy_quantity: u32,
        get_quantity: u32,
        category: Option<&str>,
    ) -> Self {
        self.leaf(
            BundleDiscount::new(name, buy_quantity, get_quantity, category.map(str::to_string))
                .into(),
        )
    }

    pub fn category(
        self,
        name: impl Into<String>,
        category: impl Into<String>,
        percentage: Decimal,
        condition: Option<RuleCondition>,
    ) -> Self {
        self.leaf(CategoryDiscount::new(name, category, percentage, condition).into())
    }

    pub fn build(mut self) -> Option<DiscountComponent> {
        while !self.open.is_empty() {
            self = self.end();
        }
        self.root
    }

    fn leaf(mut self, component: DiscountComponent) -> Self {
        match self.open.last_mut() {
            Some(current) => {
                current.add(component);
            }
            None => self.root = Some(component),
        }
        self
    }

    fn attach(&mut self, component: DiscountComponent) {
        match self.open.last_mut() {
            Some(parent) => {
                parent.add(component);
            }
            None => self.root = Some(component),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::DiscountBuilder;
    use crate::discounts::{CompositeStrategy, DiscountComponent, DiscountRule};

    #[test]
    fn bare_leaf_becomes_root() {
        let tree = DiscountBuilder::new()
            .percentage("Flat", Decimal::new(5, 0), None)
            .build()
            .expect("leaf tree");

        assert!(matches!(tree, DiscountComponent::Percentage(_)));
    }

    #[test]
    fn nested_composites_attach_to_their_parent() {
        let tree = DiscountBuilder::new()
            .composite("Outer", CompositeStrategy::Max)
            .fixed_amount("Ten", Decimal::new(10, 0), None)
            .composite("Inner", CompositeStrategy::Sum)
            .percentage("Five", Decimal::new(5, 0), None)
            .bundle("B2G1", 2, 1, Some("Electronics"))
            .end()
            .category("Books", "Books", Decimal::new(10, 0), None)
            .build()
            .expect("nested tree");

        let DiscountComponent::Composite(outer) = tree else {
            panic!("outer composite expected");
        };
        assert_eq!(outer.name(), "Outer");
        assert_eq!(outer.children().len(), 3);
        let Some(DiscountComponent::Composite(inner)) = outer.child(1) else {
            panic!("inner composite expected");
        };
        assert_eq!(inner.strategy, CompositeStrategy::Sum);
        assert_eq!(inner.children().len(), 2);
    }

    #[test]
    fn empty_builder_has_no_root() {
        assert!(DiscountBuilder::new().build().is_none());
    }
}
