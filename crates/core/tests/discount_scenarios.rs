use cartwise_core::discounts::{
    BundleDiscount, CategoryDiscount, CompositeDiscount, CompositeStrategy, DiscountBuilder,
    DiscountComponent, DiscountRule, FixedAmountDiscount, PercentageDiscount,
};
use cartwise_core::rules::{ComparisonOperator, RuleCondition, RuleExpression};
use cartwise_core::{Cart, CartItem, SessionId, ShoppingContext, UserId, UserProfile};
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;

fn cart(lines: &[(&str, i64, u32, &str)]) -> Cart {
    let mut cart = Cart::new(UserId::new("u-1"), SessionId::new("S-1"));
    for (id, price, quantity, category) in lines {
        cart.add_item(CartItem::new(*id, *id, Decimal::new(*price, 0), *quantity, *category));
    }
    cart
}

fn apply(component: &DiscountComponent, user: &UserProfile, cart: &Cart) -> Decimal {
    let at = Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).single().expect("valid timestamp");
    let context = ShoppingContext::new(user, cart, &[], at);
    component.apply(cart, &context).expect("discount applies").amount
}

#[test]
fn student_and_high_value_sum_to_fifty() {
    let tree = DiscountBuilder::new()
        .composite("Student & Cart Combo", CompositeStrategy::Sum)
        .percentage(
            "Student Discount",
            Decimal::new(15, 0),
            Some(RuleCondition::Source("user.isStudent === true".to_string())),
        )
        .percentage(
            "High Value Cart",
            Decimal::new(10, 0),
            Some(RuleCondition::Expression(RuleExpression::min_total(Decimal::new(100, 0)))),
        )
        .build()
        .expect("tree built");
    let user = UserProfile::new("u-1", "John Student").student();

    let amount = apply(&tree, &user, &cart(&[("desk", 200, 1, "Furniture")]));

    assert_eq!(amount, Decimal::new(50, 0));
}

#[test]
fn bundle_frees_the_cheapest_electronics_unit() {
    let bundle: DiscountComponent =
        BundleDiscount::new("Buy 2 Get 1", 2, 1, Some("Electronics".to_string())).into();
    let cart = cart(&[
        ("cable", 30, 1, "Electronics"),
        ("mouse", 50, 1, "Electronics"),
        ("keyboard", 80, 1, "Electronics"),
    ]);

    assert_eq!(apply(&bundle, &UserProfile::new("u-1", "Jane"), &cart), Decimal::new(30, 0));
}

#[test]
fn multiply_compounds_in_registration_order() {
    let tree: DiscountComponent = CompositeDiscount::new("Stacked", CompositeStrategy::Multiply)
        .with_child(PercentageDiscount::new("First 10", Decimal::new(10, 0), None))
        .with_child(PercentageDiscount::new("Second 10", Decimal::new(10, 0), None))
        .into();

    let amount = apply(&tree, &UserProfile::new("u-1", "Jane"), &cart(&[("lamp", 100, 1, "Home")]));

    assert_eq!(amount, Decimal::new(19, 0));
}

#[test]
fn every_leaf_stays_within_the_subtotal() {
    let user = UserProfile::new("u-1", "John Student").student();
    let leaves: Vec<DiscountComponent> = vec![
        PercentageDiscount::new("Big", Decimal::new(150, 0), None).into(),
        FixedAmountDiscount::new("Flat", Decimal::new(500, 0), None).into(),
        BundleDiscount::new("Buy 1 Get 3", 1, 3, None).into(),
        CategoryDiscount::new("Books", "Books", Decimal::new(40, 0), None).into(),
        PercentageDiscount::new(
            "Students",
            Decimal::new(20, 0),
            Some(RuleCondition::Expression(RuleExpression::user(
                "isStudent",
                ComparisonOperator::Equal,
                true,
            ))),
        )
        .into(),
    ];
    let carts = [
        cart(&[("book", 12, 2, "Books")]),
        cart(&[("tv", 400, 1, "Electronics"), ("book", 15, 3, "Books")]),
        cart(&[]),
    ];

    for cart in &carts {
        let subtotal = cart.subtotal();
        for leaf in &leaves {
            let amount = apply(leaf, &user, cart);
            assert!(amount >= Decimal::ZERO, "{} went negative", leaf.name());
            assert!(amount <= subtotal, "{} exceeded subtotal {subtotal}: {amount}", leaf.name());
        }
        let sum: DiscountComponent = leaves
            .iter()
            .cloned()
            .fold(CompositeDiscount::new("All", CompositeStrategy::Sum), |composite, leaf| {
                composite.with_child(leaf)
            })
            .into();
        assert!(apply(&sum, &user, cart) <= subtotal);
    }
}
