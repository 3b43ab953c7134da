//! Seed catalog, demo users and starter rules.

use rust_decimal::Decimal;

use crate::domain::product::Product;
use crate::domain::user::UserProfile;
use crate::engine::{Rule, RuleAction};

fn product(id: &str, name: &str, cents: i64, stock: u32, category: &str) -> Product {
    Product::new(id, name, Decimal::new(cents, 2), stock, category)
}

pub fn seed_catalog() -> Vec<Product> {
    vec![
        product("laptop-pro-14", "Laptop Pro 14", 129_999, 12, "Electronics")
            .with_tags(["laptop", "portable", "work"])
            .with_rating(4.7),
        product("tablet-air", "Tablet Air", 49_999, 20, "Electronics")
            .with_tags(["tablet", "portable"])
            .with_rating(4.5),
        product("usb-c-hub", "USB-C Hub", 3_999, 80, "Electronics")
            .with_tags(["usb", "work"])
            .with_rating(4.1),
        product("phone-x", "Phone X", 79_999, 15, "Smartphones")
            .with_tags(["5g", "camera"])
            .with_rating(4.6),
        product("phone-lite", "Phone Lite", 29_999, 25, "Smartphones")
            .with_tags(["5g", "budget"])
            .with_rating(4.0),
        product("phone-case", "Rugged Phone Case", 2_499, 120, "Accessories")
            .with_tags(["protection"])
            .with_rating(4.3),
        product("laptop-sleeve", "Laptop Sleeve", 3_499, 60, "Accessories")
            .with_tags(["laptop", "protection"])
            .with_rating(4.2),
        product("wireless-buds", "Wireless Earbuds", 12_999, 8, "Audio")
            .with_tags(["wireless", "portable"])
            .with_rating(4.8),
        product("studio-headphones", "Studio Headphones", 19_999, 5, "Audio")
            .with_tags(["wired", "studio"])
            .with_rating(4.4),
        product("coffee-maker", "Coffee Maker", 8_999, 30, "Home & Garden")
            .with_tags(["kitchen"])
            .with_rating(3.9),
        product("rust-book", "The Rust Programming Language", 3_995, 40, "Books")
            .with_tags(["programming", "rust"])
            .with_rating(4.9),
        product("algorithms-book", "Algorithms Illustrated", 2_995, 4, "Books")
            .with_tags(["programming"])
            .with_rating(4.5),
    ]
}

pub fn seed_users() -> Vec<UserProfile> {
    vec![
        UserProfile::new("user-student", "John Student").student(),
        UserProfile::new("user-regular", "Jane Shopper"),
    ]
}

/// Starter rules. Conditions are kept as text so they go through the parser.
pub fn starter_rules() -> Vec<Rule> {
    vec![
        Rule::new("student-segment", "Tag students")
            .with_type("SEGMENTATION")
            .with_priority(20)
            .with_source_condition("user.isStudent === true")
            .with_action(RuleAction::set_variable("segment", "student")),
        Rule::new("student-audio-pick", "Recommend earbuds to students")
            .with_type("RECOMMENDATION")
            .with_priority(10)
            .with_source_condition("var.segment === student")
            .with_action(RuleAction::recommend("wireless-buds", "Popular with students")),
        Rule::new("big-spender", "Loyalty discount on large carts")
            .with_type("DISCOUNT")
            .with_priority(5)
            .with_source_condition("cart.total >= 1000")
            .with_action(RuleAction::percentage_discount("Loyalty", Decimal::new(5, 0))),
    ]
}
