use std::collections::{BTreeMap, HashSet};

use crate::config::RecommendationConfig;
use crate::domain::product::{same_category, Product, ProductId};
use crate::evaluation::{CartEvaluator, Contribution, EvaluationInput, EvaluatorError, Recommendation};

const STUDENT_BOOST: f64 = 0.1;
const POPULAR_FALLBACK_BELOW: usize = 5;

/// Categories that pair well with a purchased category.
fn complementary_categories(category: &str) -> &'static [&'static str] {
    match category.to_lowercase().as_str() {
        "smartphones" => &["accessories", "audio"],
        "computers" => &["accessories", "peripherals"],
        "gaming" => &["accessories", "audio"],
        "electronics" => &["accessories"],
        "audio" => &["accessories"],
        _ => &[],
    }
}

/// Scores inventory products against the user's history and current cart.
pub struct PersonalizationEvaluator {
    config: RecommendationConfig,
}

impl PersonalizationEvaluator {
    pub fn new(config: RecommendationConfig) -> Self {
        Self { config }
    }

    pub fn recommend(&self, input: &EvaluationInput<'_>) -> Vec<Recommendation> {
        let excluded: HashSet<&ProductId> = input
            .cart
            .items
            .iter()
            .map(|item| &item.product_id)
            .chain(input.user.purchase_history.iter().map(|entry| &entry.product_id))
            .collect();
        let candidates: Vec<&Product> = input
            .inventory
            .iter()
            .filter(|product| product.stock > 0 && !excluded.contains(&product.id))
            .collect();

        let mut picks = Vec::new();
        self.from_purchase_categories(input, &candidates, &mut picks);
        self.from_purchase_tags(input, &candidates, &mut picks);
        self.from_complementary(input, &candidates, &mut picks);
        self.from_browsing(input, &candidates, &mut picks);
        self.from_cart(input, &candidates, &mut picks);
        if picks.len() < POPULAR_FALLBACK_BELOW {
            self.from_popular(&candidates, &mut picks);
        }

        if input.user.is_student {
            for pick in &mut picks {
                pick.score += STUDENT_BOOST;
                pick.student_discount = true;
            }
        }

        picks.sort_by(|left, right| right.score.total_cmp(&left.score));
        let mut seen = HashSet::new();
        picks.retain(|pick| seen.insert(pick.product_id.clone()));
        picks.truncate(self.config.max_results);
        picks
    }

    fn from_purchase_categories(
        &self,
        input: &EvaluationInput<'_>,
        candidates: &[&Product],
        picks: &mut Vec<Recommendation>,
    ) {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for entry in &input.user.purchase_history {
            *counts.entry(entry.category.clone()).or_default() += 1;
        }
        for (category, count) in counts {
            let score = 0.95 + 0.05 * count as f64;
            let reason = format!("Based on your previous {category} purchases");
            picks.extend(
                candidates
                    .iter()
                    .filter(|product| same_category(&product.category, &category))
                    .take(4)
                    .map(|product| recommendation(product, score, reason.clone())),
            );
        }
    }

    fn from_purchase_tags(
        &self,
        input: &EvaluationInput<'_>,
        candidates: &[&Product],
        picks: &mut Vec<Recommendation>,
    ) {
        let mut tag_counts: BTreeMap<String, usize> = BTreeMap::new();
        for entry in &input.user.purchase_history {
            for tag in &entry.tags {
                *tag_counts.entry(tag.to_lowercase()).or_default() += 1;
            }
        }
        if tag_counts.is_empty() {
            return;
        }

        let mut matches: Vec<Recommendation> = candidates
            .iter()
            .filter_map(|product| {
                let matched: Vec<&str> = product
                    .tags
                    .iter()
                    .filter(|tag| tag_counts.contains_key(&tag.to_lowercase()))
                    .map(String::as_str)
                    .collect();
                if matched.is_empty() {
                    return None;
                }
                let weight: usize =
                    matched.iter().filter_map(|tag| tag_counts.get(&tag.to_lowercase())).sum();
                let score = 0.85 + weight as f64 / 10.0;
                let reason = format!("Similar to items you bought: {}", matched.join(", "));
                Some(recommendation(product, score, reason))
            })
            .collect();
        matches.sort_by(|left, right| right.score.total_cmp(&left.score));
        picks.extend(matches.into_iter().take(3));
    }

    fn from_complementary(
        &self,
        input: &EvaluationInput<'_>,
        candidates: &[&Product],
        picks: &mut Vec<Recommendation>,
    ) {
        let mut seen = HashSet::new();
        for entry in &input.user.purchase_history {
            if !seen.insert(entry.category.to_lowercase()) {
                continue;
            }
            let reason = format!("Perfect accessory for your {} purchase", entry.category);
            for complement in complementary_categories(&entry.category) {
                picks.extend(
                    candidates
                        .iter()
                        .filter(|product| same_category(&product.category, complement))
                        .take(2)
                        .map(|product| recommendation(product, 0.90, reason.clone())),
                );
            }
        }
    }

    fn from_browsing(
        &self,
        input: &EvaluationInput<'_>,
        candidates: &[&Product],
        picks: &mut Vec<Recommendation>,
    ) {
        let categories: Vec<&str> =
            input.user.browsing_history.iter().map(|entry| entry.category.as_str()).collect();
        if categories.is_empty() {
            return;
        }
        picks.extend(
            candidates
                .iter()
                .filter(|product| {
                    categories.iter().any(|category| same_category(&product.category, category))
                })
                .take(3)
                .map(|product| {
                    recommendation(product, 0.7, "Based on your browsing history".to_string())
                }),
        );
    }

    fn from_cart(
        &self,
        input: &EvaluationInput<'_>,
        candidates: &[&Product],
        picks: &mut Vec<Recommendation>,
    ) {
        if input.cart.is_empty() {
            return;
        }
        picks.extend(
            candidates
                .iter()
                .filter(|product| {
                    input.cart.items.iter().any(|item| same_category(&product.category, &item.category))
                })
                .take(3)
                .map(|product| {
                    recommendation(
                        product,
                        0.75,
                        "You might also like (from your cart category)".to_string(),
                    )
                }),
        );
    }

    fn from_popular(&self, candidates: &[&Product], picks: &mut Vec<Recommendation>) {
        let mut popular: Vec<(&Product, f64)> = candidates
            .iter()
            .filter_map(|product| product.rating.map(|rating| (*product, rating)))
            .filter(|(_, rating)| *rating >= self.config.popular_min_rating)
            .collect();
        popular.sort_by(|left, right| right.1.total_cmp(&left.1));
        picks.extend(popular.into_iter().take(3).map(|(product, rating)| {
            recommendation(product, 0.65, format!("Highly rated ({rating:.1}/5)"))
        }));
    }
}

fn recommendation(product: &Product, score: f64, reason: String) -> Recommendation {
    Recommendation {
        product_id: product.id.clone(),
        name: product.name.clone(),
        category: product.category.clone(),
        price: product.price,
        score,
        reason,
        student_discount: false,
    }
}

impl CartEvaluator for PersonalizationEvaluator {
    fn name(&self) -> &'static str {
        "PersonalizationEngine"
    }

    fn priority(&self) -> u8 {
        7
    }

    fn evaluate(&self, input: &EvaluationInput<'_>) -> Result<Contribution, EvaluatorError> {
        Ok(Contribution::Recommendations(self.recommend(input)))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::PersonalizationEvaluator;
    use crate::config::AppConfig;
    use crate::domain::cart::{Cart, CartItem};
    use crate::domain::product::{Product, ProductId};
    use crate::domain::session::SessionId;
    use crate::domain::user::{PurchaseEntry, UserId, UserProfile};
    use crate::engine::RuleBase;
    use crate::evaluation::{EvaluationInput, Recommendation};

    fn inventory() -> Vec<Product> {
        vec![
            Product::new("phone-1", "Phone One", Decimal::new(699, 0), 5, "Smartphones")
                .with_tags(["5g", "android"]),
            Product::new("phone-2", "Phone Two", Decimal::new(899, 0), 5, "Smartphones")
                .with_tags(["5g", "android"]),
            Product::new("case-1", "Phone Case", Decimal::new(19, 0), 50, "Accessories")
                .with_rating(4.2),
            Product::new("buds-1", "Earbuds", Decimal::new(129, 0), 10, "Audio").with_rating(4.8),
            Product::new("lamp-1", "Desk Lamp", Decimal::new(39, 0), 0, "Home").with_rating(4.9),
            Product::new("book-1", "Novel", Decimal::new(15, 0), 20, "Books").with_rating(3.1),
        ]
    }

    fn purchase(product_id: &str, category: &str, tags: &[&str]) -> PurchaseEntry {
        PurchaseEntry {
            order_id: "ORD-1".to_string(),
            product_id: ProductId::new(product_id),
            name: product_id.to_string(),
            category: category.to_string(),
            tags: tags.iter().map(|tag| tag.to_string()).collect(),
            price: Decimal::new(699, 0),
            purchased_at: Utc::now(),
        }
    }

    fn recommend(user: &UserProfile, cart: &Cart) -> Vec<Recommendation> {
        let inventory = inventory();
        let rule_base = RuleBase::new();
        let input =
            EvaluationInput { user, cart, inventory: &inventory, rule_base: &rule_base, now: Utc::now() };
        PersonalizationEvaluator::new(AppConfig::default().recommendations).recommend(&input)
    }

    #[test]
    fn history_drives_ranking_and_purchases_are_excluded() {
        let user = UserProfile::new("u-1", "Jane").with_purchase(purchase(
            "phone-1",
            "Smartphones",
            &["5g", "android"],
        ));
        let cart = Cart::new(UserId::new("u-1"), SessionId::new("S-1"));

        let picks = recommend(&user, &cart);
        let ids: Vec<&str> = picks.iter().map(|pick| pick.product_id.as_str()).collect();

        assert_eq!(ids[0], "phone-2");
        assert!((picks[0].score - 1.05).abs() < 1e-9);
        assert!(!ids.contains(&"phone-1"));
        assert!(ids.contains(&"case-1"));
        assert!(ids.contains(&"buds-1"));
        assert!(!ids.contains(&"lamp-1"), "out of stock products are skipped");
    }

    #[test]
    fn students_get_boosted_scores() {
        let user = UserProfile::new("u-1", "John Student").student();
        let mut cart = Cart::new(UserId::new("u-1"), SessionId::new("S-1"));
        cart.add_item(CartItem::new("book-1", "Novel", Decimal::new(15, 0), 1, "Books"));

        let picks = recommend(&user, &cart);

        assert!(!picks.is_empty());
        assert!(picks.iter().all(|pick| pick.student_discount));
        assert!(picks.iter().all(|pick| pick.product_id.as_str() != "book-1"));
        let buds = picks.iter().find(|pick| pick.product_id.as_str() == "buds-1").expect("popular pick");
        assert!((buds.score - 0.75).abs() < 1e-9);
        assert_eq!(buds.reason, "Highly rated (4.8/5)");
    }

    #[test]
    fn results_are_capped() {
        let user = UserProfile::new("u-1", "Jane");
        let cart = Cart::new(UserId::new("u-1"), SessionId::new("S-1"));
        let inventory = inventory();
        let rule_base = RuleBase::new();
        let input = EvaluationInput {
            user: &user,
            cart: &cart,
            inventory: &inventory,
            rule_base: &rule_base,
            now: Utc::now(),
        };
        let mut config = AppConfig::default().recommendations;
        config.max_results = 1;

        let picks = PersonalizationEvaluator::new(config).recommend(&input);

        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].product_id.as_str(), "buds-1");
    }
}
