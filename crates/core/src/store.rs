//! Append-only event log with derived read projections.
//!
//! Every change the assistant makes to shared state is recorded as a typed
//! [`StoreEvent`] with a monotonically increasing sequence number. The
//! projections are rebuilt incrementally as events are appended and can be
//! reproduced from scratch with [`AssistantStore::replay`].

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::cart::CartView;
use crate::domain::product::{same_category, Product, ProductId};
use crate::domain::session::{SessionId, SessionState};
use crate::domain::user::{UserId, UserProfile};
use crate::engine::{Rule, RuleId};
use crate::evaluation::Recommendation;
use crate::session::SessionInfo;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    UserRecorded { user: UserProfile },
    CartChanged { cart: CartView },
    SessionChanged { session: SessionInfo },
    ProductStocked { product: Product },
    StockAdjusted { product_id: ProductId, stock: u32 },
    RuleRegistered { rule: RuleSummary },
    RuleDeactivated { rule_id: RuleId },
    RecommendationsGenerated { user_id: UserId, recommendations: Vec<Recommendation> },
}

impl StoreEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UserRecorded { .. } => "user_recorded",
            Self::CartChanged { .. } => "cart_changed",
            Self::SessionChanged { .. } => "session_changed",
            Self::ProductStocked { .. } => "product_stocked",
            Self::StockAdjusted { .. } => "stock_adjusted",
            Self::RuleRegistered { .. } => "rule_registered",
            Self::RuleDeactivated { .. } => "rule_deactivated",
            Self::RecommendationsGenerated { .. } => "recommendations_generated",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
    pub event: StoreEvent,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSummary {
    pub id: RuleId,
    pub name: String,
    pub rule_type: String,
    pub priority: i32,
    pub active: bool,
}

impl From<&Rule> for RuleSummary {
    fn from(rule: &Rule) -> Self {
        Self {
            id: rule.id.clone(),
            name: rule.name.clone(),
            rule_type: rule.rule_type.clone(),
            priority: rule.priority,
            active: rule.active,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSet {
    pub recommendations: Vec<Recommendation>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatistics {
    pub events: usize,
    pub users: usize,
    pub carts: usize,
    pub sessions: usize,
    pub active_sessions: usize,
    pub products: usize,
    pub rules: usize,
    pub recommendation_sets: usize,
    pub events_by_kind: BTreeMap<String, usize>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub sessions_removed: usize,
    pub recommendations_removed: usize,
}

#[derive(Clone, Debug, Default)]
pub struct AssistantStore {
    log: Vec<StoredEvent>,
    users: BTreeMap<UserId, UserProfile>,
    carts: BTreeMap<UserId, CartView>,
    sessions: BTreeMap<SessionId, SessionInfo>,
    inventory: BTreeMap<ProductId, Product>,
    rules: BTreeMap<RuleId, RuleSummary>,
    recommendations: BTreeMap<UserId, RecommendationSet>,
}

impl AssistantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds every projection from a previously recorded log.
    pub fn replay(events: impl IntoIterator<Item = StoredEvent>) -> Self {
        let mut store = Self::new();
        for stored in events {
            store.project(&stored.event, stored.recorded_at);
            store.log.push(stored);
        }
        store
    }

    pub fn append(&mut self, event: StoreEvent, at: DateTime<Utc>) -> u64 {
        let sequence = self.log.last().map_or(1, |last| last.sequence + 1);
        debug!(
            event_name = "store.event_appended",
            sequence,
            kind = event.kind(),
            "store event appended"
        );
        self.project(&event, at);
        self.log.push(StoredEvent { sequence, recorded_at: at, event });
        sequence
    }

    fn project(&mut self, event: &StoreEvent, at: DateTime<Utc>) {
        match event {
            StoreEvent::UserRecorded { user } => {
                self.users.insert(user.id.clone(), user.clone());
            }
            StoreEvent::CartChanged { cart } => {
                self.carts.insert(cart.user_id.clone(), cart.clone());
            }
            StoreEvent::SessionChanged { session } => {
                self.carts.insert(session.user_id.clone(), session.cart.clone());
                self.sessions.insert(session.session_id.clone(), session.clone());
            }
            StoreEvent::ProductStocked { product } => {
                self.inventory.insert(product.id.clone(), product.clone());
            }
            StoreEvent::StockAdjusted { product_id, stock } => {
                if let Some(product) = self.inventory.get_mut(product_id) {
                    product.stock = *stock;
                }
            }
            StoreEvent::RuleRegistered { rule } => {
                self.rules.insert(rule.id.clone(), rule.clone());
            }
            StoreEvent::RuleDeactivated { rule_id } => {
                if let Some(rule) = self.rules.get_mut(rule_id) {
                    rule.active = false;
                }
            }
            StoreEvent::RecommendationsGenerated { user_id, recommendations } => {
                self.recommendations.insert(
                    user_id.clone(),
                    RecommendationSet { recommendations: recommendations.clone(), generated_at: at },
                );
            }
        }
    }

    pub fn events(&self) -> &[StoredEvent] {
        &self.log
    }

    pub fn events_since(&self, sequence: u64) -> &[StoredEvent] {
        let start = self.log.partition_point(|stored| stored.sequence <= sequence);
        &self.log[start..]
    }

    pub fn user(&self, user_id: &UserId) -> Option<&UserProfile> {
        self.users.get(user_id)
    }

    pub fn users(&self) -> impl Iterator<Item = &UserProfile> {
        self.users.values()
    }

    pub fn user_cart(&self, user_id: &UserId) -> Option<&CartView> {
        self.carts.get(user_id)
    }

    pub fn session(&self, session_id: &SessionId) -> Option<&SessionInfo> {
        self.sessions.get(session_id)
    }

    pub fn active_sessions(&self) -> Vec<&SessionInfo> {
        self.sessions.values().filter(|session| session.is_active).collect()
    }

    pub fn product(&self, product_id: &ProductId) -> Option<&Product> {
        self.inventory.get(product_id)
    }

    pub fn inventory(&self) -> Vec<Product> {
        self.inventory.values().cloned().collect()
    }

    /// Products with stock strictly below `threshold`.
    pub fn low_stock(&self, threshold: u32) -> Vec<&Product> {
        self.inventory.values().filter(|product| product.stock < threshold).collect()
    }

    pub fn products_by_category(&self, category: &str) -> Vec<&Product> {
        self.inventory.values().filter(|product| same_category(&product.category, category)).collect()
    }

    pub fn rule(&self, rule_id: &RuleId) -> Option<&RuleSummary> {
        self.rules.get(rule_id)
    }

    pub fn recommendations(&self, user_id: &UserId) -> Option<&RecommendationSet> {
        self.recommendations.get(user_id)
    }

    pub fn statistics(&self) -> StoreStatistics {
        let mut events_by_kind = BTreeMap::new();
        for stored in &self.log {
            *events_by_kind.entry(stored.event.kind().to_string()).or_insert(0) += 1;
        }
        StoreStatistics {
            events: self.log.len(),
            users: self.users.len(),
            carts: self.carts.len(),
            sessions: self.sessions.len(),
            active_sessions: self.sessions.values().filter(|session| session.is_active).count(),
            products: self.inventory.len(),
            rules: self.rules.len(),
            recommendation_sets: self.recommendations.len(),
            events_by_kind,
        }
    }

    /// Drops finished sessions and recommendation sets older than `max_age`.
    ///
    /// Only projections are pruned; the event log is kept intact.
    pub fn cleanup(&mut self, now: DateTime<Utc>, max_age: Duration) -> CleanupReport {
        let cutoff = now - max_age;
        let sessions_before = self.sessions.len();
        self.sessions.retain(|_, session| {
            !matches!(session.state, SessionState::Completed | SessionState::Abandoned)
                || session.last_activity >= cutoff
        });
        let recommendations_before = self.recommendations.len();
        self.recommendations.retain(|_, set| set.generated_at >= cutoff);

        CleanupReport {
            sessions_removed: sessions_before - self.sessions.len(),
            recommendations_removed: recommendations_before - self.recommendations.len(),
        }
    }
}
