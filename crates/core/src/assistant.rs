//! Shopping assistant service.
//!
//! Owns the rule base, discount catalog, session registry, event store and the
//! evaluation pipeline. It is an ordinary value: construct one per process (or
//! per test) and share it behind an `Arc`.

use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::audit::{record_session_outcome, AuditContext, AuditSink};
use crate::config::AppConfig;
use crate::coupons::{self, AppliedCoupon, Coupon};
use crate::discounts::{apply_adjustments, default_discount_trees, DiscountComponent};
use crate::domain::cart::{Cart, CartItem, CartView};
use crate::domain::order::CheckoutDetails;
use crate::domain::product::{Product, ProductId};
use crate::domain::session::SessionId;
use crate::domain::user::{UserId, UserProfile};
use crate::engine::{Rule, RuleBase, RuleBaseStatistics, RuleId};
use crate::errors::ApplicationError;
use crate::evaluation::{
    CartEvaluation, EvaluationInput, EvaluationPipeline, PersonalizationEvaluator, Recommendation,
};
use crate::fixtures;
use crate::pricing::{CartAnalytics, PriceSummary};
use crate::session::{
    OrderSink, SessionFault, SessionInfo, SessionManager, SessionOperationKind, SessionOutcome,
    SessionStatistics, ShoppingSession,
};
use crate::store::{AssistantStore, RuleSummary, StoreEvent, StoreStatistics};

const ACTOR: &str = "shopping-assistant";

/// Session outcome plus the cart as it stands afterwards.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CartResponse {
    pub outcome: SessionOutcome,
    pub cart: CartView,
    /// Present when the operation changed the cart and it was re-evaluated.
    pub evaluation: Option<CartEvaluation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CouponResponse {
    pub success: bool,
    pub message: String,
    pub coupon: Option<AppliedCoupon>,
    pub summary: PriceSummary,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssistantStatistics {
    pub sessions: SessionStatistics,
    pub rules: RuleBaseStatistics,
    pub store: StoreStatistics,
}

pub struct ShoppingAssistant {
    config: AppConfig,
    rule_base: RwLock<RuleBase>,
    discount_trees: Vec<DiscountComponent>,
    pipeline: EvaluationPipeline,
    sessions: Arc<SessionManager>,
    store: Mutex<AssistantStore>,
    audit: Arc<dyn AuditSink>,
    orders: Arc<dyn OrderSink>,
}

impl ShoppingAssistant {
    pub fn new(config: AppConfig, audit: Arc<dyn AuditSink>, orders: Arc<dyn OrderSink>) -> Self {
        let discount_trees = default_discount_trees();
        Self {
            pipeline: EvaluationPipeline::standard(&config, discount_trees.clone()),
            sessions: Arc::new(SessionManager::from_config(&config.session)),
            rule_base: RwLock::new(RuleBase::new()),
            store: Mutex::new(AssistantStore::new()),
            discount_trees,
            config,
            audit,
            orders,
        }
    }

    /// An assistant preloaded with the seed catalog, demo users and starter rules.
    pub fn seeded(
        config: AppConfig,
        audit: Arc<dyn AuditSink>,
        orders: Arc<dyn OrderSink>,
        now: DateTime<Utc>,
    ) -> Self {
        let assistant = Self::new(config, audit, orders);
        for product in fixtures::seed_catalog() {
            assistant.add_product(product, now);
        }
        for user in fixtures::seed_users() {
            assistant.register_user(user, now);
        }
        for rule in fixtures::starter_rules() {
            assistant.add_rule(rule.with_created_at(now), now);
        }
        assistant
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn discount_trees(&self) -> &[DiscountComponent] {
        &self.discount_trees
    }

    /// Shared handle for [`crate::session::spawn_timeout_sweeper`].
    pub fn session_manager(&self) -> Arc<SessionManager> {
        Arc::clone(&self.sessions)
    }

    pub fn add_product(&self, product: Product, now: DateTime<Utc>) {
        debug!(event_name = "catalog.product_added", product_id = %product.id, "product stocked");
        self.record(StoreEvent::ProductStocked { product }, now);
    }

    pub fn register_user(&self, user: UserProfile, now: DateTime<Utc>) {
        self.record(StoreEvent::UserRecorded { user }, now);
    }

    pub fn user(&self, user_id: &UserId) -> Option<UserProfile> {
        self.lock_store().user(user_id).cloned()
    }

    pub fn product(&self, product_id: &ProductId) -> Option<Product> {
        self.lock_store().product(product_id).cloned()
    }

    pub fn inventory(&self) -> Vec<Product> {
        self.lock_store().inventory()
    }

    pub fn low_stock(&self) -> Vec<Product> {
        let threshold = self.config.checkout.low_stock_threshold;
        self.lock_store().low_stock(threshold).into_iter().cloned().collect()
    }

    pub fn add_rule(&self, rule: Rule, now: DateTime<Utc>) {
        let summary = RuleSummary::from(&rule);
        self.write_rules().add_rule(rule);
        self.audit.emit(self.system_context().rule_added(&summary.id.0, &summary.rule_type));
        self.record(StoreEvent::RuleRegistered { rule: summary }, now);
    }

    pub fn deactivate_rule(&self, rule_id: &RuleId, now: DateTime<Utc>) -> bool {
        let deactivated = self.write_rules().deactivate_rule(rule_id);
        if deactivated {
            self.record(StoreEvent::RuleDeactivated { rule_id: rule_id.clone() }, now);
        }
        deactivated
    }

    pub fn rule(&self, rule_id: &RuleId) -> Option<Rule> {
        self.read_rules().get_rule(rule_id).cloned()
    }

    pub fn start_session(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<SessionInfo, ApplicationError> {
        let user = self.require_user(user_id)?;
        let session_id = self.sessions.create(user, now);
        let info = self.session_info(&session_id, now)?;
        self.audit.emit(self.context(&session_id, user_id).session_started());
        self.record(StoreEvent::SessionChanged { session: info.clone() }, now);
        Ok(info)
    }

    pub fn session_info(
        &self,
        session_id: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<SessionInfo, ApplicationError> {
        self.sessions
            .with_session(session_id, |session| session.info(now))
            .ok_or_else(|| ApplicationError::SessionNotFound(session_id.to_string()))
    }

    pub fn browse(
        &self,
        session_id: &SessionId,
        product_id: &ProductId,
        now: DateTime<Utc>,
    ) -> Result<CartResponse, ApplicationError> {
        let product = self.require_product(product_id)?;
        self.run(session_id, SessionOperationKind::Browse, now, false, |session| {
            session.browse(&product, now)
        })
    }

    pub fn add_to_cart(
        &self,
        session_id: &SessionId,
        product_id: &ProductId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<CartResponse, ApplicationError> {
        let product = self.require_product(product_id)?;
        let item = CartItem::new(
            product.id.as_str(),
            product.name.clone(),
            product.price,
            quantity,
            product.category.clone(),
        )
        .with_tags(product.tags.clone());
        self.run(session_id, SessionOperationKind::AddToCart, now, true, |session| {
            session.add_to_cart(item, now)
        })
    }

    pub fn update_cart_item(
        &self,
        session_id: &SessionId,
        product_id: &ProductId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<CartResponse, ApplicationError> {
        self.run(session_id, SessionOperationKind::UpdateCart, now, true, |session| {
            session.update_cart(product_id, quantity, now)
        })
    }

    pub fn remove_from_cart(
        &self,
        session_id: &SessionId,
        product_id: &ProductId,
        now: DateTime<Utc>,
    ) -> Result<CartResponse, ApplicationError> {
        self.run(session_id, SessionOperationKind::RemoveFromCart, now, true, |session| {
            session.remove_from_cart(product_id, now)
        })
    }

    pub fn proceed_to_checkout(
        &self,
        session_id: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<CartResponse, ApplicationError> {
        self.run(session_id, SessionOperationKind::ProceedToCheckout, now, false, |session| {
            session.proceed_to_checkout(now)
        })
    }

    /// Completes checkout. A completed order also updates the stored user
    /// profile and decrements stock, whatever the order sink reports.
    pub fn complete_checkout(
        &self,
        session_id: &SessionId,
        details: Option<&CheckoutDetails>,
        now: DateTime<Utc>,
    ) -> Result<CartResponse, ApplicationError> {
        let orders = Arc::clone(&self.orders);
        let operation = SessionOperationKind::CompleteCheckout;
        let response = self.run(session_id, operation, now, false, |session| {
            session.complete_checkout(details, orders.as_ref(), now)
        })?;

        if let Some(order) = &response.outcome.order {
            let user = self.sessions.with_session(session_id, |session| session.user.clone());
            if let Some(user) = user {
                self.record(StoreEvent::UserRecorded { user }, now);
            }
            for item in &order.items {
                if let Some(product) = self.product(&item.product_id) {
                    let stock = product.stock.saturating_sub(item.quantity);
                    self.record(
                        StoreEvent::StockAdjusted { product_id: item.product_id.clone(), stock },
                        now,
                    );
                }
            }
            info!(
                event_name = "checkout.completed",
                session_id = %session_id,
                order_id = %order.order_id.0,
                total = %order.total,
                "order placed"
            );
        }
        Ok(response)
    }

    pub fn cancel_checkout(
        &self,
        session_id: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<CartResponse, ApplicationError> {
        self.run(session_id, SessionOperationKind::CancelCheckout, now, false, |session| {
            session.cancel_checkout(now)
        })
    }

    pub fn abandon_session(
        &self,
        session_id: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<CartResponse, ApplicationError> {
        self.run(session_id, SessionOperationKind::Abandon, now, false, |session| {
            session.abandon(now)
        })
    }

    /// Re-runs the pipeline for a session and writes the price adjustments back.
    pub fn evaluate_session(
        &self,
        session_id: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<CartEvaluation, ApplicationError> {
        let evaluation = self
            .sessions
            .with_session(session_id, |session| self.evaluate_locked(session, now))
            .ok_or_else(|| ApplicationError::SessionNotFound(session_id.to_string()))?;
        self.record_rule_usage(&evaluation);
        Ok(evaluation)
    }

    pub fn recommendations_for(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Recommendation>, ApplicationError> {
        let user = self.require_user(user_id)?;
        let cart = Cart::new(user.id.clone(), SessionId::new("recommendations"));
        let inventory = self.inventory();
        let rule_base = self.read_rules();
        let input = EvaluationInput {
            user: &user,
            cart: &cart,
            inventory: &inventory,
            rule_base: &rule_base,
            now,
        };
        let recommendations =
            PersonalizationEvaluator::new(self.config.recommendations.clone()).recommend(&input);
        drop(rule_base);

        self.record(
            StoreEvent::RecommendationsGenerated {
                user_id: user_id.clone(),
                recommendations: recommendations.clone(),
            },
            now,
        );
        Ok(recommendations)
    }

    pub fn available_coupons(&self, user_id: &UserId) -> Result<Vec<Coupon>, ApplicationError> {
        self.user(user_id)
            .map(|user| coupons::available_coupons(&user))
            .ok_or_else(|| ApplicationError::UserNotFound(user_id.to_string()))
    }

    /// Validates a coupon against the session's cart and records it on success.
    pub fn apply_coupon(
        &self,
        session_id: &SessionId,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<CouponResponse, ApplicationError> {
        let checkout = self.config.checkout.clone();
        let (response, user_id) = self
            .sessions
            .with_session(session_id, |session| {
                let (success, message) = if !session.is_active() {
                    let state = session.state();
                    (false, format!("Session {state}. Coupons can no longer be applied."))
                } else {
                    match coupons::apply_coupon(code, &session.user, &session.cart) {
                        Ok(applied) => {
                            let message = applied.message.clone();
                            session.applied_coupon = Some(applied);
                            (true, message)
                        }
                        Err(error) => (false, error.to_string()),
                    }
                };
                let discount = coupon_discount(session);
                let response = CouponResponse {
                    success,
                    message,
                    coupon: session.applied_coupon.clone().filter(|_| success),
                    summary: PriceSummary::for_cart(&session.cart, discount, &checkout),
                };
                (response, session.user.id.clone())
            })
            .ok_or_else(|| ApplicationError::SessionNotFound(session_id.to_string()))?;

        self.audit.emit(self.context(session_id, &user_id).coupon_decision(
            code,
            response.success,
            &response.message,
        ));
        Ok(response)
    }

    pub fn price_summary(&self, session_id: &SessionId) -> Result<PriceSummary, ApplicationError> {
        self.sessions
            .with_session(session_id, |session| {
                let coupon = coupon_discount(session);
                PriceSummary::for_cart(&session.cart, coupon, &self.config.checkout)
            })
            .ok_or_else(|| ApplicationError::SessionNotFound(session_id.to_string()))
    }

    pub fn cart_analytics(
        &self,
        session_id: &SessionId,
    ) -> Result<CartAnalytics, ApplicationError> {
        self.sessions
            .with_session(session_id, |session| CartAnalytics::for_cart(&session.cart))
            .ok_or_else(|| ApplicationError::SessionNotFound(session_id.to_string()))
    }

    /// Abandons idle sessions and records their final state.
    pub fn sweep_inactive_sessions(&self, now: DateTime<Utc>) -> Vec<SessionId> {
        let expired = self.sessions.sweep_inactive(now);
        for session_id in &expired {
            let snapshot = self
                .sessions
                .with_session(session_id, |session| (session.user.id.clone(), session.info(now)));
            if let Some((user_id, info)) = snapshot {
                let timeout_secs = self.sessions.timeout().num_seconds();
                self.audit.emit(self.context(session_id, &user_id).session_timed_out(timeout_secs));
                self.record(StoreEvent::SessionChanged { session: info }, now);
            }
        }
        expired
    }

    pub fn statistics(&self) -> AssistantStatistics {
        AssistantStatistics {
            sessions: self.sessions.statistics(),
            rules: self.read_rules().statistics(),
            store: self.lock_store().statistics(),
        }
    }

    pub fn store_snapshot(&self) -> AssistantStore {
        self.lock_store().clone()
    }

    fn run(
        &self,
        session_id: &SessionId,
        operation: SessionOperationKind,
        now: DateTime<Utc>,
        reevaluate: bool,
        apply: impl FnOnce(&mut ShoppingSession) -> Result<SessionOutcome, SessionFault>,
    ) -> Result<CartResponse, ApplicationError> {
        let (result, user_id, info, evaluation) = self
            .sessions
            .with_session(session_id, |session| {
                let result = apply(session);
                let changed = matches!(&result, Ok(outcome) if outcome.success);
                let evaluation =
                    (reevaluate && changed).then(|| self.evaluate_locked(session, now));
                (result, session.user.id.clone(), session.info(now), evaluation)
            })
            .ok_or_else(|| ApplicationError::SessionNotFound(session_id.to_string()))?;

        let context = self.context(session_id, &user_id);
        record_session_outcome(self.audit.as_ref(), &context, operation, &result);
        if let Some(evaluation) = &evaluation {
            self.record_rule_usage(evaluation);
        }
        let outcome = result?;
        if outcome.success {
            self.record(StoreEvent::SessionChanged { session: info.clone() }, now);
        }
        Ok(CartResponse { outcome, cart: info.cart, evaluation })
    }

    /// Caller holds the session lock. Takes the rule base read lock and the
    /// store lock briefly; never the reverse order.
    fn evaluate_locked(&self, session: &mut ShoppingSession, now: DateTime<Utc>) -> CartEvaluation {
        let inventory = self.inventory();
        let evaluation = {
            let rule_base = self.read_rules();
            let input = EvaluationInput {
                user: &session.user,
                cart: &session.cart,
                inventory: &inventory,
                rule_base: &rule_base,
                now,
            };
            self.pipeline.evaluate(&input)
        };

        session.cart.clear_discounts();
        apply_adjustments(&mut session.cart, &evaluation.adjustments);
        if let Some(code) = session.applied_coupon.as_ref().map(|coupon| coupon.code.clone()) {
            // Re-price the coupon against the new cart; drop it once it no longer qualifies.
            session.applied_coupon =
                coupons::apply_coupon(&code, &session.user, &session.cart).ok();
        }
        session.last_evaluation = Some(evaluation.clone());

        debug!(
            event_name = "evaluation.completed",
            session_id = %session.id,
            total_discount = %evaluation.total_discount,
            failures = evaluation.failures.len(),
            "cart evaluated"
        );
        evaluation
    }

    fn record_rule_usage(&self, evaluation: &CartEvaluation) {
        if let Some(findings) = evaluation.rules.as_ref().filter(|f| !f.fired_rules.is_empty()) {
            self.write_rules().record_usage(&findings.fired_rules);
        }
    }

    fn require_product(&self, product_id: &ProductId) -> Result<Product, ApplicationError> {
        self.product(product_id)
            .ok_or_else(|| ApplicationError::ProductNotFound(product_id.to_string()))
    }

    fn require_user(&self, user_id: &UserId) -> Result<UserProfile, ApplicationError> {
        self.user(user_id).ok_or_else(|| ApplicationError::UserNotFound(user_id.to_string()))
    }

    fn record(&self, event: StoreEvent, now: DateTime<Utc>) {
        self.lock_store().append(event, now);
    }

    fn context(&self, session_id: &SessionId, user_id: &UserId) -> AuditContext {
        AuditContext::new(
            Some(session_id.clone()),
            Some(user_id.clone()),
            Uuid::new_v4().to_string(),
            ACTOR,
        )
    }

    fn system_context(&self) -> AuditContext {
        AuditContext::new(None, None, Uuid::new_v4().to_string(), ACTOR)
    }

    fn lock_store(&self) -> MutexGuard<'_, AssistantStore> {
        match self.store.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn read_rules(&self) -> RwLockReadGuard<'_, RuleBase> {
        match self.rule_base.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_rules(&self) -> RwLockWriteGuard<'_, RuleBase> {
        match self.rule_base.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn coupon_discount(session: &ShoppingSession) -> Decimal {
    session.applied_coupon.as_ref().map(|coupon| coupon.discount).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::ShoppingAssistant;
    use crate::audit::InMemoryAuditSink;
    use crate::config::AppConfig;
    use crate::domain::product::ProductId;
    use crate::domain::session::SessionState;
    use crate::domain::user::UserId;
    use crate::engine::RuleId;
    use crate::errors::ApplicationError;
    use crate::session::InMemoryOrderSink;

    fn assistant() -> (ShoppingAssistant, Arc<InMemoryAuditSink>) {
        let audit = Arc::new(InMemoryAuditSink::default());
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).single().expect("valid timestamp");
        let assistant = ShoppingAssistant::seeded(
            AppConfig::default(),
            audit.clone(),
            Arc::new(InMemoryOrderSink::default()),
            now,
        );
        (assistant, audit)
    }

    #[test]
    fn cart_mutations_write_discounted_prices_back() {
        let (assistant, audit) = assistant();
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 5, 0).single().expect("valid timestamp");
        let session =
            assistant.start_session(&UserId::new("user-student"), now).expect("session starts");

        let response = assistant
            .add_to_cart(&session.session_id, &ProductId::new("coffee-maker"), 2, now)
            .expect("add runs");

        assert!(response.outcome.success);
        assert_eq!(response.outcome.state, SessionState::Shopping);
        // 179.98 subtotal: student 15% + high value 10%.
        let evaluation = response.evaluation.expect("cart re-evaluated");
        assert_eq!(evaluation.total_discount, Decimal::new(4500, 2));
        assert_eq!(response.cart.total, Decimal::new(13498, 2));
        let fired = evaluation.rules.expect("rules ran").fired_rules;
        assert_eq!(fired, vec![RuleId::new("student-segment"), RuleId::new("student-audio-pick")]);
        assert_eq!(
            assistant.rule(&RuleId::new("student-segment")).map(|rule| rule.usage_count),
            Some(1)
        );
        assert_eq!(audit.events_of_type("session.transition_applied").len(), 1);
    }

    #[test]
    fn unknown_ids_are_application_errors() {
        let (assistant, _) = assistant();
        let now = Utc::now();

        assert!(matches!(
            assistant.start_session(&UserId::new("nobody"), now),
            Err(ApplicationError::UserNotFound(_))
        ));
        let session =
            assistant.start_session(&UserId::new("user-regular"), now).expect("session starts");
        assert!(matches!(
            assistant.add_to_cart(&session.session_id, &ProductId::new("missing"), 1, now),
            Err(ApplicationError::ProductNotFound(_))
        ));
    }

    #[test]
    fn unsupported_operations_surface_as_faults() {
        let (assistant, audit) = assistant();
        let now = Utc::now();
        let session =
            assistant.start_session(&UserId::new("user-regular"), now).expect("session starts");

        let error = assistant.cancel_checkout(&session.session_id, now).expect_err("no handler");

        assert!(matches!(error, ApplicationError::Session(_)));
        assert_eq!(audit.events_of_type("session.operation_faulted").len(), 1);
    }
}
