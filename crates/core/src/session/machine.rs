use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::coupons::AppliedCoupon;
use crate::domain::cart::{Cart, CartItem, CartView};
use crate::domain::order::{CheckoutDetails, Order, OrderId, OrderStatus};
use crate::domain::product::{Product, ProductId};
use crate::domain::session::{SessionId, SessionState};
use crate::domain::user::{BrowsingEntry, PurchaseEntry, UserId, UserProfile};
use crate::evaluation::CartEvaluation;
use crate::session::persistence::{OrderSink, PersistenceStatus};
use crate::session::states::{disposition, Disposition, EMPTY_CART_CHECKOUT};
use crate::session::{SessionFault, SessionOperationKind, SessionOutcome};

pub const PAYMENT_METHOD: &str = "Credit Card";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTransition {
    pub from: SessionState,
    pub to: SessionState,
    pub operation: SessionOperationKind,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionActivity {
    pub operation: SessionOperationKind,
    pub product_id: Option<ProductId>,
    pub order_id: Option<OrderId>,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub state: SessionState,
    pub is_active: bool,
    pub duration_secs: i64,
    pub transition_count: usize,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub cart: CartView,
    pub order_id: Option<OrderId>,
    pub applied_coupon: Option<AppliedCoupon>,
}

/// One user's shopping session.
///
/// Every operation consults the dispatch table in [`crate::session::states`]
/// first. Business rejections come back as `Ok` outcomes with `success ==
/// false`; only unsupported `(state, operation)` pairs return `Err`.
#[derive(Clone, Debug)]
pub struct ShoppingSession {
    pub id: SessionId,
    pub user: UserProfile,
    pub cart: Cart,
    pub applied_coupon: Option<AppliedCoupon>,
    pub last_evaluation: Option<CartEvaluation>,
    state: SessionState,
    transitions: Vec<SessionTransition>,
    activity: Vec<SessionActivity>,
    order: Option<Order>,
    started_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

impl ShoppingSession {
    pub fn new(id: SessionId, user: UserProfile, now: DateTime<Utc>) -> Self {
        let cart = Cart::new(user.id.clone(), id.clone());
        Self {
            id,
            user,
            cart,
            applied_coupon: None,
            last_evaluation: None,
            state: SessionState::Browsing,
            transitions: Vec::new(),
            activity: Vec::new(),
            order: None,
            started_at: now,
            last_activity: now,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        !self.state.is_terminal()
    }

    pub fn transitions(&self) -> &[SessionTransition] {
        &self.transitions
    }

    pub fn activity(&self) -> &[SessionActivity] {
        &self.activity
    }

    pub fn order(&self) -> Option<&Order> {
        self.order.as_ref()
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    pub fn info(&self, now: DateTime<Utc>) -> SessionInfo {
        SessionInfo {
            session_id: self.id.clone(),
            user_id: self.user.id.clone(),
            state: self.state,
            is_active: self.is_active(),
            duration_secs: (now - self.started_at).num_seconds(),
            transition_count: self.transitions.len(),
            started_at: self.started_at,
            last_activity: self.last_activity,
            cart: self.cart.view(),
            order_id: self.order.as_ref().map(|order| order.order_id.clone()),
            applied_coupon: self.applied_coupon.clone(),
        }
    }

    pub fn browse(
        &mut self,
        product: &Product,
        now: DateTime<Utc>,
    ) -> Result<SessionOutcome, SessionFault> {
        if let Some(rejected) = self.gate(SessionOperationKind::Browse, now)? {
            return Ok(rejected);
        }
        self.user.browsing_history.push(BrowsingEntry {
            product_id: product.id.clone(),
            category: product.category.clone(),
            viewed_at: now,
        });
        self.record(SessionOperationKind::Browse, Some(product.id.clone()), None, now);
        Ok(SessionOutcome::ok("Product viewed", self.state))
    }

    pub fn add_to_cart(
        &mut self,
        item: CartItem,
        now: DateTime<Utc>,
    ) -> Result<SessionOutcome, SessionFault> {
        let operation = SessionOperationKind::AddToCart;
        if let Some(rejected) = self.gate(operation, now)? {
            return Ok(rejected);
        }
        if item.quantity == 0 {
            return Ok(SessionOutcome::rejected("Quantity must be at least 1", self.state));
        }

        let previous = match self.state {
            SessionState::Browsing => Some(self.enter(SessionState::Shopping, operation, now)?),
            _ => None,
        };
        let product_id = item.product_id.clone();
        self.cart.add_item(item);
        self.cart.updated_at = now;
        self.record(operation, Some(product_id), None, now);
        Ok(SessionOutcome::ok("Item added to cart", self.state).with_previous(previous))
    }

    pub fn remove_from_cart(
        &mut self,
        product_id: &ProductId,
        now: DateTime<Utc>,
    ) -> Result<SessionOutcome, SessionFault> {
        let operation = SessionOperationKind::RemoveFromCart;
        if let Some(rejected) = self.gate(operation, now)? {
            return Ok(rejected);
        }
        if !self.cart.remove_item(product_id) {
            return Ok(SessionOutcome::rejected("Item not in cart", self.state));
        }
        self.cart.updated_at = now;
        self.record(operation, Some(product_id.clone()), None, now);

        if self.cart.is_empty() {
            let previous = self.enter(SessionState::Browsing, operation, now)?;
            return Ok(SessionOutcome::ok("Item removed. Cart is now empty.", self.state)
                .with_previous(Some(previous)));
        }
        Ok(SessionOutcome::ok("Item removed from cart", self.state))
    }

    /// Sets a line quantity; zero removes the line.
    pub fn update_cart(
        &mut self,
        product_id: &ProductId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<SessionOutcome, SessionFault> {
        let operation = SessionOperationKind::UpdateCart;
        if let Some(rejected) = self.gate(operation, now)? {
            return Ok(rejected);
        }
        if !self.cart.update_quantity(product_id, quantity) {
            return Ok(SessionOutcome::rejected("Item not in cart", self.state));
        }
        self.cart.updated_at = now;
        self.record(operation, Some(product_id.clone()), None, now);

        if self.cart.is_empty() {
            let previous = self.enter(SessionState::Browsing, operation, now)?;
            return Ok(SessionOutcome::ok("Cart emptied", self.state).with_previous(Some(previous)));
        }
        Ok(SessionOutcome::ok("Cart updated", self.state))
    }

    pub fn proceed_to_checkout(&mut self, now: DateTime<Utc>) -> Result<SessionOutcome, SessionFault> {
        let operation = SessionOperationKind::ProceedToCheckout;
        if let Some(rejected) = self.gate(operation, now)? {
            return Ok(rejected);
        }
        if self.cart.is_empty() {
            return Ok(SessionOutcome::rejected(EMPTY_CART_CHECKOUT, self.state));
        }
        let previous = self.enter(SessionState::Checkout, operation, now)?;
        self.record(operation, None, None, now);
        Ok(SessionOutcome::ok("Proceeding to checkout", self.state).with_previous(Some(previous)))
    }

    /// Validates checkout details, confirms the order and moves to `Completed`.
    ///
    /// Persistence runs after the transition. Its failure is logged and
    /// reported on the outcome, but the session stays `Completed`.
    pub fn complete_checkout(
        &mut self,
        details: Option<&CheckoutDetails>,
        orders: &dyn OrderSink,
        now: DateTime<Utc>,
    ) -> Result<SessionOutcome, SessionFault> {
        let operation = SessionOperationKind::CompleteCheckout;
        if let Some(rejected) = self.gate(operation, now)? {
            return Ok(rejected);
        }
        let Some(details) = details else {
            return Ok(SessionOutcome::rejected("Invalid checkout data", self.state));
        };
        let missing = details.missing_fields();
        if !missing.is_empty() {
            return Ok(SessionOutcome::rejected(
                format!(
                    "Missing required billing or payment information: {}",
                    missing.join(", ")
                ),
                self.state,
            ));
        }

        let order = self.build_order(details, now);
        let purchases = self.purchase_entries(&order, now);
        let previous = self.enter(SessionState::Completed, operation, now)?;
        self.user.purchase_history.extend(purchases.iter().cloned());
        self.record(operation, None, Some(order.order_id.clone()), now);

        let persistence = self.persist(&order, &purchases, orders);
        let total = order.total;
        self.order = Some(order.clone());

        info!(
            event_name = "session.checkout_completed",
            session_id = %self.id,
            order_id = %order.order_id,
            total = %total,
            persisted = persistence.is_complete(),
            "checkout completed"
        );
        Ok(SessionOutcome::ok("Checkout completed successfully", self.state)
            .with_previous(Some(previous))
            .with_order(order, persistence))
    }

    pub fn cancel_checkout(&mut self, now: DateTime<Utc>) -> Result<SessionOutcome, SessionFault> {
        let operation = SessionOperationKind::CancelCheckout;
        if let Some(rejected) = self.gate(operation, now)? {
            return Ok(rejected);
        }
        let previous = self.enter(SessionState::Shopping, operation, now)?;
        self.record(operation, None, None, now);
        Ok(SessionOutcome::ok("Checkout cancelled. Returned to shopping.", self.state)
            .with_previous(Some(previous)))
    }

    pub fn abandon(&mut self, now: DateTime<Utc>) -> Result<SessionOutcome, SessionFault> {
        let operation = SessionOperationKind::Abandon;
        if let Some(rejected) = self.gate(operation, now)? {
            return Ok(rejected);
        }
        let previous = self.enter(SessionState::Abandoned, operation, now)?;
        self.record(operation, None, None, now);
        Ok(SessionOutcome::ok("Session abandoned", self.state).with_previous(Some(previous)))
    }

    /// Abandons the session when it is still active and idle for at least `timeout`.
    pub fn expire_if_idle(
        &mut self,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> Option<SessionOutcome> {
        if !self.is_active() || now - self.last_activity < timeout {
            return None;
        }
        self.abandon(now).ok().filter(|outcome| outcome.success)
    }

    fn gate(
        &mut self,
        operation: SessionOperationKind,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionOutcome>, SessionFault> {
        match disposition(self.state, operation) {
            Disposition::Handle => {
                self.last_activity = now;
                Ok(None)
            }
            Disposition::Reject(message) => {
                debug!(
                    event_name = "session.operation_rejected",
                    session_id = %self.id,
                    state = %self.state,
                    operation = %operation,
                    "operation rejected"
                );
                Ok(Some(SessionOutcome::rejected(message, self.state)))
            }
            Disposition::Unsupported => {
                Err(SessionFault::UnsupportedOperation { state: self.state, operation })
            }
        }
    }

    fn enter(
        &mut self,
        next: SessionState,
        operation: SessionOperationKind,
        now: DateTime<Utc>,
    ) -> Result<SessionState, SessionFault> {
        let previous = self.state;
        previous.ensure_transition(next)?;
        self.state = next;
        self.last_activity = now;
        self.transitions.push(SessionTransition { from: previous, to: next, operation, at: now });
        info!(
            event_name = "session.transition_applied",
            session_id = %self.id,
            from = %previous,
            to = %next,
            "session state changed"
        );
        Ok(previous)
    }

    fn record(
        &mut self,
        operation: SessionOperationKind,
        product_id: Option<ProductId>,
        order_id: Option<OrderId>,
        at: DateTime<Utc>,
    ) {
        self.activity.push(SessionActivity { operation, product_id, order_id, at });
    }

    fn build_order(&self, details: &CheckoutDetails, now: DateTime<Utc>) -> Order {
        let coupon_discount =
            self.applied_coupon.as_ref().map(|coupon| coupon.discount).unwrap_or_default();
        let discount = (self.cart.total_discount() + coupon_discount).min(self.cart.subtotal());
        Order {
            order_id: OrderId::generate(now),
            user_id: self.user.id.clone(),
            session_id: self.id.clone(),
            items: self.cart.items.iter().map(CartItem::view).collect(),
            billing: details.billing.clone(),
            payment_method: PAYMENT_METHOD.to_string(),
            card_last_four: details.payment.last_four(),
            subtotal: self.cart.subtotal(),
            discount,
            total: self.cart.subtotal() - discount,
            status: OrderStatus::Confirmed,
            created_at: now,
        }
    }

    fn purchase_entries(&self, order: &Order, now: DateTime<Utc>) -> Vec<PurchaseEntry> {
        self.cart
            .items
            .iter()
            .map(|item| PurchaseEntry {
                order_id: order.order_id.0.clone(),
                product_id: item.product_id.clone(),
                name: item.name.clone(),
                category: item.category.clone(),
                tags: item.tags.clone(),
                price: item.price,
                purchased_at: now,
            })
            .collect()
    }

    fn persist(
        &self,
        order: &Order,
        purchases: &[PurchaseEntry],
        orders: &dyn OrderSink,
    ) -> PersistenceStatus {
        let mut status = PersistenceStatus::default();
        if let Err(err) = orders.save_order(order) {
            error!(
                event_name = "session.order_persistence_failed",
                session_id = %self.id,
                order_id = %order.order_id,
                error = %err,
                "order could not be saved; session stays completed"
            );
            status.error = Some(err.to_string());
            return status;
        }
        status.order_saved = true;

        match orders.append_purchase_history(&self.user.id, purchases) {
            Ok(()) => status.history_updated = true,
            Err(err) => {
                error!(
                    event_name = "session.history_persistence_failed",
                    session_id = %self.id,
                    user_id = %self.user.id,
                    error = %err,
                    "purchase history could not be updated"
                );
                status.error = Some(err.to_string());
            }
        }
        status
    }
}
