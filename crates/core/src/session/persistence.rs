use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::order::{Order, OrderId};
use crate::domain::user::{PurchaseEntry, UserId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("order store unavailable: {0}")]
    Unavailable(String),
    #[error("order `{0}` already exists")]
    DuplicateOrder(OrderId),
}

/// Side channel for completed checkouts.
///
/// Calls happen after the session has already moved to `Completed`; a failure
/// is reported on the outcome and logged, never rolled back.
pub trait OrderSink: Send + Sync {
    fn save_order(&self, order: &Order) -> Result<(), PersistenceError>;

    fn append_purchase_history(
        &self,
        user_id: &UserId,
        entries: &[PurchaseEntry],
    ) -> Result<(), PersistenceError>;
}

/// What happened to the persistence side effects of one checkout.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceStatus {
    pub order_saved: bool,
    pub history_updated: bool,
    pub error: Option<String>,
}

impl PersistenceStatus {
    pub fn is_complete(&self) -> bool {
        self.order_saved && self.history_updated
    }
}

#[derive(Default)]
struct OrderLedger {
    orders: Vec<Order>,
    purchase_history: BTreeMap<UserId, Vec<PurchaseEntry>>,
}

#[derive(Clone, Default)]
pub struct InMemoryOrderSink {
    ledger: Arc<Mutex<OrderLedger>>,
}

impl InMemoryOrderSink {
    pub fn orders(&self) -> Vec<Order> {
        match self.ledger.lock() {
            Ok(ledger) => ledger.orders.clone(),
            Err(poisoned) => poisoned.into_inner().orders.clone(),
        }
    }

    pub fn purchase_history(&self, user_id: &UserId) -> Vec<PurchaseEntry> {
        let read = |ledger: &OrderLedger| {
            ledger.purchase_history.get(user_id).cloned().unwrap_or_default()
        };
        match self.ledger.lock() {
            Ok(ledger) => read(&ledger),
            Err(poisoned) => read(&poisoned.into_inner()),
        }
    }
}

impl OrderSink for InMemoryOrderSink {
    fn save_order(&self, order: &Order) -> Result<(), PersistenceError> {
        let mut ledger = match self.ledger.lock() {
            Ok(ledger) => ledger,
            Err(poisoned) => poisoned.into_inner(),
        };
        if ledger.orders.iter().any(|existing| existing.order_id == order.order_id) {
            return Err(PersistenceError::DuplicateOrder(order.order_id.clone()));
        }
        ledger.orders.push(order.clone());
        Ok(())
    }

    fn append_purchase_history(
        &self,
        user_id: &UserId,
        entries: &[PurchaseEntry],
    ) -> Result<(), PersistenceError> {
        let mut ledger = match self.ledger.lock() {
            Ok(ledger) => ledger,
            Err(poisoned) => poisoned.into_inner(),
        };
        ledger.purchase_history.entry(user_id.clone()).or_default().extend_from_slice(entries);
        Ok(())
    }
}
