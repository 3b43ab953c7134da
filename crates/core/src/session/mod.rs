//! Shopping-session lifecycle: state machine, registry and checkout persistence.

pub mod machine;
pub mod manager;
pub mod persistence;
pub mod states;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::order::Order;
use crate::domain::session::SessionState;
use crate::errors::DomainError;

pub use machine::{SessionActivity, SessionInfo, SessionTransition, ShoppingSession};
pub use manager::{spawn_timeout_sweeper, SessionManager, SessionStatistics};
pub use persistence::{InMemoryOrderSink, OrderSink, PersistenceError, PersistenceStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOperationKind {
    Browse,
    AddToCart,
    RemoveFromCart,
    UpdateCart,
    ProceedToCheckout,
    CompleteCheckout,
    CancelCheckout,
    Abandon,
}

impl SessionOperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Browse => "browse",
            Self::AddToCart => "add_to_cart",
            Self::RemoveFromCart => "remove_from_cart",
            Self::UpdateCart => "update_cart",
            Self::ProceedToCheckout => "proceed_to_checkout",
            Self::CompleteCheckout => "complete_checkout",
            Self::CancelCheckout => "cancel_checkout",
            Self::Abandon => "abandon",
        }
    }
}

impl fmt::Display for SessionOperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Programming-error class failures. Callers treat these as bugs, never retry.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionFault {
    #[error("{operation} is not supported in the {state} state")]
    UnsupportedOperation { state: SessionState, operation: SessionOperationKind },
    #[error(transparent)]
    Transition(#[from] DomainError),
}

/// Result of a session operation, including business rejections.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub success: bool,
    pub message: String,
    pub state: SessionState,
    /// Set when the operation moved the session to a new state.
    pub previous_state: Option<SessionState>,
    pub order: Option<Order>,
    pub persistence: Option<PersistenceStatus>,
}

impl SessionOutcome {
    pub fn ok(message: impl Into<String>, state: SessionState) -> Self {
        Self {
            success: true,
            message: message.into(),
            state,
            previous_state: None,
            order: None,
            persistence: None,
        }
    }

    pub fn rejected(message: impl Into<String>, state: SessionState) -> Self {
        Self { success: false, ..Self::ok(message, state) }
    }

    pub fn with_previous(mut self, previous: Option<SessionState>) -> Self {
        self.previous_state = previous;
        self
    }

    pub fn with_order(mut self, order: Order, persistence: PersistenceStatus) -> Self {
        self.order = Some(order);
        self.persistence = Some(persistence);
        self
    }

    pub fn transitioned(&self) -> bool {
        self.previous_state.is_some_and(|previous| previous != self.state)
    }
}
