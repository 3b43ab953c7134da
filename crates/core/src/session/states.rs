use crate::domain::session::SessionState;
use crate::session::SessionOperationKind;

pub const EMPTY_CART_CHECKOUT: &str = "Cart is empty. Add items before checkout.";
pub const CHECKOUT_LOCKS_CART: &str =
    "Cannot modify cart during checkout. Cancel checkout to continue shopping.";
pub const ALREADY_IN_CHECKOUT: &str = "Already in checkout. Complete or cancel current checkout.";
const COMPLETED_RESTART: &str = "Session completed. Start a new session to continue shopping.";
const COMPLETED_ORDER_LOCKED: &str = "Session completed. Cannot modify completed order.";
const ABANDONED_RESTART: &str = "Session abandoned. Start a new session to continue.";

/// How a state treats an operation before any cart logic runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    Handle,
    Reject(&'static str),
    /// No handler exists for the pair; surfaced as a fault, not a rejection.
    Unsupported,
}

/// Dispatch table keyed by `(state, operation)`.
pub fn disposition(state: SessionState, operation: SessionOperationKind) -> Disposition {
    use Disposition::{Handle, Reject, Unsupported};
    use SessionOperationKind::{
        Abandon, AddToCart, Browse, CancelCheckout, CompleteCheckout, ProceedToCheckout,
        RemoveFromCart, UpdateCart,
    };
    use SessionState::{Abandoned, Browsing, Checkout, Completed, Shopping};

    match (state, operation) {
        (Browsing, Browse | AddToCart | Abandon) => Handle,
        (Browsing, ProceedToCheckout) => Reject(EMPTY_CART_CHECKOUT),
        (Browsing, RemoveFromCart | UpdateCart | CompleteCheckout | CancelCheckout) => Unsupported,

        (Shopping, Browse | AddToCart | RemoveFromCart | UpdateCart | ProceedToCheckout | Abandon) => {
            Handle
        }
        (Shopping, CompleteCheckout | CancelCheckout) => Unsupported,

        (Checkout, CompleteCheckout | CancelCheckout | Abandon) => Handle,
        (Checkout, AddToCart | RemoveFromCart | UpdateCart) => Reject(CHECKOUT_LOCKS_CART),
        (Checkout, ProceedToCheckout) => Reject(ALREADY_IN_CHECKOUT),
        (Checkout, Browse) => Unsupported,

        (Completed, Browse | AddToCart) => Reject(COMPLETED_RESTART),
        (Completed, RemoveFromCart | UpdateCart) => Reject(COMPLETED_ORDER_LOCKED),
        (Completed, ProceedToCheckout) => Reject("Session already completed."),
        (Completed, Abandon) => Reject("Cannot abandon completed session."),
        (Completed, CompleteCheckout | CancelCheckout) => Unsupported,

        (Abandoned, Browse | AddToCart | RemoveFromCart | UpdateCart | ProceedToCheckout) => {
            Reject(ABANDONED_RESTART)
        }
        (Abandoned, Abandon) => Reject("Session already abandoned."),
        (Abandoned, CompleteCheckout | CancelCheckout) => Unsupported,
    }
}
