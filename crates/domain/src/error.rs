//! Domain error types.

use thiserror::Error;

use crate::lifecycle::OrderAction;
use crate::status::OrderStatus;

/// Errors produced by lifecycle decisions and order transitions.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The requested action is not legal in the order's current status.
    #[error("Invalid transition: cannot {action} an order in {status} status")]
    InvalidTransition {
        status: OrderStatus,
        action: OrderAction,
    },

    /// The order violates a precondition of the requested action.
    #[error("Invalid order state: {reason}")]
    InvalidOrderState { reason: String },

    /// Invalid item quantity.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// Invalid item price.
    #[error("Invalid unit price: {price} (must be greater than 0)")]
    InvalidPrice { price: i64 },
}

impl LifecycleError {
    /// Builds an `InvalidOrderState` error from a reason string.
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidOrderState {
            reason: reason.into(),
        }
    }
}
