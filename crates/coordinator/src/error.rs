//! Coordinator error types.

use std::time::Duration;

use common::OrderId;
use domain::{LifecycleError, OperationKind};
use order_store::StoreError;
use thiserror::Error;

/// Errors surfaced by coordinator operations.
///
/// Whatever the variant, a failed operation leaves the stored order
/// unchanged: staged state is discarded on rollback and the commit is
/// the only write.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Order not found.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// The lifecycle rejected the requested action. Never retried.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Concurrent writers kept winning the version race.
    #[error("Order {order_id} was modified concurrently, gave up after {attempts} attempts")]
    Conflict { order_id: OrderId, attempts: u32 },

    /// The payment provider declined the charge. Never retried.
    #[error("Payment declined for order {0}")]
    PaymentDeclined(OrderId),

    /// An external collaborator kept failing after call retries.
    /// The intent record stays pending, so a later attempt reuses the
    /// same token and cannot double the effect.
    #[error("Integration failure during {kind} for order {order_id}: {reason}")]
    Integration {
        order_id: OrderId,
        kind: OperationKind,
        reason: String,
    },

    /// The operation exceeded its wall-clock budget. The worker task
    /// keeps running and reconciles the order in the background.
    #[error("Operation on order {order_id} timed out after {elapsed:?}")]
    Timeout { order_id: OrderId, elapsed: Duration },

    /// Storage failure.
    #[error("Store error: {0}")]
    Store(StoreError),

    /// Coordinator-internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for CoordinatorError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(order_id) => Self::NotFound(order_id),
            other => Self::Store(other),
        }
    }
}

/// Convenience type alias for coordinator results.
pub type Result<T> = std::result::Result<T, CoordinatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_not_found_maps_to_not_found() {
        let order_id = OrderId::new();
        let err: CoordinatorError = StoreError::NotFound(order_id).into();
        assert!(matches!(err, CoordinatorError::NotFound(id) if id == order_id));
    }

    #[test]
    fn test_other_store_errors_stay_wrapped() {
        let order_id = OrderId::new();
        let err: CoordinatorError = StoreError::AlreadyExists(order_id).into();
        assert!(matches!(err, CoordinatorError::Store(_)));
    }

    #[test]
    fn test_lifecycle_error_message_passes_through() {
        let err: CoordinatorError = LifecycleError::invalid_state("order has no items").into();
        assert_eq!(err.to_string(), "Invalid order state: order has no items");
    }
}
