//! Order status machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// Status transitions:
/// ```text
/// Created ──► Paid ──► InPreparation ──► Dispatched ──► Delivered
///    │          │            │
///    └──────────┴────────────┴──► Cancelled
/// ```
///
/// Once an order is dispatched it can no longer be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Order has been placed but not yet paid.
    #[default]
    Created,

    /// Payment has been charged, awaiting kitchen scheduling.
    Paid,

    /// The kitchen has accepted the order for preparation.
    InPreparation,

    /// Order has left the kitchen and is on its way.
    Dispatched,

    /// Order has reached the customer (terminal status).
    Delivered,

    /// Order was cancelled (terminal status).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if the order can be paid in this status.
    pub fn can_pay(&self) -> bool {
        matches!(self, OrderStatus::Created)
    }

    /// Returns true if preparation can be scheduled in this status.
    pub fn can_schedule(&self) -> bool {
        matches!(self, OrderStatus::Paid)
    }

    /// Returns true if the order can be dispatched in this status.
    pub fn can_dispatch(&self) -> bool {
        matches!(self, OrderStatus::InPreparation)
    }

    /// Returns true if the order can be delivered in this status.
    pub fn can_deliver(&self) -> bool {
        matches!(self, OrderStatus::Dispatched)
    }

    /// Returns true if the order can be cancelled in this status.
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            OrderStatus::Created | OrderStatus::Paid | OrderStatus::InPreparation
        )
    }

    /// Returns true if this is a terminal status (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "Created",
            OrderStatus::Paid => "Paid",
            OrderStatus::InPreparation => "InPreparation",
            OrderStatus::Dispatched => "Dispatched",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
