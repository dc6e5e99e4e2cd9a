//! Order entity.

use chrono::{DateTime, Utc};
use common::{OrderId, Version};
use serde::{Deserialize, Serialize};

use crate::error::LifecycleError;
use crate::lifecycle::OrderAction;
use crate::status::OrderStatus;
use crate::value_objects::{CustomerId, KitchenRef, Money, OrderItem, PaymentRef};

/// An order as persisted and coordinated by the system.
///
/// Carries the full lifecycle state: current status, line items, the
/// record version used for optimistic concurrency, and the provider
/// references issued by the payment and kitchen services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Unique order identifier.
    id: OrderId,

    /// Customer who placed the order.
    customer_id: CustomerId,

    /// Current lifecycle status.
    status: OrderStatus,

    /// Items in the order.
    items: Vec<OrderItem>,

    /// When the order was placed.
    created_at: DateTime<Utc>,

    /// Record version at the time this copy was loaded or committed.
    #[serde(default)]
    version: Version,

    /// Reference to the charge, set exactly once when payment succeeds.
    payment_ref: Option<PaymentRef>,

    /// Reference to the preparation slot, set exactly once when the
    /// kitchen accepts the order.
    kitchen_ref: Option<KitchenRef>,
}

impl Order {
    /// Creates a new order in `Created` status.
    ///
    /// Every item must have a quantity and a unit price greater than
    /// zero. An order with no items is accepted here; the lifecycle
    /// rejects it at payment time instead.
    pub fn new(customer_id: CustomerId, items: Vec<OrderItem>) -> Result<Self, LifecycleError> {
        for item in &items {
            if item.quantity == 0 {
                return Err(LifecycleError::InvalidQuantity {
                    quantity: item.quantity,
                });
            }
            if !item.unit_price.is_positive() {
                return Err(LifecycleError::InvalidPrice {
                    price: item.unit_price.cents(),
                });
            }
        }

        Ok(Self {
            id: OrderId::new(),
            customer_id,
            status: OrderStatus::Created,
            items,
            created_at: Utc::now(),
            version: Version::initial(),
            payment_ref: None,
            kitchen_ref: None,
        })
    }
}

// Query methods
impl Order {
    /// Returns the order ID.
    pub fn id(&self) -> OrderId {
        self.id
    }

    /// Returns the customer ID.
    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    /// Returns the current status.
    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Returns the items in the order.
    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    /// Returns the number of line items.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Returns when the order was placed.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the record version.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Sets the record version. Called by the store after a load or a
    /// committed write; the version is owned by the store, not the order.
    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    /// Returns the payment reference, if the order has been charged.
    pub fn payment_ref(&self) -> Option<&PaymentRef> {
        self.payment_ref.as_ref()
    }

    /// Returns the kitchen reference, if preparation has been scheduled.
    pub fn kitchen_ref(&self) -> Option<&KitchenRef> {
        self.kitchen_ref.as_ref()
    }

    /// Returns the total amount across all items.
    pub fn total_amount(&self) -> Money {
        self.items.iter().map(OrderItem::total_price).sum()
    }

    /// Returns true if the order has at least one item.
    pub fn has_items(&self) -> bool {
        !self.items.is_empty()
    }

    /// Returns true if the order is in a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// Transition methods
impl Order {
    /// Marks the order as paid, recording the charge reference.
    pub fn mark_paid(&mut self, payment_ref: PaymentRef) -> Result<(), LifecycleError> {
        if !self.status.can_pay() {
            return Err(LifecycleError::InvalidTransition {
                status: self.status,
                action: OrderAction::Pay,
            });
        }
        if self.payment_ref.is_some() {
            return Err(LifecycleError::invalid_state(
                "payment reference already set",
            ));
        }

        self.status = OrderStatus::Paid;
        self.payment_ref = Some(payment_ref);
        Ok(())
    }

    /// Marks the order as accepted by the kitchen, recording the
    /// preparation reference.
    pub fn mark_in_preparation(&mut self, kitchen_ref: KitchenRef) -> Result<(), LifecycleError> {
        if !self.status.can_schedule() {
            return Err(LifecycleError::InvalidTransition {
                status: self.status,
                action: OrderAction::Schedule,
            });
        }
        if self.payment_ref.is_none() {
            return Err(LifecycleError::invalid_state(
                "paid order is missing its payment reference",
            ));
        }
        if self.kitchen_ref.is_some() {
            return Err(LifecycleError::invalid_state(
                "kitchen reference already set",
            ));
        }

        self.status = OrderStatus::InPreparation;
        self.kitchen_ref = Some(kitchen_ref);
        Ok(())
    }

    /// Marks the order as dispatched.
    pub fn mark_dispatched(&mut self) -> Result<(), LifecycleError> {
        if !self.status.can_dispatch() {
            return Err(LifecycleError::InvalidTransition {
                status: self.status,
                action: OrderAction::Dispatch,
            });
        }

        self.status = OrderStatus::Dispatched;
        Ok(())
    }

    /// Marks the order as delivered.
    pub fn mark_delivered(&mut self) -> Result<(), LifecycleError> {
        if !self.status.can_deliver() {
            return Err(LifecycleError::InvalidTransition {
                status: self.status,
                action: OrderAction::Deliver,
            });
        }

        self.status = OrderStatus::Delivered;
        Ok(())
    }

    /// Marks the order as cancelled.
    ///
    /// Payment and kitchen references are retained for audit; the
    /// compensating calls are decided separately by the lifecycle.
    pub fn mark_cancelled(&mut self) -> Result<(), LifecycleError> {
        if !self.status.can_cancel() {
            return Err(LifecycleError::InvalidTransition {
                status: self.status,
                action: OrderAction::Cancel,
            });
        }

        self.status = OrderStatus::Cancelled;
        Ok(())
    }
}
