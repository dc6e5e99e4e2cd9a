//! Lifecycle decision logic.
//!
//! [`decide`] is the pure core of order coordination: given an order and
//! a requested action it returns the status the order should move to and
//! descriptors of the external calls the action requires. It performs no
//! I/O; issuing the calls and committing the transition is the
//! coordinator's job.

use serde::{Deserialize, Serialize};

use crate::error::LifecycleError;
use crate::order::Order;
use crate::status::OrderStatus;
use crate::value_objects::{KitchenRef, Money, OrderItem, PaymentRef};

/// An action requested on an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderAction {
    /// Charge the customer and move the order to `Paid`.
    Pay,

    /// Hand the order to the kitchen and move it to `InPreparation`.
    Schedule,

    /// Send the order out and move it to `Dispatched`.
    Dispatch,

    /// Confirm arrival and move the order to `Delivered`.
    Deliver,

    /// Cancel the order, compensating any completed external calls.
    Cancel,
}

impl OrderAction {
    /// Returns the action as a lowercase verb.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderAction::Pay => "pay",
            OrderAction::Schedule => "schedule",
            OrderAction::Dispatch => "dispatch",
            OrderAction::Deliver => "deliver",
            OrderAction::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for OrderAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The kind of external operation a required call belongs to.
///
/// Forms part of the idempotency key for an order, so each kind may have
/// at most one effective call per order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// Charging the customer's payment method.
    Charge,

    /// Refunding a previously completed charge.
    CancelCharge,

    /// Scheduling preparation with the kitchen.
    Schedule,

    /// Cancelling a previously scheduled preparation.
    CancelSchedule,
}

impl OperationKind {
    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Charge => "charge",
            OperationKind::CancelCharge => "cancel_charge",
            OperationKind::Schedule => "schedule",
            OperationKind::CancelSchedule => "cancel_schedule",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A description of one external call an action requires.
///
/// These are descriptors, not effects: the lifecycle never talks to a
/// provider itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequiredCall {
    /// Charge the customer for the order total.
    ChargePayment { amount: Money },

    /// Refund the charge identified by `payment_ref`.
    CancelCharge { payment_ref: PaymentRef },

    /// Ask the kitchen to prepare the given items.
    SchedulePreparation { items: Vec<OrderItem> },

    /// Withdraw the preparation identified by `kitchen_ref`.
    CancelPreparation { kitchen_ref: KitchenRef },
}

impl RequiredCall {
    /// Returns the operation kind this call belongs to.
    pub fn kind(&self) -> OperationKind {
        match self {
            RequiredCall::ChargePayment { .. } => OperationKind::Charge,
            RequiredCall::CancelCharge { .. } => OperationKind::CancelCharge,
            RequiredCall::SchedulePreparation { .. } => OperationKind::Schedule,
            RequiredCall::CancelPreparation { .. } => OperationKind::CancelSchedule,
        }
    }
}

/// The outcome of a lifecycle decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Status the order moves to once all required calls have completed.
    pub next_status: OrderStatus,

    /// External calls that must complete before the transition commits,
    /// in the order they should be issued.
    pub required_calls: Vec<RequiredCall>,
}

/// Decides how an action applies to an order.
///
/// Returns an error when the action is not legal in the order's current
/// status or when the order violates a precondition of the action.
pub fn decide(order: &Order, action: OrderAction) -> Result<Decision, LifecycleError> {
    match action {
        OrderAction::Pay => decide_pay(order),
        OrderAction::Schedule => decide_schedule(order),
        OrderAction::Dispatch => decide_dispatch(order),
        OrderAction::Deliver => decide_deliver(order),
        OrderAction::Cancel => decide_cancel(order),
    }
}

fn decide_pay(order: &Order) -> Result<Decision, LifecycleError> {
    if !order.status().can_pay() {
        return Err(invalid_transition(order, OrderAction::Pay));
    }
    if !order.has_items() {
        return Err(LifecycleError::invalid_state("order has no items to pay for"));
    }

    let amount = order.total_amount();
    if !amount.is_positive() {
        return Err(LifecycleError::invalid_state(format!(
            "order total must be positive, got {amount}"
        )));
    }

    Ok(Decision {
        next_status: OrderStatus::Paid,
        required_calls: vec![RequiredCall::ChargePayment { amount }],
    })
}

fn decide_schedule(order: &Order) -> Result<Decision, LifecycleError> {
    if !order.status().can_schedule() {
        return Err(invalid_transition(order, OrderAction::Schedule));
    }
    if !order.has_items() {
        return Err(LifecycleError::invalid_state(
            "order has no items to prepare",
        ));
    }

    Ok(Decision {
        next_status: OrderStatus::InPreparation,
        required_calls: vec![RequiredCall::SchedulePreparation {
            items: order.items().to_vec(),
        }],
    })
}

fn decide_dispatch(order: &Order) -> Result<Decision, LifecycleError> {
    if !order.status().can_dispatch() {
        return Err(invalid_transition(order, OrderAction::Dispatch));
    }

    Ok(Decision {
        next_status: OrderStatus::Dispatched,
        required_calls: vec![],
    })
}

fn decide_deliver(order: &Order) -> Result<Decision, LifecycleError> {
    if !order.status().can_deliver() {
        return Err(invalid_transition(order, OrderAction::Deliver));
    }

    Ok(Decision {
        next_status: OrderStatus::Delivered,
        required_calls: vec![],
    })
}

fn decide_cancel(order: &Order) -> Result<Decision, LifecycleError> {
    if !order.status().can_cancel() {
        return Err(invalid_transition(order, OrderAction::Cancel));
    }

    // Compensate in reverse order of acquisition: the kitchen slot was
    // taken after the charge, so it is released first.
    let mut calls = Vec::new();

    if order.status() == OrderStatus::InPreparation {
        let kitchen_ref = order.kitchen_ref().cloned().ok_or_else(|| {
            LifecycleError::invalid_state("order in preparation is missing its kitchen reference")
        })?;
        calls.push(RequiredCall::CancelPreparation { kitchen_ref });
    }

    if matches!(
        order.status(),
        OrderStatus::Paid | OrderStatus::InPreparation
    ) {
        let payment_ref = order.payment_ref().cloned().ok_or_else(|| {
            LifecycleError::invalid_state("paid order is missing its payment reference")
        })?;
        calls.push(RequiredCall::CancelCharge { payment_ref });
    }

    Ok(Decision {
        next_status: OrderStatus::Cancelled,
        required_calls: calls,
    })
}

fn invalid_transition(order: &Order, action: OrderAction) -> LifecycleError {
    LifecycleError::InvalidTransition {
        status: order.status(),
        action,
    }
}
