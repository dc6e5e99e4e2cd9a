//! Transactional coordination of the order lifecycle.
//!
//! This crate drives orders from `Created` through payment, preparation
//! and delivery (or cancellation) against pluggable storage and
//! external collaborators. Every mutating operation follows the same
//! pipeline:
//!
//! 1. Open a [`TransactionScope`] over the order.
//! 2. Ask the pure lifecycle (`domain::decide`) what the action needs.
//! 3. Execute the required external calls behind durable idempotency
//!    records, so a crash or retry never doubles a charge or a kitchen
//!    slot.
//! 4. Stage the transition and commit it under optimistic concurrency.
//!
//! Version conflicts retry with jittered exponential backoff; declined
//! payments surface immediately; integration failures retry the call
//! with an unchanged token and otherwise leave the record pending for a
//! later attempt to pick up. Operations run on worker tasks bounded by
//! a semaphore, and a caller-side timeout detaches from the worker
//! rather than interrupting it, so timed-out work still reconciles.

pub mod clients;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod scope;

pub use clients::{
    ClientError, InMemoryKitchenClient, InMemoryPaymentClient, KitchenClient, PaymentClient,
};
pub use config::CoordinatorConfig;
pub use coordinator::OrderCoordinator;
pub use error::CoordinatorError;
pub use scope::TransactionScope;
