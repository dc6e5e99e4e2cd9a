//! Domain layer for the order lifecycle system.
//!
//! This crate provides the core domain model:
//! - Order entity with its status machine
//! - Pure lifecycle decision logic that maps an action to the external
//!   calls it requires, without performing any I/O
//! - Value objects for customers, items, money, and provider references

pub mod error;
pub mod lifecycle;
pub mod order;
pub mod status;
pub mod value_objects;

pub use error::LifecycleError;
pub use lifecycle::{Decision, OperationKind, OrderAction, RequiredCall, decide};
pub use order::Order;
pub use status::OrderStatus;
pub use value_objects::{CustomerId, ItemSize, KitchenRef, Money, OrderItem, PaymentRef};
