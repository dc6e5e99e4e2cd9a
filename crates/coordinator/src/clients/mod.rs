//! External collaborator traits and in-memory implementations.

use thiserror::Error;

pub mod kitchen;
pub mod payment;

pub use kitchen::{InMemoryKitchenClient, KitchenClient};
pub use payment::{InMemoryPaymentClient, PaymentClient};

/// Errors returned by external collaborators.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The provider rejected the request outright. Definitive; the
    /// same request will keep being rejected.
    #[error("Declined by provider")]
    Declined,

    /// Transport or provider failure. The effect of the request is
    /// unknown, so the caller may retry with the same token.
    #[error("Integration failure: {0}")]
    Integration(String),
}
