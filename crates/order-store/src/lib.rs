pub mod error;
pub mod idempotency;
pub mod memory;
pub mod store;

pub use common::{OrderId, Version};
pub use error::{Result, StoreError};
pub use idempotency::{CallOutcome, IdempotencyRecord, IdempotencyState, IdempotencyStore};
pub use memory::{InMemoryIdempotencyStore, InMemoryOrderStore};
pub use store::OrderStore;
