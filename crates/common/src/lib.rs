pub mod types;

pub use types::{IdempotencyToken, OrderId, Version};
