use async_trait::async_trait;
use common::{OrderId, Version};
use domain::Order;

use crate::Result;

/// Core trait for order store implementations.
///
/// The store owns the version column: writes are accepted only when the
/// caller names the version it read, and the stored version is the one
/// that counts. All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a brand-new order.
    ///
    /// Fails with `AlreadyExists` if a record with this order's ID is
    /// already present. Returns the first committed version.
    async fn create(&self, order: &Order) -> Result<Version>;

    /// Loads the current state of an order.
    ///
    /// The returned copy carries the stored version, regardless of what
    /// the persisted payload embeds. Fails with `NotFound` if no record
    /// exists.
    async fn load(&self, order_id: OrderId) -> Result<Order>;

    /// Persists updated state for an existing order.
    ///
    /// The write succeeds only if the stored version still equals
    /// `expected`; otherwise it fails with `VersionConflict` and leaves
    /// the record untouched. Returns the new version on success.
    async fn save(&self, order: &Order, expected: Version) -> Result<Version>;
}
