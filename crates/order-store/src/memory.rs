use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{IdempotencyToken, OrderId, Version};
use domain::{OperationKind, Order};
use tokio::sync::RwLock;

use crate::{
    CallOutcome, IdempotencyRecord, IdempotencyState, IdempotencyStore, OrderStore, Result,
    StoreError,
};

/// A persisted order record.
///
/// The version column is authoritative; the version embedded in the
/// payload is overwritten on load.
#[derive(Debug, Clone)]
struct StoredOrder {
    payload: serde_json::Value,
    version: Version,
}

/// In-memory order store.
///
/// Keeps every record behind a single lock, so the version check and
/// the write happen atomically, the same guarantee a relational
/// implementation gets from a conditional UPDATE.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    records: Arc<RwLock<HashMap<OrderId, StoredOrder>>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Clears all records.
    pub async fn clear(&self) {
        self.records.write().await.clear();
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: &Order) -> Result<Version> {
        let mut records = self.records.write().await;

        if records.contains_key(&order.id()) {
            return Err(StoreError::AlreadyExists(order.id()));
        }

        let version = Version::first();
        records.insert(
            order.id(),
            StoredOrder {
                payload: serde_json::to_value(order)?,
                version,
            },
        );

        Ok(version)
    }

    async fn load(&self, order_id: OrderId) -> Result<Order> {
        let records = self.records.read().await;
        let stored = records
            .get(&order_id)
            .ok_or(StoreError::NotFound(order_id))?;

        let mut order: Order = serde_json::from_value(stored.payload.clone())?;
        order.set_version(stored.version);
        Ok(order)
    }

    async fn save(&self, order: &Order, expected: Version) -> Result<Version> {
        let mut records = self.records.write().await;
        let stored = records
            .get_mut(&order.id())
            .ok_or(StoreError::NotFound(order.id()))?;

        if stored.version != expected {
            tracing::debug!(
                order_id = %order.id(),
                expected = %expected,
                actual = %stored.version,
                "rejecting stale write"
            );
            metrics::counter!("order_store_version_conflicts").increment(1);
            return Err(StoreError::VersionConflict {
                order_id: order.id(),
                expected,
                actual: stored.version,
            });
        }

        let version = expected.next();
        stored.payload = serde_json::to_value(order)?;
        stored.version = version;

        Ok(version)
    }
}

#[derive(Default)]
struct IdempotencyLog {
    records: Vec<IdempotencyRecord>,
}

impl IdempotencyLog {
    /// Latest record for a key. Insertion order doubles as recency,
    /// records are only ever appended.
    fn latest(&self, order_id: OrderId, kind: OperationKind) -> Option<&IdempotencyRecord> {
        self.records
            .iter()
            .rev()
            .find(|r| r.order_id == order_id && r.kind == kind)
    }
}

/// In-memory idempotency store.
#[derive(Clone, Default)]
pub struct InMemoryIdempotencyStore {
    log: Arc<RwLock<IdempotencyLog>>,
}

impl InMemoryIdempotencyStore {
    /// Creates a new empty idempotency store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records held.
    pub async fn record_count(&self) -> usize {
        self.log.read().await.records.len()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn begin(
        &self,
        order_id: OrderId,
        kind: OperationKind,
        candidate: IdempotencyToken,
    ) -> Result<IdempotencyRecord> {
        let mut log = self.log.write().await;

        if let Some(existing) = log.latest(order_id, kind)
            && !matches!(existing.state, IdempotencyState::Declined)
        {
            return Ok(existing.clone());
        }

        let record = IdempotencyRecord::pending(order_id, kind, candidate);
        log.records.push(record.clone());
        Ok(record)
    }

    async fn finalize(
        &self,
        order_id: OrderId,
        kind: OperationKind,
        token: IdempotencyToken,
        outcome: CallOutcome,
    ) -> Result<()> {
        let mut log = self.log.write().await;

        let record = log
            .records
            .iter_mut()
            .rev()
            .find(|r| r.order_id == order_id && r.kind == kind && r.token == token)
            .ok_or(StoreError::IntentNotFound { order_id, kind })?;

        record.state = outcome.into();
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn latest(
        &self,
        order_id: OrderId,
        kind: OperationKind,
    ) -> Result<Option<IdempotencyRecord>> {
        let log = self.log.read().await;
        Ok(log.latest(order_id, kind).cloned())
    }

    async fn purge_older_than(&self, retention: std::time::Duration) -> Result<usize> {
        let cutoff = Utc::now() - retention;
        let mut log = self.log.write().await;

        let before = log.records.len();
        log.records
            .retain(|r| !(r.is_terminal() && r.updated_at < cutoff));

        Ok(before - log.records.len())
    }
}
