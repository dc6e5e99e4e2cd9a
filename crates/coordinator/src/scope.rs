//! Unit-of-work scope over a single order.

use common::{IdempotencyToken, OrderId, Version};
use domain::{OperationKind, Order};
use order_store::{CallOutcome, IdempotencyRecord, IdempotencyStore, OrderStore, StoreError};

/// Collects the reads, staged writes and call intents of one operation
/// on one order, and commits or discards them as a unit.
///
/// The scope holds no lock. Isolation between concurrent scopes on the
/// same order comes from optimistic versioning: the commit names the
/// version the scope was opened at, and the store rejects it if another
/// scope committed first. External calls therefore run with nothing
/// held, and intents recorded through the scope are durable immediately
/// so a crashed or rolled-back operation can be reconciled later.
pub struct TransactionScope<'a, S, I>
where
    S: OrderStore,
    I: IdempotencyStore,
{
    orders: &'a S,
    intents: &'a I,
    order_id: OrderId,
    snapshot: Order,
    /// Version the commit must name; `None` on the create path.
    base_version: Option<Version>,
    staged: Option<Order>,
    closed: bool,
}

impl<'a, S, I> TransactionScope<'a, S, I>
where
    S: OrderStore,
    I: IdempotencyStore,
{
    /// Opens a scope over an existing order, loading its current state.
    pub async fn open(
        orders: &'a S,
        intents: &'a I,
        order_id: OrderId,
    ) -> Result<Self, StoreError> {
        let snapshot = orders.load(order_id).await?;
        let base_version = snapshot.version();

        Ok(Self {
            orders,
            intents,
            order_id,
            snapshot,
            base_version: Some(base_version),
            staged: None,
            closed: false,
        })
    }

    /// Opens a scope that will create `order` on commit.
    pub fn open_new(orders: &'a S, intents: &'a I, order: Order) -> Self {
        let order_id = order.id();

        Self {
            orders,
            intents,
            order_id,
            snapshot: order.clone(),
            base_version: None,
            staged: Some(order),
            closed: false,
        }
    }

    /// Returns the order as this scope sees it: the staged state if one
    /// exists, the loaded snapshot otherwise.
    pub fn read(&self) -> &Order {
        self.staged.as_ref().unwrap_or(&self.snapshot)
    }

    /// Returns the version the commit will name, or `None` on the
    /// create path.
    pub fn base_version(&self) -> Option<Version> {
        self.base_version
    }

    /// Stages `order` as the state to persist on commit. Replaces any
    /// previously staged state.
    pub fn stage(&mut self, order: Order) {
        self.staged = Some(order);
    }

    /// Records the intent to perform `kind`, or returns the record that
    /// already governs it. Durable immediately, commit or not.
    pub async fn record_intent(
        &self,
        kind: OperationKind,
        candidate: IdempotencyToken,
    ) -> Result<IdempotencyRecord, StoreError> {
        self.intents.begin(self.order_id, kind, candidate).await
    }

    /// Marks a recorded intent as finished. Durable immediately.
    pub async fn finalize_intent(
        &self,
        kind: OperationKind,
        token: IdempotencyToken,
        outcome: CallOutcome,
    ) -> Result<(), StoreError> {
        self.intents
            .finalize(self.order_id, kind, token, outcome)
            .await
    }

    /// Commits the staged state and returns the committed order, whose
    /// version reflects the write.
    ///
    /// With nothing staged the commit writes nothing and returns the
    /// snapshot unchanged. A `VersionConflict` means another writer
    /// committed after this scope opened; nothing was written.
    pub async fn commit(mut self) -> Result<Order, StoreError> {
        self.closed = true;

        let Some(mut order) = self.staged.take() else {
            return Ok(self.snapshot.clone());
        };

        let version = match self.base_version {
            Some(expected) => self.orders.save(&order, expected).await?,
            None => self.orders.create(&order).await?,
        };
        order.set_version(version);

        Ok(order)
    }

    /// Discards the staged state. Intents recorded through the scope
    /// remain, so a retry can pick up where the calls left off.
    pub fn rollback(mut self) {
        self.closed = true;
        self.staged = None;
        tracing::debug!(order_id = %self.order_id, "transaction scope rolled back");
    }
}

impl<S, I> Drop for TransactionScope<'_, S, I>
where
    S: OrderStore,
    I: IdempotencyStore,
{
    fn drop(&mut self) {
        if !self.closed {
            tracing::debug!(
                order_id = %self.order_id,
                "transaction scope dropped without commit, staged state discarded"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{CustomerId, ItemSize, Money, OrderItem, PaymentRef};
    use order_store::{IdempotencyState, InMemoryIdempotencyStore, InMemoryOrderStore};

    fn new_order() -> Order {
        let items = vec![OrderItem::new(
            "latte",
            ItemSize::Medium,
            1,
            Money::from_cents(450),
        )];
        Order::new(CustomerId::new(), items).unwrap()
    }

    async fn stored_order(orders: &InMemoryOrderStore) -> OrderId {
        let order = new_order();
        let order_id = order.id();
        orders.create(&order).await.unwrap();
        order_id
    }

    #[tokio::test]
    async fn test_open_loads_snapshot_and_base_version() {
        let orders = InMemoryOrderStore::new();
        let intents = InMemoryIdempotencyStore::new();
        let order_id = stored_order(&orders).await;

        let scope = TransactionScope::open(&orders, &intents, order_id)
            .await
            .unwrap();

        assert_eq!(scope.read().id(), order_id);
        assert_eq!(scope.base_version(), Some(Version::first()));
    }

    #[tokio::test]
    async fn test_open_missing_order_fails() {
        let orders = InMemoryOrderStore::new();
        let intents = InMemoryIdempotencyStore::new();

        let result = TransactionScope::open(&orders, &intents, OrderId::new()).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_commit_without_stage_writes_nothing() {
        let orders = InMemoryOrderStore::new();
        let intents = InMemoryIdempotencyStore::new();
        let order_id = stored_order(&orders).await;

        let scope = TransactionScope::open(&orders, &intents, order_id)
            .await
            .unwrap();
        let committed = scope.commit().await.unwrap();

        assert_eq!(committed.version(), Version::first());
        let reloaded = orders.load(order_id).await.unwrap();
        assert_eq!(reloaded.version(), Version::first());
    }

    #[tokio::test]
    async fn test_commit_staged_state_bumps_version() {
        let orders = InMemoryOrderStore::new();
        let intents = InMemoryIdempotencyStore::new();
        let order_id = stored_order(&orders).await;

        let mut scope = TransactionScope::open(&orders, &intents, order_id)
            .await
            .unwrap();
        let mut order = scope.read().clone();
        order.mark_paid(PaymentRef::new("PAY-0001")).unwrap();
        scope.stage(order);

        let committed = scope.commit().await.unwrap();
        assert_eq!(committed.version(), Version::new(2));
        assert_eq!(
            orders.load(order_id).await.unwrap().version(),
            Version::new(2)
        );
    }

    #[tokio::test]
    async fn test_commit_detects_concurrent_write() {
        let orders = InMemoryOrderStore::new();
        let intents = InMemoryIdempotencyStore::new();
        let order_id = stored_order(&orders).await;

        let mut scope = TransactionScope::open(&orders, &intents, order_id)
            .await
            .unwrap();

        // Another writer commits while the scope is open.
        let mut other = orders.load(order_id).await.unwrap();
        other.mark_paid(PaymentRef::new("PAY-0001")).unwrap();
        orders.save(&other, Version::first()).await.unwrap();

        let mut order = scope.read().clone();
        order.mark_paid(PaymentRef::new("PAY-0002")).unwrap();
        scope.stage(order);

        let result = scope.commit().await;
        assert!(matches!(result, Err(StoreError::VersionConflict { .. })));

        // The earlier write is untouched.
        let stored = orders.load(order_id).await.unwrap();
        assert_eq!(stored.payment_ref().unwrap().as_str(), "PAY-0001");
    }

    #[tokio::test]
    async fn test_open_new_commit_creates_order() {
        let orders = InMemoryOrderStore::new();
        let intents = InMemoryIdempotencyStore::new();
        let order = new_order();
        let order_id = order.id();

        let scope = TransactionScope::open_new(&orders, &intents, order);
        assert_eq!(scope.base_version(), None);

        let committed = scope.commit().await.unwrap();
        assert_eq!(committed.version(), Version::first());
        assert_eq!(orders.order_count().await, 1);
        assert_eq!(orders.load(order_id).await.unwrap().id(), order_id);
    }

    #[tokio::test]
    async fn test_rollback_discards_staged_state() {
        let orders = InMemoryOrderStore::new();
        let intents = InMemoryIdempotencyStore::new();
        let order_id = stored_order(&orders).await;

        let mut scope = TransactionScope::open(&orders, &intents, order_id)
            .await
            .unwrap();
        let mut order = scope.read().clone();
        order.mark_paid(PaymentRef::new("PAY-0001")).unwrap();
        scope.stage(order);
        scope.rollback();

        let stored = orders.load(order_id).await.unwrap();
        assert!(stored.payment_ref().is_none());
        assert_eq!(stored.version(), Version::first());
    }

    #[tokio::test]
    async fn test_intents_survive_rollback() {
        let orders = InMemoryOrderStore::new();
        let intents = InMemoryIdempotencyStore::new();
        let order_id = stored_order(&orders).await;

        let scope = TransactionScope::open(&orders, &intents, order_id)
            .await
            .unwrap();
        let record = scope
            .record_intent(OperationKind::Charge, IdempotencyToken::new())
            .await
            .unwrap();
        scope.rollback();

        let latest = intents
            .latest(order_id, OperationKind::Charge)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.token, record.token);
        assert_eq!(latest.state, IdempotencyState::Pending);
    }

    #[tokio::test]
    async fn test_finalize_intent_records_outcome() {
        let orders = InMemoryOrderStore::new();
        let intents = InMemoryIdempotencyStore::new();
        let order_id = stored_order(&orders).await;

        let scope = TransactionScope::open(&orders, &intents, order_id)
            .await
            .unwrap();
        let record = scope
            .record_intent(OperationKind::Charge, IdempotencyToken::new())
            .await
            .unwrap();
        scope
            .finalize_intent(
                OperationKind::Charge,
                record.token,
                CallOutcome::Succeeded {
                    reference: Some("PAY-0001".to_string()),
                },
            )
            .await
            .unwrap();
        scope.rollback();

        let latest = intents
            .latest(order_id, OperationKind::Charge)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            latest.state,
            IdempotencyState::Succeeded {
                reference: Some("PAY-0001".to_string())
            }
        );
    }
}
