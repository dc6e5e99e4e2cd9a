//! Order lifecycle coordinator.

use std::sync::Arc;
use std::time::Instant;

use common::{IdempotencyToken, OrderId};
use domain::{
    CustomerId, KitchenRef, Order, OrderAction, OrderItem, PaymentRef, RequiredCall, decide,
};
use order_store::{CallOutcome, IdempotencyState, IdempotencyStore, OrderStore, StoreError};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};

use crate::clients::{ClientError, KitchenClient, PaymentClient};
use crate::config::CoordinatorConfig;
use crate::error::CoordinatorError;
use crate::scope::TransactionScope;

/// Drives orders through their lifecycle against pluggable storage and
/// external collaborators.
///
/// Every mutating operation runs the same pipeline on a bounded worker
/// task: open a [`TransactionScope`], ask the pure lifecycle for a
/// decision, execute the required external calls behind durable
/// idempotency records, then commit under optimistic concurrency.
/// Version conflicts retry with jittered backoff; a caller-side timeout
/// detaches from the worker, which finishes and reconciles on its own.
pub struct OrderCoordinator<S, I, P, K>
where
    S: OrderStore,
    I: IdempotencyStore,
    P: PaymentClient,
    K: KitchenClient,
{
    inner: Arc<Inner<S, I, P, K>>,
}

impl<S, I, P, K> Clone for OrderCoordinator<S, I, P, K>
where
    S: OrderStore,
    I: IdempotencyStore,
    P: PaymentClient,
    K: KitchenClient,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<S, I, P, K> {
    orders: S,
    intents: I,
    payment: P,
    kitchen: K,
    config: CoordinatorConfig,
    permits: Semaphore,
}

/// Why a single attempt of an operation did not produce an order.
enum AttemptError {
    /// The commit lost an optimistic-concurrency race. Retryable.
    Conflict,

    /// Anything else. Surfaced to the caller as-is.
    Fatal(CoordinatorError),
}

fn fatal(err: impl Into<CoordinatorError>) -> AttemptError {
    AttemptError::Fatal(err.into())
}

/// What an executed external call contributed to the transition.
enum CallEffect {
    Payment(PaymentRef),
    Kitchen(KitchenRef),
    None,
}

impl<S, I, P, K> OrderCoordinator<S, I, P, K>
where
    S: OrderStore + 'static,
    I: IdempotencyStore + 'static,
    P: PaymentClient + 'static,
    K: KitchenClient + 'static,
{
    /// Creates a coordinator over the given stores and clients.
    pub fn new(orders: S, intents: I, payment: P, kitchen: K, config: CoordinatorConfig) -> Self {
        let permits = Semaphore::new(config.worker_permits);

        Self {
            inner: Arc::new(Inner {
                orders,
                intents,
                payment,
                kitchen,
                config,
                permits,
            }),
        }
    }

    /// Creates a new order in `Created` status and persists it.
    ///
    /// Item validation happens before any worker is involved, so a
    /// malformed order never reaches the store.
    #[tracing::instrument(skip(self, items), fields(item_count = items.len()))]
    pub async fn create_order(
        &self,
        customer_id: CustomerId,
        items: Vec<OrderItem>,
    ) -> Result<Order, CoordinatorError> {
        let order = Order::new(customer_id, items)?;
        let order_id = order.id();

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let _permit = inner.acquire_permit().await?;
            metrics::counter!("order_operations_total", "action" => "create").increment(1);
            let start = Instant::now();

            let scope = TransactionScope::open_new(&inner.orders, &inner.intents, order);
            let committed = scope.commit().await.map_err(CoordinatorError::from)?;

            metrics::histogram!("order_operation_duration_seconds", "action" => "create")
                .record(start.elapsed().as_secs_f64());
            tracing::info!(
                order_id = %committed.id(),
                total = %committed.total_amount(),
                "order created"
            );
            Ok(committed)
        });

        self.supervise(order_id, handle).await
    }

    /// Charges the customer and moves the order to `Paid`.
    #[tracing::instrument(skip(self))]
    pub async fn pay_order(&self, order_id: OrderId) -> Result<Order, CoordinatorError> {
        self.run_action(order_id, OrderAction::Pay).await
    }

    /// Hands the order to the kitchen and moves it to `InPreparation`.
    #[tracing::instrument(skip(self))]
    pub async fn schedule_order(&self, order_id: OrderId) -> Result<Order, CoordinatorError> {
        self.run_action(order_id, OrderAction::Schedule).await
    }

    /// Moves the order to `Dispatched`. Signalled by the kitchen when a
    /// courier picks the order up; requires no external call.
    #[tracing::instrument(skip(self))]
    pub async fn dispatch_order(&self, order_id: OrderId) -> Result<Order, CoordinatorError> {
        self.run_action(order_id, OrderAction::Dispatch).await
    }

    /// Moves the order to `Delivered`, its happy-path terminal status.
    #[tracing::instrument(skip(self))]
    pub async fn deliver_order(&self, order_id: OrderId) -> Result<Order, CoordinatorError> {
        self.run_action(order_id, OrderAction::Deliver).await
    }

    /// Cancels the order, compensating any completed external calls.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Order, CoordinatorError> {
        self.run_action(order_id, OrderAction::Cancel).await
    }

    /// Loads the current state of an order.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order, CoordinatorError> {
        let order = self.inner.orders.load(order_id).await?;
        Ok(order)
    }

    /// Removes finished idempotency records older than the configured
    /// retention window. Pending records always survive: they gate
    /// retries of calls whose outcome is still unknown.
    #[tracing::instrument(skip(self))]
    pub async fn purge_idempotency_records(&self) -> Result<usize, CoordinatorError> {
        let purged = self
            .inner
            .intents
            .purge_older_than(self.inner.config.idempotency_retention)
            .await?;

        if purged > 0 {
            metrics::counter!("idempotency_records_purged").increment(purged as u64);
            tracing::info!(purged, "purged idempotency records");
        }
        Ok(purged)
    }

    /// Runs `action` on a worker task and supervises it.
    async fn run_action(
        &self,
        order_id: OrderId,
        action: OrderAction,
    ) -> Result<Order, CoordinatorError> {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let _permit = inner.acquire_permit().await?;
            metrics::counter!("order_operations_total", "action" => action.as_str()).increment(1);
            let start = Instant::now();

            let result = inner.drive(order_id, action).await;

            metrics::histogram!("order_operation_duration_seconds", "action" => action.as_str())
                .record(start.elapsed().as_secs_f64());
            result
        });

        self.supervise(order_id, handle).await
    }

    /// Applies the configured timeout to a worker task.
    ///
    /// On timeout the handle is dropped and the worker keeps running to
    /// completion, finalizing its intent records and committing if it
    /// can; the caller only loses the result. A later load observes
    /// whatever the worker reconciled.
    async fn supervise(
        &self,
        order_id: OrderId,
        handle: JoinHandle<Result<Order, CoordinatorError>>,
    ) -> Result<Order, CoordinatorError> {
        let Some(budget) = self.inner.config.operation_timeout else {
            return flatten_join(handle.await);
        };

        let start = Instant::now();
        match tokio::time::timeout(budget, handle).await {
            Ok(joined) => flatten_join(joined),
            Err(_) => {
                let elapsed = start.elapsed();
                metrics::counter!("order_operation_timeouts").increment(1);
                tracing::warn!(
                    %order_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "operation exceeded its budget, worker continues in the background"
                );
                Err(CoordinatorError::Timeout { order_id, elapsed })
            }
        }
    }
}

fn flatten_join(
    joined: Result<Result<Order, CoordinatorError>, JoinError>,
) -> Result<Order, CoordinatorError> {
    match joined {
        Ok(result) => result,
        Err(err) => Err(CoordinatorError::Internal(format!(
            "worker task failed: {err}"
        ))),
    }
}

impl<S, I, P, K> Inner<S, I, P, K>
where
    S: OrderStore,
    I: IdempotencyStore,
    P: PaymentClient,
    K: KitchenClient,
{
    async fn acquire_permit(&self) -> Result<tokio::sync::SemaphorePermit<'_>, CoordinatorError> {
        self.permits
            .acquire()
            .await
            .map_err(|_| CoordinatorError::Internal("worker pool closed".to_string()))
    }

    /// Runs the attempt loop for one action until it commits, fails
    /// fatally, or exhausts its conflict retries.
    async fn drive(
        &self,
        order_id: OrderId,
        action: OrderAction,
    ) -> Result<Order, CoordinatorError> {
        let mut attempt = 1u32;
        loop {
            match self.try_action(order_id, action).await {
                Ok(order) => return Ok(order),
                Err(AttemptError::Conflict) if attempt < self.config.max_attempts => {
                    let delay = self.config.backoff_delay(attempt);
                    tracing::debug!(
                        %order_id,
                        %action,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "commit lost the version race, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(AttemptError::Conflict) => {
                    metrics::counter!("order_operation_conflicts").increment(1);
                    tracing::warn!(%order_id, %action, attempt, "giving up after repeated version conflicts");
                    return Err(CoordinatorError::Conflict {
                        order_id,
                        attempts: attempt,
                    });
                }
                Err(AttemptError::Fatal(err)) => return Err(err),
            }
        }
    }

    /// One attempt: open a scope, decide, execute the required calls,
    /// stage the transition and commit.
    async fn try_action(
        &self,
        order_id: OrderId,
        action: OrderAction,
    ) -> Result<Order, AttemptError> {
        let mut scope = TransactionScope::open(&self.orders, &self.intents, order_id)
            .await
            .map_err(fatal)?;

        let decision = match decide(scope.read(), action) {
            Ok(decision) => decision,
            Err(err) => {
                scope.rollback();
                return Err(fatal(err));
            }
        };

        let mut payment_ref = None;
        let mut kitchen_ref = None;
        for call in &decision.required_calls {
            match self.execute_call(&scope, scope.read(), call).await {
                Ok(CallEffect::Payment(reference)) => payment_ref = Some(reference),
                Ok(CallEffect::Kitchen(reference)) => kitchen_ref = Some(reference),
                Ok(CallEffect::None) => {}
                Err(err) => {
                    scope.rollback();
                    return Err(err);
                }
            }
        }

        let mut order = scope.read().clone();
        let applied = match action {
            OrderAction::Pay => match payment_ref {
                Some(reference) => order.mark_paid(reference),
                None => {
                    scope.rollback();
                    return Err(AttemptError::Fatal(CoordinatorError::Internal(
                        "charge produced no payment reference".to_string(),
                    )));
                }
            },
            OrderAction::Schedule => match kitchen_ref {
                Some(reference) => order.mark_in_preparation(reference),
                None => {
                    scope.rollback();
                    return Err(AttemptError::Fatal(CoordinatorError::Internal(
                        "schedule produced no kitchen reference".to_string(),
                    )));
                }
            },
            OrderAction::Dispatch => order.mark_dispatched(),
            OrderAction::Deliver => order.mark_delivered(),
            OrderAction::Cancel => order.mark_cancelled(),
        };
        if let Err(err) = applied {
            scope.rollback();
            return Err(fatal(err));
        }

        scope.stage(order);
        match scope.commit().await {
            Ok(committed) => {
                tracing::info!(
                    %order_id,
                    status = %committed.status(),
                    version = %committed.version(),
                    "order transition committed"
                );
                Ok(committed)
            }
            Err(StoreError::VersionConflict { .. }) => Err(AttemptError::Conflict),
            Err(err) => Err(fatal(err)),
        }
    }

    /// Executes one required call behind its idempotency record.
    ///
    /// The record returned by `record_intent` governs the call: a
    /// `Succeeded` record short-circuits to its stored reference, a
    /// `Pending` one lends its token so the provider can deduplicate,
    /// and a fresh record carries the new token. Integration failures
    /// are retried with the token unchanged; a decline is finalized and
    /// surfaced without retry.
    async fn execute_call(
        &self,
        scope: &TransactionScope<'_, S, I>,
        order: &Order,
        call: &RequiredCall,
    ) -> Result<CallEffect, AttemptError> {
        let order_id = order.id();
        let kind = call.kind();

        let record = scope
            .record_intent(kind, IdempotencyToken::new())
            .await
            .map_err(fatal)?;

        if let IdempotencyState::Succeeded { reference } = &record.state {
            metrics::counter!("external_calls_reused").increment(1);
            tracing::debug!(%order_id, %kind, "reusing recorded call outcome");
            return effect_from_reference(call, reference.as_deref());
        }
        let token = record.token;

        let mut attempt = 1u32;
        loop {
            match self.issue_call(order, call, token).await {
                Ok(effect) => {
                    let reference = match &effect {
                        CallEffect::Payment(r) => Some(r.as_str().to_string()),
                        CallEffect::Kitchen(r) => Some(r.as_str().to_string()),
                        CallEffect::None => None,
                    };
                    scope
                        .finalize_intent(kind, token, CallOutcome::Succeeded { reference })
                        .await
                        .map_err(fatal)?;
                    return Ok(effect);
                }
                Err(ClientError::Declined) => {
                    scope
                        .finalize_intent(kind, token, CallOutcome::Declined)
                        .await
                        .map_err(fatal)?;
                    metrics::counter!("payment_declines").increment(1);
                    tracing::warn!(%order_id, %kind, "provider declined the call");
                    return Err(AttemptError::Fatal(CoordinatorError::PaymentDeclined(
                        order_id,
                    )));
                }
                Err(ClientError::Integration(reason))
                    if attempt < self.config.max_call_attempts =>
                {
                    let delay = self.config.backoff_delay(attempt);
                    tracing::warn!(
                        %order_id,
                        %kind,
                        attempt,
                        reason,
                        "external call failed, retrying with the same token"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(ClientError::Integration(reason)) => {
                    // The record stays pending: the call's effect is
                    // unknown, and the token gates any later retry.
                    tracing::error!(%order_id, %kind, reason, "external call failed for good");
                    return Err(AttemptError::Fatal(CoordinatorError::Integration {
                        order_id,
                        kind,
                        reason,
                    }));
                }
            }
        }
    }

    /// Issues the provider call a descriptor names.
    async fn issue_call(
        &self,
        order: &Order,
        call: &RequiredCall,
        token: IdempotencyToken,
    ) -> Result<CallEffect, ClientError> {
        match call {
            RequiredCall::ChargePayment { amount } => {
                let reference = self.payment.charge(order.id(), *amount, token).await?;
                Ok(CallEffect::Payment(reference))
            }
            RequiredCall::CancelCharge { payment_ref } => {
                self.payment.cancel_charge(payment_ref).await?;
                Ok(CallEffect::None)
            }
            RequiredCall::SchedulePreparation { items } => {
                let reference = self
                    .kitchen
                    .schedule_preparation(order.id(), items, token)
                    .await?;
                Ok(CallEffect::Kitchen(reference))
            }
            RequiredCall::CancelPreparation { kitchen_ref } => {
                self.kitchen.cancel_preparation(kitchen_ref).await?;
                Ok(CallEffect::None)
            }
        }
    }
}

/// Rebuilds a call's effect from the reference stored on a `Succeeded`
/// idempotency record.
fn effect_from_reference(
    call: &RequiredCall,
    reference: Option<&str>,
) -> Result<CallEffect, AttemptError> {
    match call {
        RequiredCall::ChargePayment { .. } => match reference {
            Some(reference) => Ok(CallEffect::Payment(PaymentRef::new(reference))),
            None => Err(AttemptError::Fatal(CoordinatorError::Internal(
                "charge record carries no payment reference".to_string(),
            ))),
        },
        RequiredCall::SchedulePreparation { .. } => match reference {
            Some(reference) => Ok(CallEffect::Kitchen(KitchenRef::new(reference))),
            None => Err(AttemptError::Fatal(CoordinatorError::Internal(
                "schedule record carries no kitchen reference".to_string(),
            ))),
        },
        RequiredCall::CancelCharge { .. } | RequiredCall::CancelPreparation { .. } => {
            Ok(CallEffect::None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{InMemoryKitchenClient, InMemoryPaymentClient};
    use common::Version;
    use domain::{ItemSize, LifecycleError, Money, OrderStatus};
    use order_store::{InMemoryIdempotencyStore, InMemoryOrderStore};

    type TestCoordinator = OrderCoordinator<
        InMemoryOrderStore,
        InMemoryIdempotencyStore,
        InMemoryPaymentClient,
        InMemoryKitchenClient,
    >;

    fn setup() -> (TestCoordinator, InMemoryPaymentClient, InMemoryKitchenClient) {
        setup_with_config(CoordinatorConfig::default())
    }

    fn setup_with_config(
        config: CoordinatorConfig,
    ) -> (TestCoordinator, InMemoryPaymentClient, InMemoryKitchenClient) {
        let payment = InMemoryPaymentClient::new();
        let kitchen = InMemoryKitchenClient::new();
        let coordinator = OrderCoordinator::new(
            InMemoryOrderStore::new(),
            InMemoryIdempotencyStore::new(),
            payment.clone(),
            kitchen.clone(),
            config,
        );
        (coordinator, payment, kitchen)
    }

    fn two_drinks() -> Vec<OrderItem> {
        vec![
            OrderItem::new("latte", ItemSize::Large, 2, Money::from_cents(500)),
            OrderItem::new("espresso", ItemSize::Small, 1, Money::from_cents(350)),
        ]
    }

    #[tokio::test]
    async fn test_create_order_round_trip() {
        let (coordinator, _, _) = setup();

        let order = coordinator
            .create_order(CustomerId::new(), two_drinks())
            .await
            .unwrap();

        assert_eq!(order.status(), OrderStatus::Created);
        assert_eq!(order.version(), Version::first());
        assert_eq!(order.total_amount(), Money::from_cents(1350));

        let loaded = coordinator.get_order(order.id()).await.unwrap();
        assert_eq!(loaded.status(), OrderStatus::Created);
        assert_eq!(loaded.version(), Version::first());
        assert_eq!(loaded.items(), order.items());
    }

    #[tokio::test]
    async fn test_create_order_rejects_invalid_items() {
        let (coordinator, _, _) = setup();
        let items = vec![OrderItem::new("latte", ItemSize::Small, 0, Money::from_cents(450))];

        let result = coordinator.create_order(CustomerId::new(), items).await;
        assert!(matches!(
            result,
            Err(CoordinatorError::Lifecycle(
                LifecycleError::InvalidQuantity { quantity: 0 }
            ))
        ));
    }

    #[tokio::test]
    async fn test_get_order_not_found() {
        let (coordinator, _, _) = setup();
        let result = coordinator.get_order(OrderId::new()).await;
        assert!(matches!(result, Err(CoordinatorError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_pay_order_charges_and_commits() {
        let (coordinator, payment, _) = setup();
        let order = coordinator
            .create_order(CustomerId::new(), two_drinks())
            .await
            .unwrap();

        let paid = coordinator.pay_order(order.id()).await.unwrap();

        assert_eq!(paid.status(), OrderStatus::Paid);
        assert_eq!(paid.version(), Version::new(2));
        assert_eq!(paid.payment_ref().unwrap().as_str(), "PAY-0001");
        assert_eq!(payment.charge_count(), 1);
    }

    #[tokio::test]
    async fn test_pay_order_not_found() {
        let (coordinator, _, _) = setup();
        let result = coordinator.pay_order(OrderId::new()).await;
        assert!(matches!(result, Err(CoordinatorError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_pay_empty_order_is_rejected() {
        let (coordinator, payment, _) = setup();
        let order = coordinator
            .create_order(CustomerId::new(), vec![])
            .await
            .unwrap();

        let result = coordinator.pay_order(order.id()).await;
        assert!(matches!(
            result,
            Err(CoordinatorError::Lifecycle(
                LifecycleError::InvalidOrderState { .. }
            ))
        ));
        assert_eq!(payment.charge_count(), 0);

        let loaded = coordinator.get_order(order.id()).await.unwrap();
        assert_eq!(loaded.status(), OrderStatus::Created);
        assert_eq!(loaded.version(), Version::first());
    }

    #[tokio::test]
    async fn test_schedule_before_pay_is_rejected() {
        let (coordinator, _, kitchen) = setup();
        let order = coordinator
            .create_order(CustomerId::new(), two_drinks())
            .await
            .unwrap();

        let result = coordinator.schedule_order(order.id()).await;
        assert!(matches!(
            result,
            Err(CoordinatorError::Lifecycle(
                LifecycleError::InvalidTransition { .. }
            ))
        ));
        assert_eq!(kitchen.schedule_count(), 0);
    }

    #[tokio::test]
    async fn test_full_lifecycle_through_delivery() {
        let (coordinator, payment, kitchen) = setup();
        let order = coordinator
            .create_order(CustomerId::new(), two_drinks())
            .await
            .unwrap();
        let order_id = order.id();

        coordinator.pay_order(order_id).await.unwrap();
        let scheduled = coordinator.schedule_order(order_id).await.unwrap();
        assert_eq!(scheduled.status(), OrderStatus::InPreparation);
        assert_eq!(scheduled.kitchen_ref().unwrap().as_str(), "KIT-0001");

        let kitchen_items = kitchen
            .scheduled_items(scheduled.kitchen_ref().unwrap())
            .unwrap();
        assert_eq!(kitchen_items.len(), 2);

        coordinator.dispatch_order(order_id).await.unwrap();
        let delivered = coordinator.deliver_order(order_id).await.unwrap();

        assert_eq!(delivered.status(), OrderStatus::Delivered);
        assert_eq!(delivered.version(), Version::new(5));
        assert!(delivered.is_terminal());
        assert_eq!(payment.charge_count(), 1);
        assert_eq!(kitchen.schedule_count(), 1);
    }

    #[tokio::test]
    async fn test_deliver_before_dispatch_is_rejected() {
        let (coordinator, _, _) = setup();
        let order = coordinator
            .create_order(CustomerId::new(), two_drinks())
            .await
            .unwrap();
        coordinator.pay_order(order.id()).await.unwrap();
        coordinator.schedule_order(order.id()).await.unwrap();

        let result = coordinator.deliver_order(order.id()).await;
        assert!(matches!(
            result,
            Err(CoordinatorError::Lifecycle(
                LifecycleError::InvalidTransition { .. }
            ))
        ));
    }

    #[tokio::test]
    async fn test_cancel_created_order_needs_no_calls() {
        let (coordinator, payment, kitchen) = setup();
        let order = coordinator
            .create_order(CustomerId::new(), two_drinks())
            .await
            .unwrap();

        let cancelled = coordinator.cancel_order(order.id()).await.unwrap();

        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        assert_eq!(cancelled.version(), Version::new(2));
        assert_eq!(payment.charge_calls(), 0);
        assert!(kitchen.cancelled().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_after_pay_refunds_the_charge() {
        let (coordinator, payment, _) = setup();
        let order = coordinator
            .create_order(CustomerId::new(), two_drinks())
            .await
            .unwrap();
        let paid = coordinator.pay_order(order.id()).await.unwrap();
        let payment_ref = paid.payment_ref().unwrap().clone();

        let cancelled = coordinator.cancel_order(order.id()).await.unwrap();

        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        assert_eq!(payment.cancelled(), vec![payment_ref.clone()]);
        assert_eq!(payment.charge_count(), 0);
        // The reference stays on the cancelled order for audit.
        assert_eq!(cancelled.payment_ref(), Some(&payment_ref));
    }

    #[tokio::test]
    async fn test_cancel_in_preparation_compensates_both_calls() {
        let (coordinator, payment, kitchen) = setup();
        let order = coordinator
            .create_order(CustomerId::new(), two_drinks())
            .await
            .unwrap();
        coordinator.pay_order(order.id()).await.unwrap();
        let scheduled = coordinator.schedule_order(order.id()).await.unwrap();

        let cancelled = coordinator.cancel_order(order.id()).await.unwrap();

        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        assert_eq!(
            kitchen.cancelled(),
            vec![scheduled.kitchen_ref().unwrap().clone()]
        );
        assert_eq!(
            payment.cancelled(),
            vec![scheduled.payment_ref().unwrap().clone()]
        );
        assert_eq!(payment.charge_count(), 0);
        assert_eq!(kitchen.schedule_count(), 0);
    }

    #[tokio::test]
    async fn test_declined_payment_leaves_order_untouched() {
        let (coordinator, payment, _) = setup();
        payment.set_decline_on_charge(true);
        let order = coordinator
            .create_order(CustomerId::new(), two_drinks())
            .await
            .unwrap();

        let result = coordinator.pay_order(order.id()).await;
        assert!(matches!(result, Err(CoordinatorError::PaymentDeclined(id)) if id == order.id()));

        let loaded = coordinator.get_order(order.id()).await.unwrap();
        assert_eq!(loaded.status(), OrderStatus::Created);
        assert_eq!(loaded.version(), Version::first());
        assert!(loaded.payment_ref().is_none());
    }

    #[tokio::test]
    async fn test_pay_succeeds_after_a_decline() {
        let (coordinator, payment, _) = setup();
        let order = coordinator
            .create_order(CustomerId::new(), two_drinks())
            .await
            .unwrap();

        payment.set_decline_on_charge(true);
        coordinator.pay_order(order.id()).await.unwrap_err();

        payment.set_decline_on_charge(false);
        let paid = coordinator.pay_order(order.id()).await.unwrap();

        assert_eq!(paid.status(), OrderStatus::Paid);
        assert_eq!(payment.charge_count(), 1);
    }

    #[tokio::test]
    async fn test_integration_failure_retries_call_then_succeeds() {
        let (coordinator, payment, _) = setup_with_config(
            CoordinatorConfig::default().with_base_backoff(std::time::Duration::from_millis(1)),
        );
        payment.fail_next_charges(2);
        let order = coordinator
            .create_order(CustomerId::new(), two_drinks())
            .await
            .unwrap();

        let paid = coordinator.pay_order(order.id()).await.unwrap();

        assert_eq!(paid.status(), OrderStatus::Paid);
        assert_eq!(payment.charge_calls(), 3);
        assert_eq!(payment.charge_count(), 1);
    }

    #[tokio::test]
    async fn test_integration_failure_exhausts_and_surfaces() {
        let (coordinator, payment, _) = setup_with_config(
            CoordinatorConfig::default()
                .with_max_call_attempts(2)
                .with_base_backoff(std::time::Duration::from_millis(1)),
        );
        payment.set_fail_on_charge(true);
        let order = coordinator
            .create_order(CustomerId::new(), two_drinks())
            .await
            .unwrap();

        let result = coordinator.pay_order(order.id()).await;
        assert!(matches!(
            result,
            Err(CoordinatorError::Integration { kind, .. })
                if kind == domain::OperationKind::Charge
        ));
        assert_eq!(payment.charge_calls(), 2);

        let loaded = coordinator.get_order(order.id()).await.unwrap();
        assert_eq!(loaded.status(), OrderStatus::Created);
        assert_eq!(loaded.version(), Version::first());
    }

    #[tokio::test]
    async fn test_purge_removes_finished_records() {
        let (coordinator, _, _) = setup_with_config(
            CoordinatorConfig::default().with_idempotency_retention(std::time::Duration::ZERO),
        );
        let order = coordinator
            .create_order(CustomerId::new(), two_drinks())
            .await
            .unwrap();
        coordinator.pay_order(order.id()).await.unwrap();

        let purged = coordinator.purge_idempotency_records().await.unwrap();
        assert_eq!(purged, 1);
    }
}
