//! Kitchen service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{IdempotencyToken, OrderId};
use domain::{KitchenRef, OrderItem};

use crate::clients::ClientError;

/// Trait for the kitchen service.
///
/// Scheduling is deduplicated by idempotency token on the provider
/// side: the same token always maps to the same preparation slot.
#[async_trait]
pub trait KitchenClient: Send + Sync {
    /// Asks the kitchen to prepare the given items.
    async fn schedule_preparation(
        &self,
        order_id: OrderId,
        items: &[OrderItem],
        token: IdempotencyToken,
    ) -> Result<KitchenRef, ClientError>;

    /// Withdraws a previously scheduled preparation.
    async fn cancel_preparation(&self, kitchen_ref: &KitchenRef) -> Result<(), ClientError>;
}

#[derive(Debug, Default)]
struct InMemoryKitchenState {
    /// Provider-side dedup table: token to the reference it produced.
    by_token: HashMap<IdempotencyToken, KitchenRef>,
    /// Preparations scheduled and not yet cancelled.
    schedules: HashMap<KitchenRef, (OrderId, Vec<OrderItem>)>,
    cancelled: Vec<KitchenRef>,
    next_id: u32,
    schedule_calls: u32,
    fail_on_schedule: bool,
}

/// In-memory kitchen service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryKitchenClient {
    state: Arc<RwLock<InMemoryKitchenState>>,
}

impl InMemoryKitchenClient {
    /// Creates a new in-memory kitchen service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures every subsequent schedule call to fail with an
    /// integration error.
    pub fn set_fail_on_schedule(&self, fail: bool) {
        self.state.write().unwrap().fail_on_schedule = fail;
    }

    /// Returns the number of preparations currently scheduled.
    /// Cancelled preparations do not count.
    pub fn schedule_count(&self) -> usize {
        self.state.read().unwrap().schedules.len()
    }

    /// Returns the total number of schedule calls observed.
    pub fn schedule_calls(&self) -> u32 {
        self.state.read().unwrap().schedule_calls
    }

    /// Returns the items the kitchen accepted for a reference.
    pub fn scheduled_items(&self, kitchen_ref: &KitchenRef) -> Option<Vec<OrderItem>> {
        self.state
            .read()
            .unwrap()
            .schedules
            .get(kitchen_ref)
            .map(|(_, items)| items.clone())
    }

    /// Returns the references of cancelled preparations, oldest first.
    pub fn cancelled(&self) -> Vec<KitchenRef> {
        self.state.read().unwrap().cancelled.clone()
    }
}

#[async_trait]
impl KitchenClient for InMemoryKitchenClient {
    async fn schedule_preparation(
        &self,
        order_id: OrderId,
        items: &[OrderItem],
        token: IdempotencyToken,
    ) -> Result<KitchenRef, ClientError> {
        let mut state = self.state.write().unwrap();
        state.schedule_calls += 1;

        if state.fail_on_schedule {
            return Err(ClientError::Integration("kitchen unavailable".to_string()));
        }

        if let Some(existing) = state.by_token.get(&token) {
            return Ok(existing.clone());
        }

        state.next_id += 1;
        let kitchen_ref = KitchenRef::new(format!("KIT-{:04}", state.next_id));
        state.by_token.insert(token, kitchen_ref.clone());
        state
            .schedules
            .insert(kitchen_ref.clone(), (order_id, items.to_vec()));

        Ok(kitchen_ref)
    }

    async fn cancel_preparation(&self, kitchen_ref: &KitchenRef) -> Result<(), ClientError> {
        let mut state = self.state.write().unwrap();
        state.schedules.remove(kitchen_ref);
        state.cancelled.push(kitchen_ref.clone());
        Ok(())
    }
}
