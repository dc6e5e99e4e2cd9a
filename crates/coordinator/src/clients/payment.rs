//! Payment provider trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::{IdempotencyToken, OrderId};
use domain::{Money, PaymentRef};

use crate::clients::ClientError;

/// Trait for the payment provider.
///
/// Charges are deduplicated by idempotency token on the provider side:
/// issuing `charge` twice with one token yields the same reference and
/// captures a single payment, so retries are always safe.
#[async_trait]
pub trait PaymentClient: Send + Sync {
    /// Charges the customer for the full order amount.
    async fn charge(
        &self,
        order_id: OrderId,
        amount: Money,
        token: IdempotencyToken,
    ) -> Result<PaymentRef, ClientError>;

    /// Releases a previously captured charge.
    async fn cancel_charge(&self, payment_ref: &PaymentRef) -> Result<(), ClientError>;
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    /// Provider-side dedup table: token to the reference it produced.
    by_token: HashMap<IdempotencyToken, PaymentRef>,
    /// Charges captured and not yet cancelled.
    charges: HashMap<PaymentRef, (OrderId, Money)>,
    cancelled: Vec<PaymentRef>,
    next_id: u32,
    charge_calls: u32,
    fail_on_charge: bool,
    fail_next_charges: u32,
    decline_on_charge: bool,
    charge_delay: Option<Duration>,
    in_flight: usize,
    max_in_flight: usize,
}

/// In-memory payment provider for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentClient {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentClient {
    /// Creates a new in-memory payment provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures every subsequent charge call to fail with an
    /// integration error.
    pub fn set_fail_on_charge(&self, fail: bool) {
        self.state.write().unwrap().fail_on_charge = fail;
    }

    /// Fails the next `n` charge calls with integration errors, then
    /// recovers.
    pub fn fail_next_charges(&self, n: u32) {
        self.state.write().unwrap().fail_next_charges = n;
    }

    /// Configures every subsequent charge call to be declined.
    pub fn set_decline_on_charge(&self, decline: bool) {
        self.state.write().unwrap().decline_on_charge = decline;
    }

    /// Adds an artificial delay to every charge call.
    pub fn set_charge_delay(&self, delay: Duration) {
        self.state.write().unwrap().charge_delay = Some(delay);
    }

    /// Returns the number of charges currently captured. Cancelled
    /// charges do not count.
    pub fn charge_count(&self) -> usize {
        self.state.read().unwrap().charges.len()
    }

    /// Returns the total number of charge calls observed, including
    /// failed and deduplicated ones.
    pub fn charge_calls(&self) -> u32 {
        self.state.read().unwrap().charge_calls
    }

    /// Returns the references of cancelled charges, oldest first.
    pub fn cancelled(&self) -> Vec<PaymentRef> {
        self.state.read().unwrap().cancelled.clone()
    }

    /// Returns the highest number of charge calls that were in flight
    /// at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.state.read().unwrap().max_in_flight
    }
}

#[async_trait]
impl PaymentClient for InMemoryPaymentClient {
    async fn charge(
        &self,
        order_id: OrderId,
        amount: Money,
        token: IdempotencyToken,
    ) -> Result<PaymentRef, ClientError> {
        // Guard must not be held across the sleep.
        let delay = {
            let mut state = self.state.write().unwrap();
            state.charge_calls += 1;
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            state.charge_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().unwrap();
        state.in_flight -= 1;

        if state.fail_next_charges > 0 {
            state.fail_next_charges -= 1;
            return Err(ClientError::Integration(
                "payment gateway unavailable".to_string(),
            ));
        }
        if state.fail_on_charge {
            return Err(ClientError::Integration(
                "payment gateway unavailable".to_string(),
            ));
        }
        if state.decline_on_charge {
            return Err(ClientError::Declined);
        }

        if let Some(existing) = state.by_token.get(&token) {
            return Ok(existing.clone());
        }

        state.next_id += 1;
        let payment_ref = PaymentRef::new(format!("PAY-{:04}", state.next_id));
        state.by_token.insert(token, payment_ref.clone());
        state.charges.insert(payment_ref.clone(), (order_id, amount));

        Ok(payment_ref)
    }

    async fn cancel_charge(&self, payment_ref: &PaymentRef) -> Result<(), ClientError> {
        let mut state = self.state.write().unwrap();
        state.charges.remove(payment_ref);
        state.cancelled.push(payment_ref.clone());
        Ok(())
    }
}
