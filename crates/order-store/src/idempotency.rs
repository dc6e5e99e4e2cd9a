//! Idempotency bookkeeping for external calls.
//!
//! Before the coordinator issues a call to a payment or kitchen
//! provider it records an intent keyed by `(order, operation kind)`.
//! The record survives crashes, so a later attempt can tell whether the
//! call already happened and reuse its result instead of charging or
//! scheduling twice.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{IdempotencyToken, OrderId};
use domain::OperationKind;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Progress state of a recorded intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdempotencyState {
    /// The call was about to be issued; whether it reached the provider
    /// is unknown.
    Pending,

    /// The provider completed the call. `reference` carries the
    /// provider-issued reference for calls that produce one.
    Succeeded { reference: Option<String> },

    /// The provider rejected the call outright.
    Declined,
}

impl IdempotencyState {
    /// Returns true if no further attempt will change this state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, IdempotencyState::Pending)
    }
}

/// Terminal outcome reported when an external call finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// The call completed, optionally with a provider reference.
    Succeeded { reference: Option<String> },

    /// The provider declined the call.
    Declined,
}

impl From<CallOutcome> for IdempotencyState {
    fn from(outcome: CallOutcome) -> Self {
        match outcome {
            CallOutcome::Succeeded { reference } => IdempotencyState::Succeeded { reference },
            CallOutcome::Declined => IdempotencyState::Declined,
        }
    }
}

/// One recorded intent to perform an external call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// Order the call belongs to.
    pub order_id: OrderId,

    /// Which external operation the call performs.
    pub kind: OperationKind,

    /// Deduplication token the call carries to the provider.
    pub token: IdempotencyToken,

    /// Current progress state.
    pub state: IdempotencyState,

    /// When the intent was recorded.
    pub created_at: DateTime<Utc>,

    /// When the state last changed.
    pub updated_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// Creates a fresh pending record.
    pub fn pending(order_id: OrderId, kind: OperationKind, token: IdempotencyToken) -> Self {
        let now = Utc::now();
        Self {
            order_id,
            kind,
            token,
            state: IdempotencyState::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the record is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Store for idempotency records.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Records the intent to perform `kind` for `order_id`, or returns
    /// the record that already governs it.
    ///
    /// If the latest record for the key is `Pending` or `Succeeded` it
    /// is returned unchanged and `candidate` is discarded: the earlier
    /// attempt's token keeps governing the call. If the latest record is
    /// `Declined`, or no record exists, a new `Pending` record carrying
    /// `candidate` is inserted and returned.
    ///
    /// The check-and-insert is atomic, so two racing attempts always
    /// agree on a single governing record.
    async fn begin(
        &self,
        order_id: OrderId,
        kind: OperationKind,
        candidate: IdempotencyToken,
    ) -> Result<IdempotencyRecord>;

    /// Marks the intent identified by `token` as finished.
    ///
    /// Fails with `IntentNotFound` if no record matches the key and
    /// token.
    async fn finalize(
        &self,
        order_id: OrderId,
        kind: OperationKind,
        token: IdempotencyToken,
        outcome: CallOutcome,
    ) -> Result<()>;

    /// Returns the latest record for `(order_id, kind)`, if any.
    async fn latest(&self, order_id: OrderId, kind: OperationKind)
    -> Result<Option<IdempotencyRecord>>;

    /// Deletes terminal records whose last update is older than
    /// `retention`. Pending records are never purged, whatever their
    /// age. Returns the number of records removed.
    async fn purge_older_than(&self, retention: std::time::Duration) -> Result<usize>;
}
