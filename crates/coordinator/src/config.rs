//! Coordinator configuration.

use std::time::Duration;

use rand::Rng;

/// Tuning knobs for the order coordinator.
///
/// The defaults are sized for tests and small deployments. Callers
/// override individual fields through the `with_*` builders:
///
/// ```
/// use std::time::Duration;
/// use coordinator::CoordinatorConfig;
///
/// let config = CoordinatorConfig::default()
///     .with_max_attempts(3)
///     .with_operation_timeout(Some(Duration::from_secs(5)));
/// ```
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Attempts per operation when commits hit version conflicts.
    pub max_attempts: u32,

    /// Attempts per external call when the provider fails with an
    /// integration error. Declines are never retried.
    pub max_call_attempts: u32,

    /// Base delay for exponential backoff between attempts.
    pub base_backoff: Duration,

    /// Upper bound on any single backoff delay.
    pub max_backoff: Duration,

    /// Growth factor applied per attempt.
    pub backoff_multiplier: f64,

    /// Random headroom added to each delay, as a fraction of the
    /// computed delay. Zero disables jitter.
    pub jitter_factor: f64,

    /// Wall-clock budget for a single operation as seen by the caller.
    /// `None` waits indefinitely. A timed-out operation keeps running
    /// in the background and reconciles its own state.
    pub operation_timeout: Option<Duration>,

    /// Number of operations allowed to run concurrently.
    pub worker_permits: usize,

    /// How long finished idempotency records are kept before
    /// [`purge_idempotency_records`](crate::OrderCoordinator::purge_idempotency_records)
    /// removes them.
    pub idempotency_retention: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_call_attempts: 3,
            base_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
            operation_timeout: Some(Duration::from_secs(30)),
            worker_permits: 16,
            idempotency_retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl CoordinatorConfig {
    /// Sets the number of attempts per operation.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the number of attempts per external call.
    pub fn with_max_call_attempts(mut self, max_call_attempts: u32) -> Self {
        self.max_call_attempts = max_call_attempts;
        self
    }

    /// Sets the base backoff delay.
    pub fn with_base_backoff(mut self, base_backoff: Duration) -> Self {
        self.base_backoff = base_backoff;
        self
    }

    /// Sets the operation timeout.
    pub fn with_operation_timeout(mut self, operation_timeout: Option<Duration>) -> Self {
        self.operation_timeout = operation_timeout;
        self
    }

    /// Sets the worker pool size.
    pub fn with_worker_permits(mut self, worker_permits: usize) -> Self {
        self.worker_permits = worker_permits;
        self
    }

    /// Sets the idempotency record retention window.
    pub fn with_idempotency_retention(mut self, idempotency_retention: Duration) -> Self {
        self.idempotency_retention = idempotency_retention;
        self
    }

    /// Computes the backoff delay before retry `attempt` (1-based).
    ///
    /// The delay grows exponentially from `base_backoff`, gains up to
    /// `jitter_factor` of random headroom so concurrent retries spread
    /// out, and is capped at `max_backoff`.
    pub(crate) fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay = self
            .base_backoff
            .mul_f64(self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32));

        let jittered = if self.jitter_factor > 0.0 {
            let jitter = rand::thread_rng().gen_range(0.0..self.jitter_factor);
            delay.mul_f64(1.0 + jitter)
        } else {
            delay
        };

        jittered.min(self.max_backoff)
    }
}
