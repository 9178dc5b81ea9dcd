//! Durable circuit-breaker registry.
//!
//! Guards risky deployment operations with a per-operation state machine:
//!
//! - `Closed`: operations execute normally
//! - `Open`: operations are rejected without executing
//! - `HalfOpen`: the next operation runs as a trial
//!
//! State lives exclusively in the [`BreakerStore`]; a deployment retried
//! from a fresh process after a crash sees the same failure history as the
//! process that recorded it. The OPEN to HALF_OPEN transition is claimed
//! with compare-and-swap, so of several processes observing an expired
//! cooldown exactly one runs the trial and the rest fast-fail.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use flotilla_store::{BreakerStore, StoreError};
use flotilla_types::{CircuitBreakerRecord, CircuitState, OperationName};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// Time after the last failure before an open circuit admits a trial.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Failure modes of a guarded execution.
///
/// `Open` is deliberately distinct from `Inner` so operators can tell
/// "blocked by breaker" from "actually failed".
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The circuit is open; the action was not invoked.
    #[error("circuit open for {operation}, retry in {retry_after:?}")]
    Open {
        operation: OperationName,
        retry_after: Duration,
    },

    /// The durable store failed.
    #[error("breaker store error: {0}")]
    Store(#[from] StoreError),

    /// The action ran and failed; the original error is preserved.
    #[error("guarded operation failed: {0}")]
    Inner(E),
}

impl<E> BreakerError<E> {
    /// Whether this failure was a breaker fast-fail (action never ran).
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }
}

/// Registry of durable circuit breakers, one per operation name.
pub struct CircuitBreakerRegistry {
    store: Arc<dyn BreakerStore>,
    config: BreakerConfig,
}

impl CircuitBreakerRegistry {
    pub fn new(store: Arc<dyn BreakerStore>, config: BreakerConfig) -> Self {
        Self { store, config }
    }

    /// Create a closed record for an operation if none exists. Idempotent.
    pub async fn init(&self, operation: &OperationName) -> Result<CircuitBreakerRecord, StoreError> {
        self.store.init(operation).await
    }

    /// The current persisted record for an operation.
    pub async fn status(
        &self,
        operation: &OperationName,
    ) -> Result<Option<CircuitBreakerRecord>, StoreError> {
        self.store.get(operation).await
    }

    /// Force an operation back to closed with zero failures.
    /// Operator/test tooling; normal flow never calls this.
    pub async fn reset(&self, operation: &OperationName) -> Result<(), StoreError> {
        let version = match self.store.get(operation).await? {
            Some(record) => record.version + 1,
            None => 0,
        };
        let mut record = CircuitBreakerRecord::closed(operation.clone());
        record.version = version;
        info!(operation = %operation, "Circuit breaker reset to closed");
        self.store.force_put(&record).await
    }

    /// Run `action` under the breaker for `operation`.
    ///
    /// Open circuits fail fast with [`BreakerError::Open`] until the
    /// cooldown has elapsed; the cooldown check happens lazily here, not
    /// in a background task. A successful action closes the circuit and
    /// clears the failure count; a failing action is re-signaled as
    /// [`BreakerError::Inner`] after the record is updated.
    pub async fn execute<T, E, F, Fut>(
        &self,
        operation: &OperationName,
        action: F,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let record = self.store.init(operation).await?;

        if record.state == CircuitState::Open {
            match self.remaining_cooldown(&record) {
                Some(remaining) => {
                    debug!(
                        operation = %operation,
                        remaining = ?remaining,
                        "Circuit open, rejecting without executing"
                    );
                    return Err(BreakerError::Open {
                        operation: operation.clone(),
                        retry_after: remaining,
                    });
                }
                None => {
                    // Cooldown elapsed: claim the trial slot. Exactly one
                    // caller wins the swap; the rest keep fast-failing.
                    let trial = record.transitioned(CircuitState::HalfOpen);
                    let won = self.store.compare_and_swap(record.version, &trial).await?;
                    if !won {
                        return Err(BreakerError::Open {
                            operation: operation.clone(),
                            retry_after: Duration::ZERO,
                        });
                    }
                    info!(operation = %operation, "Circuit half-open, admitting trial");
                }
            }
        }

        match action().await {
            Ok(value) => {
                self.record_success(operation).await?;
                Ok(value)
            }
            Err(err) => {
                warn!(operation = %operation, error = %err, "Guarded operation failed");
                self.record_failure(operation).await?;
                Err(BreakerError::Inner(err))
            }
        }
    }

    /// Remaining cooldown for an open record, or `None` once elapsed.
    fn remaining_cooldown(&self, record: &CircuitBreakerRecord) -> Option<Duration> {
        let last_failure = record.last_failure_at?;
        let elapsed = (Utc::now() - last_failure).to_std().unwrap_or_default();
        if elapsed >= self.config.cooldown {
            None
        } else {
            Some(self.config.cooldown - elapsed)
        }
    }

    async fn record_success(&self, operation: &OperationName) -> Result<(), StoreError> {
        self.update_record(operation, |current| {
            if current.state == CircuitState::Closed && current.failure_count == 0 {
                return None;
            }
            if current.state == CircuitState::HalfOpen {
                info!(operation = %operation, "Trial succeeded, closing circuit");
            }
            let mut updated = current.transitioned(CircuitState::Closed);
            updated.failure_count = 0;
            Some(updated)
        })
        .await
    }

    async fn record_failure(&self, operation: &OperationName) -> Result<(), StoreError> {
        let threshold = self.config.failure_threshold;
        self.update_record(operation, |current| {
            let failures = current.failure_count + 1;
            let next_state = match current.state {
                // A failed trial reopens and restarts the cooldown.
                CircuitState::HalfOpen => CircuitState::Open,
                CircuitState::Closed if failures >= threshold => {
                    warn!(
                        operation = %operation,
                        failures,
                        "Failure threshold reached, opening circuit"
                    );
                    CircuitState::Open
                }
                state => state,
            };
            let mut updated = current.transitioned(next_state);
            updated.failure_count = failures;
            updated.last_failure_at = Some(Utc::now());
            Some(updated)
        })
        .await
    }

    /// Read-modify-write with compare-and-swap, retrying against fresh
    /// reads when a concurrent writer got there first.
    async fn update_record<F>(&self, operation: &OperationName, mut apply: F) -> Result<(), StoreError>
    where
        F: FnMut(&CircuitBreakerRecord) -> Option<CircuitBreakerRecord>,
    {
        for _ in 0..4 {
            let current = self.store.init(operation).await?;
            let Some(updated) = apply(&current) else {
                return Ok(());
            };
            if self.store.compare_and_swap(current.version, &updated).await? {
                return Ok(());
            }
        }
        Err(StoreError::Backend(format!(
            "breaker update contention for {operation}: compare-and-swap retries exhausted"
        )))
    }
}
