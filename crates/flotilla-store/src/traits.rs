//! Storage trait definitions.
//!
//! One trait per persisted relation. Backends may implement any subset;
//! [`crate::InMemoryStore`] implements them all.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flotilla_types::{
    CircuitBreakerRecord, ConsistencyCheckRecord, DeploymentStateRecord, ErrorRecord, InstanceId,
    LockLease, LockToken, MetricSample, OperationName, StateTransitionRecord,
};

use crate::error::Result;

/// Append-only deployment-state history. The authoritative side of the
/// dual state store; the single source of truth on any divergence.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Append a new state record.
    async fn append_state(&self, record: &DeploymentStateRecord) -> Result<()>;

    /// Most recent state record for an instance.
    async fn latest_state(&self, instance: &InstanceId) -> Result<Option<DeploymentStateRecord>>;

    /// Full state history for an instance, oldest first.
    async fn state_history(&self, instance: &InstanceId) -> Result<Vec<DeploymentStateRecord>>;

    /// Append a transition audit row.
    async fn append_transition(&self, record: &StateTransitionRecord) -> Result<()>;
}

/// One current circuit-breaker row per operation.
#[async_trait]
pub trait BreakerStore: Send + Sync {
    /// Current record for an operation.
    async fn get(&self, operation: &OperationName) -> Result<Option<CircuitBreakerRecord>>;

    /// Create a closed record if none exists; returns the current record
    /// either way. Idempotent.
    async fn init(&self, operation: &OperationName) -> Result<CircuitBreakerRecord>;

    /// Replace the stored record only if its version still equals
    /// `expected_version`. Returns whether the swap happened.
    ///
    /// This is the primitive that keeps racing processes honest: of two
    /// processes attempting the same transition, exactly one observes
    /// `true`.
    async fn compare_and_swap(
        &self,
        expected_version: u64,
        updated: &CircuitBreakerRecord,
    ) -> Result<bool>;

    /// Unconditional overwrite. Operator/test tooling only.
    async fn force_put(&self, record: &CircuitBreakerRecord) -> Result<()>;

    /// Delete a record. Test/reset tooling only.
    async fn remove(&self, operation: &OperationName) -> Result<()>;
}

/// Append-only orchestration error log.
#[async_trait]
pub trait ErrorStore: Send + Sync {
    /// Append an error record.
    async fn append_error(&self, record: &ErrorRecord) -> Result<()>;

    /// Error records for an instance at or after `since`, oldest first.
    async fn errors_since(
        &self,
        instance: &InstanceId,
        since: DateTime<Utc>,
    ) -> Result<Vec<ErrorRecord>>;
}

/// Orchestration metrics, including `auto_recovery` outcomes and service
/// startup durations.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Record a sample.
    async fn record_metric(&self, sample: &MetricSample) -> Result<()>;

    /// Recent sample values for a metric on an instance, newest first,
    /// at most `limit` entries.
    async fn recent_values(
        &self,
        instance: &InstanceId,
        metric: &str,
        limit: usize,
    ) -> Result<Vec<f64>>;
}

/// Append-only consistency-check log.
#[async_trait]
pub trait ConsistencyLogStore: Send + Sync {
    /// Append a check record.
    async fn append_check(&self, record: &ConsistencyCheckRecord) -> Result<()>;
}

/// Outcome of a lease acquisition attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AcquireOutcome {
    /// The lease was granted to the caller.
    Acquired(LockLease),

    /// A live lease is held by someone else.
    Held(LockLease),
}

/// Outcome of a lease release attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The caller's lease was released.
    Released,

    /// No live lease was held by the caller.
    NotHeld,
}

/// TTL-lease lock rows, one live lease per instance at most.
///
/// Leases rather than bare locks: a lease left behind by a crashed holder
/// expires on its own and the next `try_acquire` reclaims it.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Atomically grant a lease if none is live for the instance.
    async fn try_acquire(
        &self,
        instance: &InstanceId,
        holder: LockToken,
        ttl: Duration,
    ) -> Result<AcquireOutcome>;

    /// Release the lease if `holder` owns it.
    async fn release(&self, instance: &InstanceId, holder: &LockToken) -> Result<ReleaseOutcome>;

    /// The live lease for an instance, if any.
    async fn current_lease(&self, instance: &InstanceId) -> Result<Option<LockLease>>;
}
