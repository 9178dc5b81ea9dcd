//! In-memory store for development and testing.
//!
//! Implements every storage trait over concurrent maps. Single-record
//! atomicity comes from DashMap's per-key locking: `compare_and_swap` and
//! `try_acquire` hold the entry lock for the whole read-check-write.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use flotilla_types::{
    CircuitBreakerRecord, ConsistencyCheckRecord, DeploymentStateRecord, ErrorRecord, InstanceId,
    LockLease, LockToken, MetricSample, OperationName, StateTransitionRecord,
};

use crate::error::Result;
use crate::traits::{
    AcquireOutcome, BreakerStore, ConsistencyLogStore, ErrorStore, LockStore, MetricsStore,
    ReleaseOutcome, StateStore,
};

/// In-memory implementation of all store traits.
#[derive(Default)]
pub struct InMemoryStore {
    states: DashMap<InstanceId, Vec<DeploymentStateRecord>>,
    transitions: DashMap<InstanceId, Vec<StateTransitionRecord>>,
    breakers: DashMap<OperationName, CircuitBreakerRecord>,
    errors: DashMap<InstanceId, Vec<ErrorRecord>>,
    metrics: DashMap<InstanceId, Vec<MetricSample>>,
    checks: DashMap<InstanceId, Vec<ConsistencyCheckRecord>>,
    locks: DashMap<InstanceId, LockLease>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition audit rows for an instance, oldest first.
    pub fn transition_history(&self, instance: &InstanceId) -> Vec<StateTransitionRecord> {
        self.transitions
            .get(instance)
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }

    /// Consistency-check rows for an instance, oldest first.
    pub fn check_history(&self, instance: &InstanceId) -> Vec<ConsistencyCheckRecord> {
        self.checks
            .get(instance)
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }

    /// All metric samples for an instance, oldest first.
    pub fn metric_history(&self, instance: &InstanceId) -> Vec<MetricSample> {
        self.metrics
            .get(instance)
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn append_state(&self, record: &DeploymentStateRecord) -> Result<()> {
        self.states
            .entry(record.instance.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn latest_state(&self, instance: &InstanceId) -> Result<Option<DeploymentStateRecord>> {
        Ok(self
            .states
            .get(instance)
            .and_then(|rows| rows.last().cloned()))
    }

    async fn state_history(&self, instance: &InstanceId) -> Result<Vec<DeploymentStateRecord>> {
        Ok(self
            .states
            .get(instance)
            .map(|rows| rows.clone())
            .unwrap_or_default())
    }

    async fn append_transition(&self, record: &StateTransitionRecord) -> Result<()> {
        self.transitions
            .entry(record.instance.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl BreakerStore for InMemoryStore {
    async fn get(&self, operation: &OperationName) -> Result<Option<CircuitBreakerRecord>> {
        Ok(self.breakers.get(operation).map(|r| r.clone()))
    }

    async fn init(&self, operation: &OperationName) -> Result<CircuitBreakerRecord> {
        let record = self
            .breakers
            .entry(operation.clone())
            .or_insert_with(|| CircuitBreakerRecord::closed(operation.clone()));
        Ok(record.clone())
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        updated: &CircuitBreakerRecord,
    ) -> Result<bool> {
        match self.breakers.entry(updated.operation.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().version == expected_version {
                    entry.insert(updated.clone());
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(entry) => {
                // A fresh record may be swapped in against version 0.
                if expected_version == 0 {
                    entry.insert(updated.clone());
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    async fn force_put(&self, record: &CircuitBreakerRecord) -> Result<()> {
        self.breakers.insert(record.operation.clone(), record.clone());
        Ok(())
    }

    async fn remove(&self, operation: &OperationName) -> Result<()> {
        self.breakers.remove(operation);
        Ok(())
    }
}

#[async_trait]
impl ErrorStore for InMemoryStore {
    async fn append_error(&self, record: &ErrorRecord) -> Result<()> {
        self.errors
            .entry(record.instance.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn errors_since(
        &self,
        instance: &InstanceId,
        since: DateTime<Utc>,
    ) -> Result<Vec<ErrorRecord>> {
        Ok(self
            .errors
            .get(instance)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.timestamp >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl MetricsStore for InMemoryStore {
    async fn record_metric(&self, sample: &MetricSample) -> Result<()> {
        self.metrics
            .entry(sample.instance.clone())
            .or_default()
            .push(sample.clone());
        Ok(())
    }

    async fn recent_values(
        &self,
        instance: &InstanceId,
        metric: &str,
        limit: usize,
    ) -> Result<Vec<f64>> {
        Ok(self
            .metrics
            .get(instance)
            .map(|rows| {
                rows.iter()
                    .rev()
                    .filter(|s| s.name == metric)
                    .take(limit)
                    .map(|s| s.value)
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl ConsistencyLogStore for InMemoryStore {
    async fn append_check(&self, record: &ConsistencyCheckRecord) -> Result<()> {
        self.checks
            .entry(record.instance.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl LockStore for InMemoryStore {
    async fn try_acquire(
        &self,
        instance: &InstanceId,
        holder: LockToken,
        ttl: Duration,
    ) -> Result<AcquireOutcome> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl)
            .unwrap_or_else(|_| chrono::Duration::days(36500));
        let lease = LockLease {
            instance: instance.clone(),
            holder,
            acquired_at: now,
            expires_at: now + ttl,
        };

        match self.locks.entry(instance.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired(now) {
                    entry.insert(lease.clone());
                    Ok(AcquireOutcome::Acquired(lease))
                } else {
                    Ok(AcquireOutcome::Held(entry.get().clone()))
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(lease.clone());
                Ok(AcquireOutcome::Acquired(lease))
            }
        }
    }

    async fn release(&self, instance: &InstanceId, holder: &LockToken) -> Result<ReleaseOutcome> {
        match self.locks.entry(instance.clone()) {
            Entry::Occupied(entry) => {
                if &entry.get().holder == holder && !entry.get().is_expired(Utc::now()) {
                    entry.remove();
                    Ok(ReleaseOutcome::Released)
                } else {
                    Ok(ReleaseOutcome::NotHeld)
                }
            }
            Entry::Vacant(_) => Ok(ReleaseOutcome::NotHeld),
        }
    }

    async fn current_lease(&self, instance: &InstanceId) -> Result<Option<LockLease>> {
        Ok(self
            .locks
            .get(instance)
            .filter(|lease| !lease.is_expired(Utc::now()))
            .map(|lease| lease.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_types::{CircuitState, DeploymentState};
    use serde_json::json;

    #[tokio::test]
    async fn test_state_history_is_append_only() {
        let store = InMemoryStore::new();
        let instance = InstanceId::new("tst");

        for state in [DeploymentState::Deploying, DeploymentState::Complete] {
            let record =
                DeploymentStateRecord::new(instance.clone(), state, "step", json!({}));
            store.append_state(&record).await.unwrap();
        }

        let history = store.state_history(&instance).await.unwrap();
        assert_eq!(history.len(), 2);

        let latest = store.latest_state(&instance).await.unwrap().unwrap();
        assert_eq!(latest.state, DeploymentState::Complete);
    }

    #[tokio::test]
    async fn test_breaker_init_is_idempotent() {
        let store = InMemoryStore::new();
        let op = OperationName::new("tst:kas:launch");

        let first = store.init(&op).await.unwrap();
        let second = store.init(&op).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_breaker_cas_rejects_stale_version() {
        let store = InMemoryStore::new();
        let op = OperationName::new("tst:kas:launch");
        let record = store.init(&op).await.unwrap();

        let updated = record.transitioned(CircuitState::Open);
        assert!(store.compare_and_swap(record.version, &updated).await.unwrap());

        // A second writer holding the stale version loses.
        let stale = record.transitioned(CircuitState::HalfOpen);
        assert!(!store.compare_and_swap(record.version, &stale).await.unwrap());
    }

    #[tokio::test]
    async fn test_lock_single_holder() {
        let store = InMemoryStore::new();
        let instance = InstanceId::new("tst");
        let ttl = Duration::from_secs(60);

        let first = store
            .try_acquire(&instance, LockToken::generate(), ttl)
            .await
            .unwrap();
        assert!(matches!(first, AcquireOutcome::Acquired(_)));

        let second = store
            .try_acquire(&instance, LockToken::generate(), ttl)
            .await
            .unwrap();
        assert!(matches!(second, AcquireOutcome::Held(_)));
    }

    #[tokio::test]
    async fn test_lock_release_requires_holder() {
        let store = InMemoryStore::new();
        let instance = InstanceId::new("tst");
        let token = LockToken::generate();

        store
            .try_acquire(&instance, token.clone(), Duration::from_secs(60))
            .await
            .unwrap();

        let stranger = LockToken::generate();
        assert_eq!(
            store.release(&instance, &stranger).await.unwrap(),
            ReleaseOutcome::NotHeld
        );
        assert_eq!(
            store.release(&instance, &token).await.unwrap(),
            ReleaseOutcome::Released
        );
    }

    #[tokio::test]
    async fn test_expired_lease_is_reclaimable() {
        let store = InMemoryStore::new();
        let instance = InstanceId::new("tst");

        store
            .try_acquire(&instance, LockToken::generate(), Duration::from_millis(0))
            .await
            .unwrap();

        // TTL of zero expires immediately; next caller reclaims.
        let outcome = store
            .try_acquire(&instance, LockToken::generate(), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(matches!(outcome, AcquireOutcome::Acquired(_)));
    }

    #[tokio::test]
    async fn test_recent_values_filters_by_metric() {
        let store = InMemoryStore::new();
        let instance = InstanceId::new("tst");

        for value in [1.0, 2.0, 3.0] {
            store
                .record_metric(&MetricSample::new(
                    instance.clone(),
                    "startup_duration.keycloak",
                    value,
                ))
                .await
                .unwrap();
        }
        store
            .record_metric(&MetricSample::new(instance.clone(), "other", 99.0))
            .await
            .unwrap();

        let values = store
            .recent_values(&instance, "startup_duration.keycloak", 2)
            .await
            .unwrap();
        assert_eq!(values, vec![3.0, 2.0]);
    }
}
