//! Deployment lock manager.
//!
//! Mutual exclusion per instance over TTL leases in the durable store.
//! Two different instances never contend; a lease left behind by a
//! crashed holder expires instead of needing manual cleanup. Acquisition
//! waits are always bounded, and a timeout is reported distinctly from
//! "already in progress".

use std::sync::Arc;
use std::time::Duration;

use flotilla_store::{AcquireOutcome, LockStore, ReleaseOutcome};
use flotilla_types::{InstanceId, LockLease, LockToken};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::LockError;

/// Lock manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Lease lifetime; a holder that neither releases nor finishes within
    /// this window loses the lock.
    pub lease_ttl: Duration,

    /// Polling interval while waiting for a held lock.
    pub poll_interval: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease_ttl: Duration::from_secs(600),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Per-instance exclusive deployment locks.
pub struct DeploymentLockManager {
    store: Arc<dyn LockStore>,
    config: LockConfig,
}

impl DeploymentLockManager {
    pub fn new(store: Arc<dyn LockStore>, config: LockConfig) -> Self {
        Self { store, config }
    }

    /// Acquire the lock for an instance, waiting up to `timeout`.
    ///
    /// A zero timeout makes a single non-blocking attempt and reports a
    /// held lock as [`LockError::AlreadyHeld`]; a non-zero timeout that
    /// elapses reports [`LockError::Timeout`] so callers can tell "still
    /// contended" from "never free".
    #[instrument(skip(self), fields(instance = %instance))]
    pub async fn acquire(
        &self,
        instance: &InstanceId,
        timeout: Duration,
    ) -> Result<LockLease, LockError> {
        let token = LockToken::generate();
        let started = tokio::time::Instant::now();

        loop {
            match self
                .store
                .try_acquire(instance, token.clone(), self.config.lease_ttl)
                .await?
            {
                AcquireOutcome::Acquired(lease) => {
                    info!(holder = %lease.holder, "Deployment lock acquired");
                    return Ok(lease);
                }
                AcquireOutcome::Held(current) => {
                    if timeout.is_zero() {
                        return Err(LockError::AlreadyHeld {
                            instance: instance.clone(),
                            holder: current.holder.to_string(),
                        });
                    }
                    let elapsed = started.elapsed();
                    if elapsed >= timeout {
                        return Err(LockError::Timeout {
                            instance: instance.clone(),
                            waited_secs: timeout.as_secs(),
                        });
                    }
                    let remaining = timeout - elapsed;
                    debug!(holder = %current.holder, "Lock held, waiting");
                    tokio::time::sleep(self.config.poll_interval.min(remaining)).await;
                }
            }
        }
    }

    /// Release a lease held by `token`.
    ///
    /// Releasing a lock the caller does not hold is an error, not a silent
    /// no-op.
    #[instrument(skip(self, token), fields(instance = %instance))]
    pub async fn release(&self, instance: &InstanceId, token: &LockToken) -> Result<(), LockError> {
        match self.store.release(instance, token).await? {
            ReleaseOutcome::Released => {
                info!("Deployment lock released");
                Ok(())
            }
            ReleaseOutcome::NotHeld => Err(LockError::NotHeld {
                instance: instance.clone(),
            }),
        }
    }

    /// The live lease on an instance, if any. Read-only.
    pub async fn current(&self, instance: &InstanceId) -> Result<Option<LockLease>, LockError> {
        Ok(self.store.current_lease(instance).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_store::InMemoryStore;

    fn manager() -> DeploymentLockManager {
        DeploymentLockManager::new(
            Arc::new(InMemoryStore::new()),
            LockConfig {
                lease_ttl: Duration::from_secs(60),
                poll_interval: Duration::from_millis(5),
            },
        )
    }

    #[tokio::test]
    async fn test_single_attempt_reports_already_held() {
        let manager = manager();
        let instance = InstanceId::new("tst");

        manager.acquire(&instance, Duration::ZERO).await.unwrap();

        let result = manager.acquire(&instance, Duration::ZERO).await;
        assert!(matches!(result, Err(LockError::AlreadyHeld { .. })));
    }

    #[tokio::test]
    async fn test_bounded_wait_times_out_distinctly() {
        let manager = manager();
        let instance = InstanceId::new("tst");

        manager.acquire(&instance, Duration::ZERO).await.unwrap();

        let result = manager
            .acquire(&instance, Duration::from_millis(30))
            .await;
        assert!(matches!(result, Err(LockError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_acquire_after_release() {
        let manager = manager();
        let instance = InstanceId::new("tst");

        let lease = manager.acquire(&instance, Duration::ZERO).await.unwrap();
        manager.release(&instance, &lease.holder).await.unwrap();
        manager.acquire(&instance, Duration::ZERO).await.unwrap();
    }

    #[tokio::test]
    async fn test_release_by_non_holder_errors() {
        let manager = manager();
        let instance = InstanceId::new("tst");

        manager.acquire(&instance, Duration::ZERO).await.unwrap();

        let stranger = LockToken::generate();
        let result = manager.release(&instance, &stranger).await;
        assert!(matches!(result, Err(LockError::NotHeld { .. })));
    }

    #[tokio::test]
    async fn test_different_instances_never_contend() {
        let manager = manager();

        manager
            .acquire(&InstanceId::new("hub"), Duration::ZERO)
            .await
            .unwrap();
        manager
            .acquire(&InstanceId::new("tst"), Duration::ZERO)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_single_attempts_allow_one_winner() {
        let store = Arc::new(InMemoryStore::new());
        let config = LockConfig {
            lease_ttl: Duration::from_secs(60),
            poll_interval: Duration::from_millis(5),
        };
        let instance = InstanceId::new("tst");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let config = config.clone();
            let instance = instance.clone();
            handles.push(tokio::spawn(async move {
                let manager = DeploymentLockManager::new(store, config);
                manager.acquire(&instance, Duration::ZERO).await.is_ok()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
