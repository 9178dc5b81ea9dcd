//! State consistency engine.
//!
//! Owns the dual write (durable authoritative store first, local mirror
//! second), divergence detection, and reconciliation. The authoritative
//! store always wins when both sides exist and disagree; the one exception
//! is a mirror strictly newer than the authoritative record, which a
//! background reconciler must not downgrade while a deployment is writing.

use std::sync::Arc;

use chrono::Utc;
use flotilla_store::{ConsistencyLogStore, StateStore};
use flotilla_types::{
    ConsistencyAction, ConsistencyCheckRecord, ConsistencyVerdict, DeploymentState,
    DeploymentStateRecord, InstanceId, StateTransitionRecord,
};
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::error::{Result, StateError};
use crate::mirror::StateMirror;
use crate::probe::RuntimeProbe;

/// Outcome of a consistency check.
///
/// `consistent` is the verdict of the comparison itself; `action` records
/// what (if anything) was done about it. The two are deliberately
/// separate: a check with `auto_fix` reports inconsistent even though the
/// stores are equal afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub consistent: bool,
    pub action: ConsistencyAction,
}

/// Keeps the local mirror and the authoritative store in agreement.
pub struct StateConsistencyEngine {
    store: Arc<dyn StateStore>,
    mirror: Arc<dyn StateMirror>,
    log: Arc<dyn ConsistencyLogStore>,
}

impl StateConsistencyEngine {
    pub fn new(
        store: Arc<dyn StateStore>,
        mirror: Arc<dyn StateMirror>,
        log: Arc<dyn ConsistencyLogStore>,
    ) -> Self {
        Self { store, mirror, log }
    }

    /// Record a state transition: authoritative append first, then the
    /// mirror, then the transition audit row.
    #[instrument(skip(self, reason, metadata), fields(instance = %instance, state = %state))]
    pub async fn set_state(
        &self,
        instance: &InstanceId,
        state: DeploymentState,
        reason: impl Into<String>,
        metadata: Value,
    ) -> Result<DeploymentStateRecord> {
        let previous = self.store.latest_state(instance).await?;
        let record = DeploymentStateRecord::new(instance.clone(), state, reason, metadata);

        self.store.append_state(&record).await?;
        self.mirror.write(&record).await?;

        let transition = StateTransitionRecord {
            instance: instance.clone(),
            from_state: previous
                .map(|p| p.state)
                .unwrap_or(DeploymentState::Unknown),
            to_state: state,
            timestamp: Utc::now(),
        };
        self.store.append_transition(&transition).await?;

        info!(
            from = %transition.from_state,
            to = %transition.to_state,
            "Deployment state updated"
        );
        Ok(record)
    }

    /// Current state from the authoritative store (the SSOT).
    pub async fn get_state(&self, instance: &InstanceId) -> Result<Option<DeploymentStateRecord>> {
        Ok(self.store.latest_state(instance).await?)
    }

    /// Compare the mirror against the authoritative record.
    ///
    /// Consistent when both are absent or both carry the same label; any
    /// other combination is inconsistent. With `auto_fix`, inconsistency
    /// triggers [`Self::reconcile`]. Every check is appended to the
    /// consistency log.
    #[instrument(skip(self), fields(instance = %instance))]
    pub async fn validate_consistency(
        &self,
        instance: &InstanceId,
        auto_fix: bool,
    ) -> Result<ConsistencyReport> {
        let durable = self.store.latest_state(instance).await?;
        let local = self.mirror.read(instance).await?;

        let consistent = match (&durable, &local) {
            (None, None) => true,
            (Some(d), Some(l)) => d.state == l.state,
            _ => false,
        };

        let mut action = ConsistencyAction::None;
        if !consistent {
            warn!(
                durable = durable.as_ref().map(|r| r.state.to_string()),
                local = local.as_ref().map(|r| r.state.to_string()),
                "State divergence detected"
            );
            if auto_fix {
                action = self.reconcile(instance).await?;
            }
        }

        self.log
            .append_check(&ConsistencyCheckRecord {
                instance: instance.clone(),
                verdict: if consistent {
                    ConsistencyVerdict::Consistent
                } else {
                    ConsistencyVerdict::Inconsistent
                },
                action,
                timestamp: Utc::now(),
            })
            .await?;

        Ok(ConsistencyReport { consistent, action })
    }

    /// Resolve divergence toward the authoritative store.
    ///
    /// - Both exist, equal: nothing to do
    /// - Both exist, differ: the authoritative record is copied over the
    ///   mirror, unless the mirror is strictly newer (left alone)
    /// - Only authoritative: the mirror is created from it
    /// - Only mirror: the local record is promoted into the authoritative
    ///   store, so a crash between the halves of a dual write loses
    ///   nothing
    /// - Neither: both stay absent
    #[instrument(skip(self), fields(instance = %instance))]
    pub async fn reconcile(&self, instance: &InstanceId) -> Result<ConsistencyAction> {
        let durable = self.store.latest_state(instance).await?;
        let local = self.mirror.read(instance).await?;

        let action = match (durable, local) {
            (Some(d), Some(l)) => {
                if d.state == l.state {
                    ConsistencyAction::None
                } else if l.timestamp > d.timestamp {
                    warn!(
                        mirror_state = %l.state,
                        durable_state = %d.state,
                        "Mirror is newer than authoritative record, leaving it"
                    );
                    ConsistencyAction::SkippedNewerMirror
                } else {
                    self.mirror.write(&d).await?;
                    ConsistencyAction::MirrorRewritten
                }
            }
            (Some(d), None) => {
                self.mirror.write(&d).await?;
                ConsistencyAction::MirrorCreated
            }
            (None, Some(l)) => {
                self.store.append_state(&l).await?;
                ConsistencyAction::PromotedLocal
            }
            (None, None) => ConsistencyAction::None,
        };

        if action != ConsistencyAction::None {
            info!(action = %action, "Reconciled deployment state");
        }
        Ok(action)
    }

    /// Recompute the checksum of the authoritative record and compare with
    /// the stored value. A mismatch means corruption (tampering or a
    /// partial write) and is surfaced, never auto-fixed.
    pub async fn validate_checksum(&self, instance: &InstanceId) -> Result<()> {
        if let Some(record) = self.store.latest_state(instance).await? {
            let actual = record.calculate_checksum();
            if record.checksum != actual {
                return Err(StateError::ChecksumMismatch {
                    instance: instance.clone(),
                    expected: record.checksum,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Seed state from the running system when no record exists anywhere.
    ///
    /// No running components: `Unknown`. Components running without any
    /// state history: `Verifying`. An existing authoritative record is
    /// returned untouched.
    #[instrument(skip(self, probe), fields(instance = %instance))]
    pub async fn infer_from_runtime(
        &self,
        instance: &InstanceId,
        probe: &dyn RuntimeProbe,
    ) -> Result<DeploymentStateRecord> {
        if let Some(existing) = self.store.latest_state(instance).await? {
            return Ok(existing);
        }

        let components =
            probe
                .running_components(instance)
                .await
                .map_err(|reason| StateError::Probe {
                    instance: instance.clone(),
                    reason,
                })?;

        let (state, reason, metadata) = if components.is_empty() {
            (
                DeploymentState::Unknown,
                "no running components found",
                json!({}),
            )
        } else {
            let names: Vec<&str> = components.iter().map(|c| c.as_str()).collect();
            (
                DeploymentState::Verifying,
                "running components found without state history",
                json!({ "running": names }),
            )
        };

        info!(state = %state, "Inferred deployment state from runtime");
        self.set_state(instance, state, reason, metadata).await
    }

    /// Delete local-only residue markers older than the retention window.
    /// Authoritative history is never touched here.
    pub async fn cleanup_stale(&self, retention_days: u32) -> Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(retention_days));
        let mut removed = 0;

        for marker in self.mirror.markers().await? {
            if marker.created_at < cutoff {
                self.mirror
                    .remove_marker(&marker.instance, &marker.name)
                    .await?;
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, retention_days, "Cleaned up stale markers");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::{InMemoryStateMirror, StaleMarker};
    use crate::probe::FixedRuntimeProbe;
    use flotilla_store::InMemoryStore;

    fn engine() -> (
        StateConsistencyEngine,
        Arc<InMemoryStore>,
        Arc<InMemoryStateMirror>,
    ) {
        let store = Arc::new(InMemoryStore::new());
        let mirror = Arc::new(InMemoryStateMirror::new());
        let engine = StateConsistencyEngine::new(store.clone(), mirror.clone(), store.clone());
        (engine, store, mirror)
    }

    #[tokio::test]
    async fn test_set_state_writes_both_sides() {
        let (engine, store, mirror) = engine();
        let instance = InstanceId::new("tst");

        engine
            .set_state(&instance, DeploymentState::Complete, "done", json!({}))
            .await
            .unwrap();

        let durable = flotilla_store::StateStore::latest_state(store.as_ref(), &instance)
            .await
            .unwrap()
            .unwrap();
        let local = mirror.read(&instance).await.unwrap().unwrap();
        assert_eq!(durable.state, DeploymentState::Complete);
        assert_eq!(local.state, DeploymentState::Complete);

        let report = engine.validate_consistency(&instance, false).await.unwrap();
        assert!(report.consistent);
    }

    #[tokio::test]
    async fn test_set_state_appends_transition_rows() {
        let (engine, store, _mirror) = engine();
        let instance = InstanceId::new("tst");

        engine
            .set_state(&instance, DeploymentState::Deploying, "start", json!({}))
            .await
            .unwrap();
        engine
            .set_state(&instance, DeploymentState::Complete, "done", json!({}))
            .await
            .unwrap();

        let transitions = store.transition_history(&instance);
        assert_eq!(transitions.len(), 2);
        assert_eq!(transitions[0].from_state, DeploymentState::Unknown);
        assert_eq!(transitions[0].to_state, DeploymentState::Deploying);
        assert_eq!(transitions[1].from_state, DeploymentState::Deploying);
        assert_eq!(transitions[1].to_state, DeploymentState::Complete);
    }

    #[tokio::test]
    async fn test_corrupted_mirror_is_detected_and_fixed() {
        let (engine, _store, mirror) = engine();
        let instance = InstanceId::new("tst");

        engine
            .set_state(&instance, DeploymentState::Complete, "done", json!({}))
            .await
            .unwrap();

        // Corrupt only the local mirror, backdated so the authoritative
        // record is the newer of the two.
        let mut bogus = DeploymentStateRecord::new(
            instance.clone(),
            DeploymentState::Failed,
            "corrupted",
            json!({}),
        );
        bogus.timestamp = Utc::now() - chrono::Duration::seconds(60);
        mirror.write(&bogus).await.unwrap();

        let report = engine.validate_consistency(&instance, true).await.unwrap();
        assert!(!report.consistent);

        // Both sides equal afterwards, authoritative value winning.
        let after = engine.validate_consistency(&instance, false).await.unwrap();
        assert!(after.consistent);
        let local = mirror.read(&instance).await.unwrap().unwrap();
        assert_eq!(local.state, DeploymentState::Complete);
    }

    #[tokio::test]
    async fn test_reconcile_promotes_local_only_record() {
        let (engine, store, mirror) = engine();
        let instance = InstanceId::new("tst");

        // Simulate a crash after the mirror write but before the durable
        // write ever happened: only the mirror has a record.
        let record = DeploymentStateRecord::new(
            instance.clone(),
            DeploymentState::Deploying,
            "mid-flight",
            json!({}),
        );
        mirror.write(&record).await.unwrap();

        let action = engine.reconcile(&instance).await.unwrap();
        assert_eq!(action, ConsistencyAction::PromotedLocal);

        let durable = flotilla_store::StateStore::latest_state(store.as_ref(), &instance)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(durable.state, DeploymentState::Deploying);
    }

    #[tokio::test]
    async fn test_reconcile_never_downgrades_newer_mirror() {
        let (engine, store, mirror) = engine();
        let instance = InstanceId::new("tst");

        let mut old_durable = DeploymentStateRecord::new(
            instance.clone(),
            DeploymentState::Deploying,
            "older",
            json!({}),
        );
        old_durable.timestamp = Utc::now() - chrono::Duration::seconds(60);
        flotilla_store::StateStore::append_state(store.as_ref(), &old_durable)
            .await
            .unwrap();

        let newer_mirror = DeploymentStateRecord::new(
            instance.clone(),
            DeploymentState::Complete,
            "in-flight write",
            json!({}),
        );
        mirror.write(&newer_mirror).await.unwrap();

        let action = engine.reconcile(&instance).await.unwrap();
        assert_eq!(action, ConsistencyAction::SkippedNewerMirror);

        let local = mirror.read(&instance).await.unwrap().unwrap();
        assert_eq!(local.state, DeploymentState::Complete);
    }

    #[tokio::test]
    async fn test_both_absent_is_consistent() {
        let (engine, _store, _mirror) = engine();
        let report = engine
            .validate_consistency(&InstanceId::new("fresh"), true)
            .await
            .unwrap();
        assert!(report.consistent);
        assert_eq!(report.action, ConsistencyAction::None);
    }

    #[tokio::test]
    async fn test_checksum_mismatch_is_surfaced_not_fixed() {
        let (engine, store, _mirror) = engine();
        let instance = InstanceId::new("tst");

        // A tampered record: metadata changed after the checksum was
        // computed, label untouched.
        let mut record = DeploymentStateRecord::new(
            instance.clone(),
            DeploymentState::Complete,
            "done",
            json!({"services": 7}),
        );
        record.metadata = json!({"services": 999});
        flotilla_store::StateStore::append_state(store.as_ref(), &record)
            .await
            .unwrap();

        let result = engine.validate_checksum(&instance).await;
        assert!(matches!(
            result,
            Err(StateError::ChecksumMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_checksum_valid_record_passes() {
        let (engine, _store, _mirror) = engine();
        let instance = InstanceId::new("tst");

        engine
            .set_state(&instance, DeploymentState::Complete, "done", json!({"n": 1}))
            .await
            .unwrap();
        engine.validate_checksum(&instance).await.unwrap();
    }

    #[tokio::test]
    async fn test_infer_unknown_when_nothing_runs() {
        let (engine, _store, _mirror) = engine();
        let instance = InstanceId::new("wiped");

        let record = engine
            .infer_from_runtime(&instance, &FixedRuntimeProbe::nothing_running())
            .await
            .unwrap();
        assert_eq!(record.state, DeploymentState::Unknown);

        // Seeded into the SSOT.
        let current = engine.get_state(&instance).await.unwrap().unwrap();
        assert_eq!(current.state, DeploymentState::Unknown);
    }

    #[tokio::test]
    async fn test_infer_verifying_when_components_run() {
        let (engine, _store, _mirror) = engine();
        let instance = InstanceId::new("wiped");

        let record = engine
            .infer_from_runtime(
                &instance,
                &FixedRuntimeProbe::running(&["postgres", "keycloak"]),
            )
            .await
            .unwrap();
        assert_eq!(record.state, DeploymentState::Verifying);
    }

    #[tokio::test]
    async fn test_infer_keeps_existing_record() {
        let (engine, _store, _mirror) = engine();
        let instance = InstanceId::new("tst");

        engine
            .set_state(&instance, DeploymentState::Complete, "done", json!({}))
            .await
            .unwrap();

        let record = engine
            .infer_from_runtime(&instance, &FixedRuntimeProbe::nothing_running())
            .await
            .unwrap();
        assert_eq!(record.state, DeploymentState::Complete);
    }

    #[tokio::test]
    async fn test_cleanup_stale_respects_retention() {
        let (engine, _store, mirror) = engine();

        let old = StaleMarker {
            instance: InstanceId::new("tst"),
            name: "cleanup-scheduled".to_string(),
            created_at: Utc::now() - chrono::Duration::days(10),
        };
        let fresh = StaleMarker {
            instance: InstanceId::new("tst"),
            name: "verify-pending".to_string(),
            created_at: Utc::now(),
        };
        mirror.set_marker(&old).await.unwrap();
        mirror.set_marker(&fresh).await.unwrap();

        let removed = engine.cleanup_stale(7).await.unwrap();
        assert_eq!(removed, 1);

        let remaining = mirror.markers().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "verify-pending");
    }
}
