//! Builder for ControlPlane
//!
//! Wires the subsystems together. Every store and collaborator can be
//! swapped; anything not supplied falls back to a shared in-memory
//! backend, which is what tests and single-process use want. The service
//! launcher has no sensible default and must be provided.

use std::sync::Arc;

use flotilla_checkpoint::{
    ArtifactLayout, ArtifactStore, CheckpointManager, CheckpointStore, InMemoryArtifactStore,
    InMemoryCheckpointStore,
};
use flotilla_graph::{ServiceGraph, ServiceGraphConfig};
use flotilla_resilience::{
    AutoRecoveryDispatcher, BreakerConfig, CircuitBreakerRegistry, RecoveryConfig,
    RemediationTable,
};
use flotilla_state::{
    DeploymentLockManager, InMemoryStateMirror, LockConfig, StateConsistencyEngine, StateMirror,
};
use flotilla_store::{
    BreakerStore, ConsistencyLogStore, ErrorStore, InMemoryStore, LockStore, MetricsStore,
    StateStore,
};

use crate::control_plane::{ControlPlane, ControlPlaneConfig};
use crate::error::{ControlPlaneError, Result};
use crate::launcher::ServiceLauncher;

/// Builder for constructing a ControlPlane with all dependencies
pub struct ControlPlaneBuilder {
    graph: Option<ServiceGraph>,
    launcher: Option<Arc<dyn ServiceLauncher>>,
    state_store: Option<Arc<dyn StateStore>>,
    breaker_store: Option<Arc<dyn BreakerStore>>,
    error_store: Option<Arc<dyn ErrorStore>>,
    metrics_store: Option<Arc<dyn MetricsStore>>,
    consistency_log: Option<Arc<dyn ConsistencyLogStore>>,
    lock_store: Option<Arc<dyn LockStore>>,
    mirror: Option<Arc<dyn StateMirror>>,
    artifact_store: Option<Arc<dyn ArtifactStore>>,
    checkpoint_store: Option<Arc<dyn CheckpointStore>>,
    artifact_layout: ArtifactLayout,
    remediation: RemediationTable,
    breaker_config: BreakerConfig,
    recovery_config: RecoveryConfig,
    lock_config: LockConfig,
    config: ControlPlaneConfig,
}

impl ControlPlaneBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            graph: None,
            launcher: None,
            state_store: None,
            breaker_store: None,
            error_store: None,
            metrics_store: None,
            consistency_log: None,
            lock_store: None,
            mirror: None,
            artifact_store: None,
            checkpoint_store: None,
            artifact_layout: ArtifactLayout::default(),
            remediation: RemediationTable::new(),
            breaker_config: BreakerConfig::default(),
            recovery_config: RecoveryConfig::default(),
            lock_config: LockConfig::default(),
            config: ControlPlaneConfig::default(),
        }
    }

    /// Set the validated service graph
    pub fn with_graph(mut self, graph: ServiceGraph) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Set the service launcher (required)
    pub fn with_launcher(mut self, launcher: Arc<dyn ServiceLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Set the authoritative state store
    pub fn with_state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.state_store = Some(store);
        self
    }

    /// Set the circuit-breaker store
    pub fn with_breaker_store(mut self, store: Arc<dyn BreakerStore>) -> Self {
        self.breaker_store = Some(store);
        self
    }

    /// Set the error log store
    pub fn with_error_store(mut self, store: Arc<dyn ErrorStore>) -> Self {
        self.error_store = Some(store);
        self
    }

    /// Set the metrics store
    pub fn with_metrics_store(mut self, store: Arc<dyn MetricsStore>) -> Self {
        self.metrics_store = Some(store);
        self
    }

    /// Set the consistency-check log store
    pub fn with_consistency_log(mut self, store: Arc<dyn ConsistencyLogStore>) -> Self {
        self.consistency_log = Some(store);
        self
    }

    /// Set the lock lease store
    pub fn with_lock_store(mut self, store: Arc<dyn LockStore>) -> Self {
        self.lock_store = Some(store);
        self
    }

    /// Set the local state mirror
    pub fn with_mirror(mut self, mirror: Arc<dyn StateMirror>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Set the configuration-artifact blob store
    pub fn with_artifact_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.artifact_store = Some(store);
        self
    }

    /// Set the checkpoint record store
    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoint_store = Some(store);
        self
    }

    /// Set which artifacts are tracked per instance
    pub fn with_artifact_layout(mut self, layout: ArtifactLayout) -> Self {
        self.artifact_layout = layout;
        self
    }

    /// Set the remediation procedure table
    pub fn with_remediation_table(mut self, table: RemediationTable) -> Self {
        self.remediation = table;
        self
    }

    /// Set the circuit-breaker configuration
    pub fn with_breaker_config(mut self, config: BreakerConfig) -> Self {
        self.breaker_config = config;
        self
    }

    /// Set the recovery/threshold configuration
    pub fn with_recovery_config(mut self, config: RecoveryConfig) -> Self {
        self.recovery_config = config;
        self
    }

    /// Set the lock configuration
    pub fn with_lock_config(mut self, config: LockConfig) -> Self {
        self.lock_config = config;
        self
    }

    /// Set the control plane configuration
    pub fn with_config(mut self, config: ControlPlaneConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the control plane
    pub fn build(self) -> Result<ControlPlane> {
        let launcher = self
            .launcher
            .ok_or_else(|| ControlPlaneError::Builder("service launcher is required".into()))?;

        let graph = match self.graph {
            Some(graph) => graph,
            None => ServiceGraph::from_config(ServiceGraphConfig::hub_stack())?,
        };

        // One shared in-memory backend covers whichever stores were not
        // supplied explicitly.
        let memory = Arc::new(InMemoryStore::new());
        let state_store = self.state_store.unwrap_or_else(|| memory.clone());
        let breaker_store = self.breaker_store.unwrap_or_else(|| memory.clone());
        let error_store = self.error_store.unwrap_or_else(|| memory.clone());
        let metrics_store = self.metrics_store.unwrap_or_else(|| memory.clone());
        let consistency_log = self.consistency_log.unwrap_or_else(|| memory.clone());
        let lock_store = self.lock_store.unwrap_or_else(|| memory.clone());
        let mirror = self
            .mirror
            .unwrap_or_else(|| Arc::new(InMemoryStateMirror::new()));
        let artifact_store = self
            .artifact_store
            .unwrap_or_else(|| Arc::new(InMemoryArtifactStore::new()));
        let checkpoint_store = self
            .checkpoint_store
            .unwrap_or_else(|| Arc::new(InMemoryCheckpointStore::new()));

        let breakers = CircuitBreakerRegistry::new(breaker_store, self.breaker_config);
        let recovery = AutoRecoveryDispatcher::new(
            self.remediation,
            error_store.clone(),
            metrics_store.clone(),
            self.recovery_config,
        );
        let checkpoints =
            CheckpointManager::new(artifact_store, checkpoint_store, self.artifact_layout);
        let state = StateConsistencyEngine::new(state_store, mirror, consistency_log);
        let locks = DeploymentLockManager::new(lock_store, self.lock_config);

        Ok(ControlPlane::new(
            graph,
            breakers,
            recovery,
            checkpoints,
            state,
            locks,
            launcher,
            metrics_store,
            error_store,
            self.config,
        ))
    }
}

impl Default for ControlPlaneBuilder {
    fn default() -> Self {
        Self::new()
    }
}
