//! The control plane facade.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flotilla_checkpoint::{CheckpointId, CheckpointManager};
use flotilla_graph::{DurationHistory, ServiceGraph};
use flotilla_resilience::{
    retry_with_backoff, AutoRecoveryDispatcher, BreakerError, CircuitBreakerRegistry, RetryPolicy,
};
use flotilla_state::{DeploymentLockManager, StateConsistencyEngine};
use flotilla_store::{ErrorStore, MetricsStore};
use flotilla_types::{
    classify, CircuitBreakerRecord, DeploymentState, DeploymentStateRecord, ErrorClass,
    ErrorRecord, InstanceId, LockLease, MetricSample, OperationName, ServiceName,
};
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::context::RequestContext;
use crate::error::{ControlPlaneError, Result};
use crate::events::{OrchestrationEvent, EVENT_CHANNEL_CAPACITY};
use crate::launcher::{LaunchFailure, ServiceLauncher};

/// Control plane configuration.
#[derive(Debug, Clone)]
pub struct ControlPlaneConfig {
    /// Bounded wait for the deployment lock.
    pub lock_timeout: Duration,

    /// Retry policy for transient launch failures.
    pub retry: RetryPolicy,

    /// Whether a failed deployment rolls configuration back to the
    /// pre-deployment checkpoint.
    pub rollback_on_failure: bool,

    /// How many historical duration samples feed a dynamic timeout.
    pub timeout_history_samples: usize,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            rollback_on_failure: true,
            timeout_history_samples: 20,
        }
    }
}

/// Summary of a completed deployment.
#[derive(Debug, Clone)]
pub struct DeploymentReport {
    pub instance: InstanceId,
    pub services_started: Vec<ServiceName>,
    pub checkpoint: CheckpointId,
    pub completed_at: DateTime<Utc>,
}

/// Read-only aggregate of an instance's orchestration state.
#[derive(Debug, Clone)]
pub struct InstanceStatus {
    pub state: Option<DeploymentStateRecord>,
    pub lock: Option<LockLease>,
}

/// Outcome of a verification pass.
#[derive(Debug, Clone, Copy)]
pub struct VerifyReport {
    /// Mirror and authoritative store agree.
    pub consistent: bool,

    /// The authoritative record's checksum matches a recomputation.
    pub checksum_valid: bool,
}

/// Adapter exposing the metrics store as startup-duration history.
struct StartupHistory {
    metrics: Arc<dyn MetricsStore>,
    instance: InstanceId,
    samples: usize,
}

#[async_trait]
impl DurationHistory for StartupHistory {
    async fn recent_durations(&self, service: &ServiceName) -> Vec<f64> {
        self.metrics
            .recent_values(
                &self.instance,
                &format!("startup_duration.{service}"),
                self.samples,
            )
            .await
            .unwrap_or_default()
    }
}

/// Single entry point for deployment orchestration.
pub struct ControlPlane {
    graph: ServiceGraph,
    breakers: CircuitBreakerRegistry,
    recovery: AutoRecoveryDispatcher,
    checkpoints: CheckpointManager,
    state: StateConsistencyEngine,
    locks: DeploymentLockManager,
    launcher: Arc<dyn ServiceLauncher>,
    metrics: Arc<dyn MetricsStore>,
    errors: Arc<dyn ErrorStore>,
    events: broadcast::Sender<OrchestrationEvent>,
    config: ControlPlaneConfig,
}

impl ControlPlane {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        graph: ServiceGraph,
        breakers: CircuitBreakerRegistry,
        recovery: AutoRecoveryDispatcher,
        checkpoints: CheckpointManager,
        state: StateConsistencyEngine,
        locks: DeploymentLockManager,
        launcher: Arc<dyn ServiceLauncher>,
        metrics: Arc<dyn MetricsStore>,
        errors: Arc<dyn ErrorStore>,
        config: ControlPlaneConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            graph,
            breakers,
            recovery,
            checkpoints,
            state,
            locks,
            launcher,
            metrics,
            errors,
            events,
            config,
        }
    }

    /// Subscribe to the orchestration event stream.
    pub fn subscribe_events(&self) -> broadcast::Receiver<OrchestrationEvent> {
        self.events.subscribe()
    }

    /// Deploy an instance's full service stack.
    ///
    /// Holds the instance lock for the whole workflow; a lock already held
    /// elsewhere surfaces as "deployment already in progress".
    #[instrument(skip(self, _ctx), fields(instance = %instance))]
    pub async fn deploy(
        &self,
        instance: &InstanceId,
        _ctx: &RequestContext,
    ) -> Result<DeploymentReport> {
        let lease = self.locks.acquire(instance, self.config.lock_timeout).await?;
        self.emit(OrchestrationEvent::DeploymentStarted {
            instance: instance.clone(),
        });

        let result = self.run_deployment(instance).await;

        if let Err(e) = self.locks.release(instance, &lease.holder).await {
            warn!(error = %e, "Failed to release deployment lock");
        }

        match result {
            Ok(report) => {
                info!(services = report.services_started.len(), "Deployment complete");
                self.emit(OrchestrationEvent::DeploymentCompleted {
                    instance: instance.clone(),
                });
                Ok(report)
            }
            Err(e) => {
                self.emit(OrchestrationEvent::DeploymentFailed {
                    instance: instance.clone(),
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run_deployment(&self, instance: &InstanceId) -> Result<DeploymentReport> {
        // Checkpoint before any mutation.
        let label = self
            .state
            .get_state(instance)
            .await?
            .map(|r| r.state)
            .unwrap_or(DeploymentState::Unknown);
        let checkpoint = self
            .checkpoints
            .create_checkpoint(instance, label, "pre-deployment snapshot")
            .await?;
        self.emit(OrchestrationEvent::CheckpointCreated {
            instance: instance.clone(),
            checkpoint: checkpoint.clone(),
        });

        self.transition(
            instance,
            DeploymentState::Deploying,
            "deployment started",
            json!({ "checkpoint": checkpoint.to_string() }),
        )
        .await?;

        match self.launch_all_levels(instance).await {
            Ok(services_started) => {
                self.transition(
                    instance,
                    DeploymentState::Verifying,
                    "all services started",
                    json!({ "services": services_started.len() }),
                )
                .await?;

                self.state.validate_consistency(instance, true).await?;
                self.state.validate_checksum(instance).await?;

                self.transition(
                    instance,
                    DeploymentState::Complete,
                    "deployment verified",
                    json!({}),
                )
                .await?;

                Ok(DeploymentReport {
                    instance: instance.clone(),
                    services_started,
                    checkpoint,
                    completed_at: Utc::now(),
                })
            }
            Err(failure) => {
                self.transition(
                    instance,
                    DeploymentState::Failed,
                    failure.to_string(),
                    json!({}),
                )
                .await?;

                if self.config.rollback_on_failure {
                    match self.checkpoints.rollback(instance, &checkpoint).await {
                        Ok(()) => {
                            self.transition(
                                instance,
                                DeploymentState::RolledBack,
                                format!("rolled back to {checkpoint}"),
                                json!({ "checkpoint": checkpoint.to_string() }),
                            )
                            .await?;
                            self.emit(OrchestrationEvent::RolledBack {
                                instance: instance.clone(),
                                checkpoint: checkpoint.clone(),
                            });
                        }
                        Err(e) => {
                            warn!(error = %e, "Rollback after failed deployment failed");
                        }
                    }
                }

                Err(failure)
            }
        }
    }

    /// Launch every level of the startup plan, lower levels first.
    /// Services within a level start in parallel.
    async fn launch_all_levels(&self, instance: &InstanceId) -> Result<Vec<ServiceName>> {
        let history = StartupHistory {
            metrics: self.metrics.clone(),
            instance: instance.clone(),
            samples: self.config.timeout_history_samples,
        };

        let mut started = Vec::new();
        for batch in self.graph.startup_plan() {
            info!(level = batch.level, services = batch.services.len(), "Starting level");

            let launches = batch
                .services
                .iter()
                .map(|service| self.launch_service(instance, service, &history));
            let results = futures::future::join_all(launches).await;

            for result in results {
                started.push(result?);
            }

            // A storm of small failures across the level halts the
            // deployment outright.
            self.recovery.check_failure_threshold(instance).await?;
        }
        Ok(started)
    }

    /// Launch one service with its breaker, dynamic timeout, and the
    /// classification-driven propagation policy.
    async fn launch_service(
        &self,
        instance: &InstanceId,
        service: &ServiceName,
        history: &StartupHistory,
    ) -> Result<ServiceName> {
        let timeout = self.graph.dynamic_timeout(service, history).await?;
        let operation = OperationName::for_launch(instance, service);
        let started = tokio::time::Instant::now();

        let first = self.attempt_launch(&operation, instance, service, timeout).await;

        let outcome = match first {
            Err(ControlPlaneError::Launch { service: svc, failure }) => {
                match classify(&failure.code) {
                    ErrorClass::Transient => {
                        // The first attempt already ran; spend the rest of
                        // the budget on retries, each back through the
                        // breaker.
                        let policy = RetryPolicy {
                            max_attempts: self.config.retry.max_attempts.saturating_sub(1).max(1),
                            ..self.config.retry.clone()
                        };
                        retry_with_backoff(&policy, |_attempt| {
                            self.attempt_launch(&operation, instance, service, timeout)
                        })
                        .await
                    }
                    ErrorClass::Recoverable => {
                        self.recovery
                            .auto_recover(
                                instance,
                                &failure.code,
                                &json!({ "service": service.as_str() }),
                            )
                            .await?;
                        self.attempt_launch(&operation, instance, service, timeout).await
                    }
                    ErrorClass::Permanent | ErrorClass::Unknown => {
                        Err(ControlPlaneError::Launch { service: svc, failure })
                    }
                }
            }
            other => other,
        };

        outcome?;

        let duration_secs = started.elapsed().as_secs_f64();
        self.metrics
            .record_metric(&MetricSample::new(
                instance.clone(),
                format!("startup_duration.{service}"),
                duration_secs,
            ))
            .await?;
        self.emit(OrchestrationEvent::ServiceLaunched {
            instance: instance.clone(),
            service: service.clone(),
            duration_secs,
        });
        Ok(service.clone())
    }

    /// One launch attempt through the circuit breaker, bounded by the
    /// dynamic timeout. Failures are appended to the error log before
    /// being surfaced.
    async fn attempt_launch(
        &self,
        operation: &OperationName,
        instance: &InstanceId,
        service: &ServiceName,
        timeout: Duration,
    ) -> Result<()> {
        let outcome = self
            .breakers
            .execute(operation, || async {
                match tokio::time::timeout(timeout, self.launcher.launch(instance, service)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(LaunchFailure::new(
                        "startup_timeout",
                        format!("service {service} did not become ready within {timeout:?}"),
                    )),
                }
            })
            .await;

        match outcome {
            Ok(()) => Ok(()),
            Err(BreakerError::Open {
                operation,
                retry_after,
            }) => {
                self.emit(OrchestrationEvent::CircuitOpenBlocked {
                    instance: instance.clone(),
                    operation: operation.clone(),
                });
                Err(ControlPlaneError::CircuitOpen {
                    operation,
                    retry_after,
                })
            }
            Err(BreakerError::Store(e)) => Err(e.into()),
            Err(BreakerError::Inner(failure)) => {
                let record = ErrorRecord::new(
                    instance.clone(),
                    failure.code.clone(),
                    "service-launcher",
                    failure.message.clone(),
                )
                .with_context(json!({ "service": service.as_str() }));
                self.errors.append_error(&record).await?;

                self.emit(OrchestrationEvent::ServiceLaunchFailed {
                    instance: instance.clone(),
                    service: service.clone(),
                    code: failure.code.clone(),
                });
                Err(ControlPlaneError::Launch {
                    service: service.clone(),
                    failure,
                })
            }
        }
    }

    /// Restore configuration from a checkpoint and record the state.
    #[instrument(skip(self, _ctx), fields(instance = %instance, checkpoint = %checkpoint))]
    pub async fn rollback_instance(
        &self,
        instance: &InstanceId,
        checkpoint: &CheckpointId,
        _ctx: &RequestContext,
    ) -> Result<()> {
        let lease = self.locks.acquire(instance, self.config.lock_timeout).await?;

        let result = self.checkpoints.rollback(instance, checkpoint).await;
        let result = match result {
            Ok(()) => self
                .transition(
                    instance,
                    DeploymentState::RolledBack,
                    format!("rolled back to {checkpoint}"),
                    json!({ "checkpoint": checkpoint.to_string() }),
                )
                .await
                .map(|_| {
                    self.emit(OrchestrationEvent::RolledBack {
                        instance: instance.clone(),
                        checkpoint: checkpoint.clone(),
                    });
                }),
            Err(e) => Err(e.into()),
        };

        if let Err(e) = self.locks.release(instance, &lease.holder).await {
            warn!(error = %e, "Failed to release deployment lock");
        }
        result
    }

    /// Verification pass: dual-store consistency plus checksum integrity.
    pub async fn verify(&self, instance: &InstanceId) -> Result<VerifyReport> {
        let consistency = self.state.validate_consistency(instance, false).await?;
        let checksum_valid = match self.state.validate_checksum(instance).await {
            Ok(()) => true,
            Err(flotilla_state::StateError::ChecksumMismatch { .. }) => false,
            Err(e) => return Err(e.into()),
        };
        Ok(VerifyReport {
            consistent: consistency.consistent,
            checksum_valid,
        })
    }

    /// Read-only status aggregate. No locking.
    pub async fn status(&self, instance: &InstanceId) -> Result<InstanceStatus> {
        Ok(InstanceStatus {
            state: self.state.get_state(instance).await?,
            lock: self.locks.current(instance).await?,
        })
    }

    /// Breaker record for an operation. Read-only.
    pub async fn breaker_status(
        &self,
        operation: &OperationName,
    ) -> Result<Option<CircuitBreakerRecord>> {
        Ok(self.breakers.status(operation).await?)
    }

    /// The validated service graph.
    pub fn graph(&self) -> &ServiceGraph {
        &self.graph
    }

    async fn transition(
        &self,
        instance: &InstanceId,
        state: DeploymentState,
        reason: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Result<DeploymentStateRecord> {
        let record = self.state.set_state(instance, state, reason, metadata).await?;
        self.emit(OrchestrationEvent::StateChanged {
            instance: instance.clone(),
            state,
        });
        Ok(record)
    }

    fn emit(&self, event: OrchestrationEvent) {
        let _ = self.events.send(event);
    }
}
