//! Auto-recovery dispatch and the failure-threshold policy.
//!
//! Remediation procedures (restart a container, reconnect a database,
//! regenerate a credential) belong to surrounding subsystems; this module
//! owns only the dispatch contract and the recording. Every invocation,
//! success or failure, leaves a metric sample — recovery is always
//! observable, and a later success never erases the error log.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use flotilla_store::{ErrorStore, MetricsStore};
use flotilla_types::{ErrorCode, ErrorRecord, InstanceId, MetricSample};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::error::{RecoveryError, Result};

/// Recovery dispatch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Trailing window inspected by the failure-threshold policy.
    pub failure_window: std::time::Duration,

    /// Error count within the window above which deployment halts.
    pub failure_ceiling: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            failure_window: std::time::Duration::from_secs(600),
            failure_ceiling: 10,
        }
    }
}

/// A remediation procedure for one class of failure.
///
/// Implementations live in the surrounding subsystems (compose supervisor,
/// database layer, credential manager); the dispatcher only invokes them.
#[async_trait]
pub trait RemediationProcedure: Send + Sync {
    /// Short name recorded with every outcome.
    fn name(&self) -> &str;

    /// Attempt the remediation. `Err` carries the failure reason.
    async fn run(&self, instance: &InstanceId, context: &Value)
        -> std::result::Result<(), String>;
}

/// Table of remediation procedures keyed by error code.
#[derive(Default)]
pub struct RemediationTable {
    procedures: HashMap<ErrorCode, Arc<dyn RemediationProcedure>>,
}

impl RemediationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        code: ErrorCode,
        procedure: Arc<dyn RemediationProcedure>,
    ) -> Self {
        self.procedures.insert(code, procedure);
        self
    }

    pub fn lookup(&self, code: &ErrorCode) -> Option<Arc<dyn RemediationProcedure>> {
        self.procedures.get(code).cloned()
    }
}

/// Outcome of one recovery attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    pub instance: InstanceId,
    pub code: ErrorCode,
    pub procedure: String,
    pub succeeded: bool,
    pub completed_at: DateTime<Utc>,
}

/// Dispatches recoverable failures to their remediation procedures.
pub struct AutoRecoveryDispatcher {
    table: RemediationTable,
    errors: Arc<dyn ErrorStore>,
    metrics: Arc<dyn MetricsStore>,
    config: RecoveryConfig,
}

impl AutoRecoveryDispatcher {
    pub fn new(
        table: RemediationTable,
        errors: Arc<dyn ErrorStore>,
        metrics: Arc<dyn MetricsStore>,
        config: RecoveryConfig,
    ) -> Self {
        Self {
            table,
            errors,
            metrics,
            config,
        }
    }

    /// Look up and run the remediation procedure for `code`.
    ///
    /// Unknown codes return [`RecoveryError::NoProcedure`], never a silent
    /// success. Every attempt is recorded to the metrics store as an
    /// `auto_recovery.<code>.<procedure>` sample (1.0 success, 0.0
    /// failure).
    #[instrument(skip(self, context), fields(instance = %instance, code = %code))]
    pub async fn auto_recover(
        &self,
        instance: &InstanceId,
        code: &ErrorCode,
        context: &Value,
    ) -> Result<RecoveryOutcome> {
        let Some(procedure) = self.table.lookup(code) else {
            self.record_outcome(instance, code, "none", false).await?;
            return Err(RecoveryError::NoProcedure {
                instance: instance.clone(),
                code: code.clone(),
            });
        };

        info!(procedure = procedure.name(), "Dispatching remediation");
        let result = procedure.run(instance, context).await;
        let succeeded = result.is_ok();
        self.record_outcome(instance, code, procedure.name(), succeeded)
            .await?;

        match result {
            Ok(()) => Ok(RecoveryOutcome {
                instance: instance.clone(),
                code: code.clone(),
                procedure: procedure.name().to_string(),
                succeeded: true,
                completed_at: Utc::now(),
            }),
            Err(reason) => {
                warn!(
                    procedure = procedure.name(),
                    reason = %reason,
                    "Remediation failed"
                );
                // The dispatcher's own failure is re-classified and logged
                // like any other error before surfacing.
                let record = ErrorRecord::new(
                    instance.clone(),
                    ErrorCode::new("auto_recovery_failed"),
                    "auto-recovery",
                    format!("remediation {} for {} failed: {}", procedure.name(), code, reason),
                )
                .with_context(context.clone());
                self.errors.append_error(&record).await?;

                Err(RecoveryError::ProcedureFailed {
                    instance: instance.clone(),
                    code: code.clone(),
                    procedure: procedure.name().to_string(),
                    reason,
                })
            }
        }
    }

    /// Count recent errors for an instance against the configured ceiling.
    ///
    /// Returns the count when under the ceiling; exceeding it means the
    /// deployment must halt rather than keep retrying — the whole-deployment
    /// analog of a per-operation circuit breaker.
    pub async fn check_failure_threshold(&self, instance: &InstanceId) -> Result<usize> {
        let window = ChronoDuration::from_std(self.config.failure_window)
            .unwrap_or_else(|_| ChronoDuration::seconds(600));
        let since = Utc::now() - window;
        let count = self.errors.errors_since(instance, since).await?.len();

        if count > self.config.failure_ceiling {
            warn!(
                instance = %instance,
                count,
                ceiling = self.config.failure_ceiling,
                "Failure threshold exceeded, halting deployment"
            );
            return Err(RecoveryError::FailureThresholdExceeded {
                instance: instance.clone(),
                count,
                ceiling: self.config.failure_ceiling,
            });
        }
        Ok(count)
    }

    async fn record_outcome(
        &self,
        instance: &InstanceId,
        code: &ErrorCode,
        procedure: &str,
        succeeded: bool,
    ) -> Result<()> {
        let sample = MetricSample::new(
            instance.clone(),
            format!("auto_recovery.{code}.{procedure}"),
            if succeeded { 1.0 } else { 0.0 },
        );
        self.metrics.record_metric(&sample).await?;
        Ok(())
    }
}

/// Procedure that always succeeds. For tests.
pub struct NoOpProcedure {
    name: String,
}

impl NoOpProcedure {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl RemediationProcedure for NoOpProcedure {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        _instance: &InstanceId,
        _context: &Value,
    ) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Procedure that always fails. For tests.
pub struct FailingProcedure {
    name: String,
    reason: String,
}

impl FailingProcedure {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl RemediationProcedure for FailingProcedure {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        _instance: &InstanceId,
        _context: &Value,
    ) -> std::result::Result<(), String> {
        Err(self.reason.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_store::InMemoryStore;
    use serde_json::json;

    fn dispatcher(table: RemediationTable, store: Arc<InMemoryStore>) -> AutoRecoveryDispatcher {
        AutoRecoveryDispatcher::new(table, store.clone(), store, RecoveryConfig::default())
    }

    #[tokio::test]
    async fn test_dispatch_runs_registered_procedure() {
        let store = Arc::new(InMemoryStore::new());
        let table = RemediationTable::new().register(
            ErrorCode::new("container_exited"),
            Arc::new(NoOpProcedure::new("restart_container")),
        );
        let dispatcher = dispatcher(table, store.clone());
        let instance = InstanceId::new("tst");

        let outcome = dispatcher
            .auto_recover(&instance, &ErrorCode::new("container_exited"), &json!({}))
            .await
            .unwrap();

        assert!(outcome.succeeded);
        assert_eq!(outcome.procedure, "restart_container");

        // Outcome recorded even on success.
        let samples = store.metric_history(&instance);
        assert_eq!(samples.len(), 1);
        assert_eq!(
            samples[0].name,
            "auto_recovery.container_exited.restart_container"
        );
        assert_eq!(samples[0].value, 1.0);
    }

    #[tokio::test]
    async fn test_unknown_code_is_distinct_failure() {
        let store = Arc::new(InMemoryStore::new());
        let dispatcher = dispatcher(RemediationTable::new(), store.clone());
        let instance = InstanceId::new("tst");

        let result = dispatcher
            .auto_recover(&instance, &ErrorCode::new("mystery"), &json!({}))
            .await;

        assert!(matches!(result, Err(RecoveryError::NoProcedure { .. })));
        // Recorded with outcome 0.0.
        let samples = store.metric_history(&instance);
        assert_eq!(samples[0].value, 0.0);
    }

    #[tokio::test]
    async fn test_procedure_failure_is_logged_and_surfaced() {
        let store = Arc::new(InMemoryStore::new());
        let table = RemediationTable::new().register(
            ErrorCode::new("database_connection_lost"),
            Arc::new(FailingProcedure::new("reconnect_database", "socket refused")),
        );
        let dispatcher = dispatcher(table, store.clone());
        let instance = InstanceId::new("tst");

        let result = dispatcher
            .auto_recover(
                &instance,
                &ErrorCode::new("database_connection_lost"),
                &json!({}),
            )
            .await;

        assert!(matches!(result, Err(RecoveryError::ProcedureFailed { .. })));

        let errors = store
            .errors_since(&instance, Utc::now() - ChronoDuration::minutes(1))
            .await
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code.as_str(), "auto_recovery_failed");
    }

    #[tokio::test]
    async fn test_failure_threshold_halts() {
        let store = Arc::new(InMemoryStore::new());
        let dispatcher = AutoRecoveryDispatcher::new(
            RemediationTable::new(),
            store.clone(),
            store.clone(),
            RecoveryConfig {
                failure_window: std::time::Duration::from_secs(600),
                failure_ceiling: 2,
            },
        );
        let instance = InstanceId::new("tst");

        for i in 0..3 {
            let record = ErrorRecord::new(
                instance.clone(),
                ErrorCode::new("network_timeout"),
                "launcher",
                format!("timeout {i}"),
            );
            store.append_error(&record).await.unwrap();
        }

        let result = dispatcher.check_failure_threshold(&instance).await;
        assert!(matches!(
            result,
            Err(RecoveryError::FailureThresholdExceeded { count: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_failure_threshold_under_ceiling() {
        let store = Arc::new(InMemoryStore::new());
        let dispatcher = dispatcher(RemediationTable::new(), store.clone());
        let instance = InstanceId::new("tst");

        assert_eq!(
            dispatcher.check_failure_threshold(&instance).await.unwrap(),
            0
        );
    }
}
