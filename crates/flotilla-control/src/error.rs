//! Error types for the control plane

use std::time::Duration;

use flotilla_checkpoint::CheckpointError;
use flotilla_graph::GraphError;
use flotilla_resilience::RecoveryError;
use flotilla_state::{LockError, StateError};
use flotilla_store::StoreError;
use flotilla_types::{OperationName, ServiceName};
use thiserror::Error;

use crate::launcher::LaunchFailure;

/// Control plane error type
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    /// Lock subsystem error; `AlreadyHeld` means a deployment for the
    /// same instance is already in progress.
    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    /// Dependency graph error
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    /// Checkpoint subsystem error
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// State consistency subsystem error
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Auto-recovery subsystem error
    #[error("recovery error: {0}")]
    Recovery(#[from] RecoveryError),

    /// Durable store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A launch was blocked by an open circuit; the launcher was never
    /// invoked. Distinct from the operation's own failure.
    #[error("blocked by circuit breaker on {operation}, retry in {retry_after:?}")]
    CircuitOpen {
        operation: OperationName,
        retry_after: Duration,
    },

    /// A service failed to start after the propagation policy ran its
    /// course.
    #[error("service {service} failed to start: {failure}")]
    Launch {
        service: ServiceName,
        failure: LaunchFailure,
    },

    /// The builder was missing a required dependency.
    #[error("control plane misconfigured: {0}")]
    Builder(String),
}

/// Result type for control plane operations
pub type Result<T> = std::result::Result<T, ControlPlaneError>;
