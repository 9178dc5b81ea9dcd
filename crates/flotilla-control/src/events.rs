//! Orchestration event stream.
//!
//! The control plane publishes every significant step on a broadcast
//! channel for monitoring and audit. Sending never blocks; with no
//! subscribers events are simply dropped.

use flotilla_checkpoint::CheckpointId;
use flotilla_types::{DeploymentState, ErrorCode, InstanceId, OperationName, ServiceName};

/// Channel capacity for the event stream
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 4096;

/// Events emitted by the control plane.
#[derive(Debug, Clone)]
pub enum OrchestrationEvent {
    /// A deployment workflow started.
    DeploymentStarted { instance: InstanceId },

    /// A pre-mutation checkpoint was taken.
    CheckpointCreated {
        instance: InstanceId,
        checkpoint: CheckpointId,
    },

    /// A service reached its ready state.
    ServiceLaunched {
        instance: InstanceId,
        service: ServiceName,
        duration_secs: f64,
    },

    /// A service launch failed (the launcher ran and errored).
    ServiceLaunchFailed {
        instance: InstanceId,
        service: ServiceName,
        code: ErrorCode,
    },

    /// A launch was rejected by an open circuit breaker.
    CircuitOpenBlocked {
        instance: InstanceId,
        operation: OperationName,
    },

    /// The deployment state changed.
    StateChanged {
        instance: InstanceId,
        state: DeploymentState,
    },

    /// Configuration was restored from a checkpoint.
    RolledBack {
        instance: InstanceId,
        checkpoint: CheckpointId,
    },

    /// The deployment finished and verified.
    DeploymentCompleted { instance: InstanceId },

    /// The deployment failed.
    DeploymentFailed {
        instance: InstanceId,
        reason: String,
    },
}
