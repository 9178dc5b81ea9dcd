//! FLOTILLA Types - Core types for federated deployment orchestration
//!
//! FLOTILLA is the deployment-orchestration control plane for a federated
//! hub/spoke platform: one coordinating hub instance and the federated
//! spoke instances it manages. This crate holds the shared vocabulary the
//! other FLOTILLA crates build on.
//!
//! ## Architectural Boundaries
//!
//! - **flotilla-types** owns: identifiers, the deployment-state vocabulary,
//!   the error taxonomy, and the persisted record shapes
//! - **flotilla-store** owns: how those records are durably stored
//! - The engine crates (graph, resilience, checkpoint, state, control) own
//!   the behavior around the records
//!
//! ## Key Concepts
//!
//! - **InstanceId**: an operator-chosen name for a hub or spoke instance
//! - **DeploymentState**: the fixed state vocabulary for a deployment
//! - **ErrorClass**: severity taxonomy driving retry/recovery/halt decisions
//! - **CircuitBreakerRecord**: durable per-operation breaker state

#![deny(unsafe_code)]

pub mod breaker;
pub mod error;
pub mod ids;
pub mod lock;
pub mod state;
pub mod telemetry;

// Re-export main types
pub use breaker::{CircuitBreakerRecord, CircuitState};
pub use error::{classify, ErrorClass, ErrorCode, ErrorRecord};
pub use ids::{InstanceId, LockToken, OperationName, ServiceName};
pub use lock::LockLease;
pub use state::{DeploymentState, DeploymentStateRecord, StateTransitionRecord};
pub use telemetry::{
    ConsistencyAction, ConsistencyCheckRecord, ConsistencyVerdict, MetricSample,
};
