//! Durable circuit-breaker record.
//!
//! One row per guarded operation, persisted so breaker state survives
//! process restarts and is shared between processes. The `version` field
//! supports compare-and-swap updates: two processes racing to transition
//! the same breaker cannot both win.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::OperationName;

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation, requests execute.
    Closed,

    /// Fast-fail, requests rejected without executing.
    Open,

    /// Probing; the next request is allowed through as a trial.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Persisted circuit-breaker state for one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerRecord {
    /// Operation this breaker guards.
    pub operation: OperationName,

    /// Current state.
    pub state: CircuitState,

    /// Consecutive failures since the last success.
    pub failure_count: u32,

    /// When the most recent failure occurred.
    pub last_failure_at: Option<DateTime<Utc>>,

    /// When the state last changed.
    pub last_state_change: DateTime<Utc>,

    /// Monotonic version for compare-and-swap updates.
    pub version: u64,
}

impl CircuitBreakerRecord {
    /// Fresh record in the closed state.
    pub fn closed(operation: OperationName) -> Self {
        Self {
            operation,
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_at: None,
            last_state_change: Utc::now(),
            version: 0,
        }
    }

    /// Copy with a new state, bumped version, and updated transition time.
    pub fn transitioned(&self, state: CircuitState) -> Self {
        let mut next = self.clone();
        if next.state != state {
            next.last_state_change = Utc::now();
        }
        next.state = state;
        next.version = self.version + 1;
        next
    }
}
