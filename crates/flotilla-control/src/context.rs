//! Request context for control plane operations
//!
//! Carries who is making a request and correlation data for tracing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Actor making a control plane request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Actor {
    /// Human operator
    Operator {
        /// User identifier
        user_id: String,
    },
    /// Internal system operation (heartbeat, reconciler)
    System {
        /// Component name
        component: String,
    },
    /// CLI invocation
    Cli {
        /// Session identifier
        session_id: String,
    },
}

/// Context for a control plane request
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique request ID for tracing
    pub request_id: Uuid,
    /// Actor making the request
    pub actor: Actor,
    /// Request timestamp
    pub timestamp: DateTime<Utc>,
    /// Optional correlation ID for distributed tracing
    pub correlation_id: Option<String>,
}

impl RequestContext {
    /// Create a new request context
    pub fn new(actor: Actor) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            actor,
            timestamp: Utc::now(),
            correlation_id: None,
        }
    }

    /// Set a correlation ID for distributed tracing
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(Actor::System {
            component: "flotilla".to_string(),
        })
    }
}
