//! Typed service-graph configuration.
//!
//! Loaded once at startup and validated eagerly (including cycle-freedom)
//! before any scheduling begins.

use std::time::Duration;

use flotilla_types::ServiceName;
use serde::{Deserialize, Serialize};

/// Static timeout bounds for one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutBounds {
    /// Lower clamp for derived timeouts.
    pub min: Duration,

    /// Upper clamp for derived timeouts.
    pub max: Duration,

    /// Timeout used when no history exists.
    pub default: Duration,
}

impl Default for TimeoutBounds {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(15),
            max: Duration::from_secs(300),
            default: Duration::from_secs(60),
        }
    }
}

/// One service declaration: name, direct dependencies, timeout bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Service name.
    pub name: ServiceName,

    /// Direct dependencies that must be ready before this service starts.
    pub depends_on: Vec<ServiceName>,

    /// Static timeout bounds.
    pub timeouts: TimeoutBounds,
}

impl ServiceSpec {
    /// Spec with default timeout bounds.
    pub fn new(name: &str, depends_on: &[&str]) -> Self {
        Self {
            name: ServiceName::new(name),
            depends_on: depends_on.iter().map(|d| ServiceName::new(*d)).collect(),
            timeouts: TimeoutBounds::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutBounds) -> Self {
        self.timeouts = timeouts;
        self
    }
}

/// The full graph configuration, in declaration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceGraphConfig {
    pub services: Vec<ServiceSpec>,
}

impl ServiceGraphConfig {
    /// The hub compose stack of the federated platform.
    ///
    /// Databases and caches first, then the identity broker and policy
    /// agent, then the application tier, then the TDF key-access service.
    pub fn hub_stack() -> Self {
        Self {
            services: vec![
                ServiceSpec::new("postgres", &[]),
                ServiceSpec::new("mongodb", &[]),
                ServiceSpec::new("redis", &[]),
                ServiceSpec::new("redis-blacklist", &[]),
                ServiceSpec::new("keycloak", &["postgres"]).with_timeouts(TimeoutBounds {
                    min: Duration::from_secs(30),
                    max: Duration::from_secs(600),
                    default: Duration::from_secs(120),
                }),
                ServiceSpec::new("opa", &[]),
                ServiceSpec::new("backend", &["keycloak", "mongodb", "redis", "opa"]),
                ServiceSpec::new("frontend", &["backend"]),
                ServiceSpec::new("kas", &["backend", "keycloak"]),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_stack_has_core_services() {
        let config = ServiceGraphConfig::hub_stack();
        let names: Vec<&str> = config.services.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"postgres"));
        assert!(names.contains(&"keycloak"));
        assert!(names.contains(&"kas"));
    }
}
