//! Validated service graph with memoized startup levels.

use std::collections::HashMap;
use std::time::Duration;

use flotilla_types::ServiceName;
use tracing::debug;

use crate::config::{ServiceGraphConfig, ServiceSpec, TimeoutBounds};
use crate::error::{GraphError, Result};
use crate::timeout::DurationHistory;

/// A batch of services that may start in parallel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupLevel {
    /// The level number (0 = no dependencies).
    pub level: u32,

    /// Services at this level, in graph-declaration order.
    pub services: Vec<ServiceName>,
}

#[derive(Clone, Copy, PartialEq)]
enum VisitState {
    Unvisited,
    InStack,
    Done,
}

/// An immutable, validated service-dependency graph.
///
/// Construction validates the whole configuration: duplicate names,
/// undeclared dependencies, inverted timeout bounds, and cycles. Levels
/// are computed once here; all queries afterwards are cheap reads.
#[derive(Debug, Clone)]
pub struct ServiceGraph {
    services: Vec<ServiceSpec>,
    index: HashMap<ServiceName, usize>,
    /// Dependency edges as indices into `services`.
    edges: Vec<Vec<usize>>,
    levels: Vec<u32>,
    max_level: u32,
}

impl ServiceGraph {
    /// Build and validate a graph from configuration.
    pub fn from_config(config: ServiceGraphConfig) -> Result<Self> {
        let services = config.services;

        let mut index = HashMap::with_capacity(services.len());
        for (i, spec) in services.iter().enumerate() {
            if spec.timeouts.min > spec.timeouts.max {
                return Err(GraphError::InvalidTimeoutBounds {
                    service: spec.name.clone(),
                });
            }
            if index.insert(spec.name.clone(), i).is_some() {
                return Err(GraphError::DuplicateService(spec.name.clone()));
            }
        }

        let mut edges = Vec::with_capacity(services.len());
        for spec in &services {
            let mut deps = Vec::with_capacity(spec.depends_on.len());
            for dep in &spec.depends_on {
                let Some(&target) = index.get(dep) else {
                    return Err(GraphError::UnknownDependency {
                        service: spec.name.clone(),
                        dependency: dep.clone(),
                    });
                };
                deps.push(target);
            }
            edges.push(deps);
        }

        Self::check_acyclic(&services, &edges)?;

        let levels = Self::compute_levels(&edges);
        let max_level = levels.iter().copied().max().unwrap_or(0);

        debug!(
            services = services.len(),
            max_level, "Service graph validated"
        );

        Ok(Self {
            services,
            index,
            edges,
            levels,
            max_level,
        })
    }

    /// Depth-first cycle check over the whole graph.
    ///
    /// A node revisited while still on the recursion stack signals a
    /// cycle; the reported path is the stack suffix from the repeated
    /// node, with the repeated node appended to close the loop.
    fn check_acyclic(services: &[ServiceSpec], edges: &[Vec<usize>]) -> Result<()> {
        let mut state = vec![VisitState::Unvisited; services.len()];
        let mut stack = Vec::new();

        for start in 0..services.len() {
            if state[start] == VisitState::Unvisited {
                Self::visit(start, services, edges, &mut state, &mut stack)?;
            }
        }
        Ok(())
    }

    fn visit(
        node: usize,
        services: &[ServiceSpec],
        edges: &[Vec<usize>],
        state: &mut [VisitState],
        stack: &mut Vec<usize>,
    ) -> Result<()> {
        match state[node] {
            VisitState::Done => return Ok(()),
            VisitState::InStack => {
                let from = stack.iter().position(|&n| n == node).unwrap_or(0);
                let mut cycle: Vec<ServiceName> = stack[from..]
                    .iter()
                    .map(|&n| services[n].name.clone())
                    .collect();
                cycle.push(services[node].name.clone());
                return Err(GraphError::CyclicDependency { cycle });
            }
            VisitState::Unvisited => {}
        }

        state[node] = VisitState::InStack;
        stack.push(node);

        for &dep in &edges[node] {
            Self::visit(dep, services, edges, state, stack)?;
        }

        stack.pop();
        state[node] = VisitState::Done;
        Ok(())
    }

    /// Level per node: 0 without dependencies, else 1 + max over deps.
    /// Terminates because the graph is cycle-free by the time this runs.
    fn compute_levels(edges: &[Vec<usize>]) -> Vec<u32> {
        fn level_of(node: usize, edges: &[Vec<usize>], memo: &mut [Option<u32>]) -> u32 {
            if let Some(level) = memo[node] {
                return level;
            }
            let level = edges[node]
                .iter()
                .map(|&dep| level_of(dep, edges, memo) + 1)
                .max()
                .unwrap_or(0);
            memo[node] = Some(level);
            level
        }

        let mut memo = vec![None; edges.len()];
        (0..edges.len())
            .map(|n| level_of(n, edges, &mut memo))
            .collect()
    }

    /// Startup level of a service, if it is part of the graph.
    pub fn level(&self, service: &ServiceName) -> Option<u32> {
        self.index.get(service).map(|&i| self.levels[i])
    }

    /// Services at a given level, in graph-declaration order.
    pub fn services_at_level(&self, level: u32) -> Vec<ServiceName> {
        self.services
            .iter()
            .enumerate()
            .filter(|(i, _)| self.levels[*i] == level)
            .map(|(_, spec)| spec.name.clone())
            .collect()
    }

    /// Highest level present in the graph.
    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    /// All services in declaration order.
    pub fn service_names(&self) -> Vec<ServiceName> {
        self.services.iter().map(|s| s.name.clone()).collect()
    }

    /// Direct dependencies of a service.
    pub fn dependencies(&self, service: &ServiceName) -> Result<Vec<ServiceName>> {
        let &i = self
            .index
            .get(service)
            .ok_or_else(|| GraphError::UnknownService(service.clone()))?;
        Ok(self.services[i].depends_on.clone())
    }

    /// Timeout bounds of a service.
    pub fn timeout_bounds(&self, service: &ServiceName) -> Result<TimeoutBounds> {
        let &i = self
            .index
            .get(service)
            .ok_or_else(|| GraphError::UnknownService(service.clone()))?;
        Ok(self.services[i].timeouts)
    }

    /// The full level-ordered startup plan.
    pub fn startup_plan(&self) -> Vec<StartupLevel> {
        (0..=self.max_level)
            .map(|level| StartupLevel {
                level,
                services: self.services_at_level(level),
            })
            .collect()
    }

    /// Timeout for a service: the 95th percentile of its historical run
    /// durations clamped to its configured bounds, or the static default
    /// when no history exists.
    pub async fn dynamic_timeout(
        &self,
        service: &ServiceName,
        history: &dyn DurationHistory,
    ) -> Result<Duration> {
        let bounds = self.timeout_bounds(service)?;
        let samples = history.recent_durations(service).await;

        if samples.is_empty() {
            return Ok(bounds.default);
        }

        let p95 = percentile_95(&samples);
        if !p95.is_finite() {
            return Ok(bounds.default);
        }
        let derived = Duration::from_secs_f64(p95.max(0.0));
        Ok(derived.clamp(bounds.min, bounds.max))
    }
}

/// 95th percentile by nearest-rank over a copy of the samples.
fn percentile_95(samples: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = ((sorted.len() as f64) * 0.95).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceGraphConfig;
    use crate::timeout::FixedDurationHistory;

    fn chain() -> ServiceGraph {
        ServiceGraph::from_config(ServiceGraphConfig {
            services: vec![
                ServiceSpec::new("postgres", &[]),
                ServiceSpec::new("keycloak", &["postgres"]),
                ServiceSpec::new("backend", &["keycloak"]),
            ],
        })
        .unwrap()
    }

    #[test]
    fn test_levels_follow_dependencies() {
        let graph = chain();
        assert_eq!(graph.level(&ServiceName::new("postgres")), Some(0));
        assert_eq!(graph.level(&ServiceName::new("keycloak")), Some(1));
        assert_eq!(graph.level(&ServiceName::new("backend")), Some(2));
        assert_eq!(graph.max_level(), 2);
    }

    #[test]
    fn test_level_exceeds_all_transitive_dependencies() {
        let graph = ServiceGraph::from_config(ServiceGraphConfig::hub_stack()).unwrap();

        for name in graph.service_names() {
            let level = graph.level(&name).unwrap();
            for dep in graph.dependencies(&name).unwrap() {
                assert!(
                    level > graph.level(&dep).unwrap(),
                    "{name} must start after {dep}"
                );
            }
        }
    }

    #[test]
    fn test_services_at_level_in_declaration_order() {
        let graph = ServiceGraph::from_config(ServiceGraphConfig::hub_stack()).unwrap();
        let roots = graph.services_at_level(0);
        let names: Vec<&str> = roots.iter().map(ServiceName::as_str).collect();
        assert_eq!(
            names,
            vec!["postgres", "mongodb", "redis", "redis-blacklist", "opa"]
        );
    }

    #[test]
    fn test_cycle_is_rejected_with_cycle_path() {
        // backend -> frontend -> kas -> backend
        let result = ServiceGraph::from_config(ServiceGraphConfig {
            services: vec![
                ServiceSpec::new("backend", &["frontend"]),
                ServiceSpec::new("frontend", &["kas"]),
                ServiceSpec::new("kas", &["backend"]),
            ],
        });

        match result {
            Err(GraphError::CyclicDependency { cycle }) => {
                // The path closes on itself.
                assert_eq!(cycle.first(), cycle.last());
                assert!(cycle.len() >= 4);
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let result = ServiceGraph::from_config(ServiceGraphConfig {
            services: vec![ServiceSpec::new("backend", &["backend"])],
        });
        assert!(matches!(
            result,
            Err(GraphError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn test_unknown_dependency_is_rejected() {
        let result = ServiceGraph::from_config(ServiceGraphConfig {
            services: vec![ServiceSpec::new("backend", &["ghost"])],
        });
        assert!(matches!(
            result,
            Err(GraphError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn test_duplicate_service_is_rejected() {
        let result = ServiceGraph::from_config(ServiceGraphConfig {
            services: vec![
                ServiceSpec::new("redis", &[]),
                ServiceSpec::new("redis", &[]),
            ],
        });
        assert!(matches!(result, Err(GraphError::DuplicateService(_))));
    }

    #[tokio::test]
    async fn test_dynamic_timeout_uses_default_without_history() {
        let graph = chain();
        let history = FixedDurationHistory::empty();

        let timeout = graph
            .dynamic_timeout(&ServiceName::new("postgres"), &history)
            .await
            .unwrap();
        assert_eq!(timeout, TimeoutBounds::default().default);
    }

    #[tokio::test]
    async fn test_dynamic_timeout_stays_within_bounds() {
        let graph = chain();
        let bounds = graph
            .timeout_bounds(&ServiceName::new("keycloak"))
            .unwrap();

        // Pathological histories: huge, tiny, single-sample.
        for samples in [
            vec![10_000.0; 20],
            vec![0.001; 20],
            vec![42.0],
            vec![0.0],
        ] {
            let history = FixedDurationHistory::new(samples);
            let timeout = graph
                .dynamic_timeout(&ServiceName::new("keycloak"), &history)
                .await
                .unwrap();
            assert!(timeout >= bounds.min && timeout <= bounds.max);
        }
    }

    #[tokio::test]
    async fn test_dynamic_timeout_tracks_p95() {
        let graph = chain();
        // 10s..200s in 10s steps; nearest-rank p95 of 20 samples is the
        // 19th sorted value.
        let samples: Vec<f64> = (1..=20).map(|i| (i * 10) as f64).collect();
        let history = FixedDurationHistory::new(samples);

        let timeout = graph
            .dynamic_timeout(&ServiceName::new("postgres"), &history)
            .await
            .unwrap();
        assert_eq!(timeout, Duration::from_secs_f64(190.0));
    }
}
