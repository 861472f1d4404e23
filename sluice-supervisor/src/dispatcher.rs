//! Supervisor dispatcher
//!
//! Holds the configured pool of supervisors and picks one per pipeline:
//! - Unlabeled pipelines go to `default` supervisors, using the configured strategy
//! - Labeled pipelines go to supervisors carrying the label (or named after it),
//!   always picked at random
//!
//! Every selection increments the winner's usage counter, which drives the
//! round-robin strategy.

use rand::Rng;
use sluice_core::domain::pipeline::Pipeline;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::config::SupervisorConfig;
use crate::error::SupervisorError;
use crate::executor::{ExecutionRequest, ExecutionResult, Executor, ExecutorError};
use crate::factory::ExecutorFactory;

/// How a supervisor is picked among the candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    Random,
    RoundRobin,
}

impl FromStr for SelectionStrategy {
    type Err = SupervisorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(SelectionStrategy::Random),
            "round-robin" => Ok(SelectionStrategy::RoundRobin),
            other => Err(SupervisorError::UnknownStrategy(other.to_string())),
        }
    }
}

/// A named supervisor bound to its executor
#[derive(Clone)]
pub struct SupervisorDefinition {
    pub name: String,
    pub labels: Vec<String>,
    pub default: bool,
    pub executor: Arc<dyn Executor>,
}

impl SupervisorDefinition {
    fn accepts_label(&self, label: &str) -> bool {
        self.name == label || self.labels.iter().any(|l| l == label)
    }
}

impl std::fmt::Debug for SupervisorDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorDefinition")
            .field("name", &self.name)
            .field("labels", &self.labels)
            .field("default", &self.default)
            .field("executor", &self.executor.kind())
            .finish()
    }
}

/// Supervisor picked for one execution
#[derive(Clone)]
pub struct SupervisorHandle {
    name: String,
    executor: Arc<dyn Executor>,
}

impl SupervisorHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &'static str {
        self.executor.kind()
    }
}

impl std::fmt::Debug for SupervisorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorHandle")
            .field("name", &self.name)
            .field("kind", &self.executor.kind())
            .finish()
    }
}

pub struct Dispatcher {
    definitions: Vec<SupervisorDefinition>,
    strategy: SelectionStrategy,
    usage: Mutex<HashMap<String, u64>>,
}

impl Dispatcher {
    /// Creates a dispatcher over `definitions`, kept in the given order
    ///
    /// Fails if the pool is empty, has duplicate names, or has no default
    /// supervisor (unlabeled pipelines would be unroutable).
    pub fn new(
        definitions: Vec<SupervisorDefinition>,
        strategy: SelectionStrategy,
    ) -> Result<Self, SupervisorError> {
        if definitions.is_empty() {
            return Err(SupervisorError::configuration(
                "at least one supervisor node must be defined",
            ));
        }

        let mut seen = HashSet::new();
        for definition in &definitions {
            if !seen.insert(definition.name.as_str()) {
                return Err(SupervisorError::configuration(format!(
                    "duplicate supervisor name '{}'",
                    definition.name
                )));
            }
        }

        if !definitions.iter().any(|d| d.default) {
            return Err(SupervisorError::routing(
                "no supervisor is marked as default, unlabeled pipelines cannot be routed",
            ));
        }

        Ok(Self {
            definitions,
            strategy,
            usage: Mutex::new(HashMap::new()),
        })
    }

    /// Builds executors for every configured node through `factory`
    pub fn from_config(
        config: &SupervisorConfig,
        factory: &ExecutorFactory,
    ) -> Result<Self, SupervisorError> {
        let strategy: SelectionStrategy = config.settings.selection_strategy.parse()?;

        let mut definitions = Vec::with_capacity(config.nodes.len());
        for (name, node) in &config.nodes {
            let executor = factory.create(&node.kind, &node.attributes)?;
            debug!(
                "Supervisor '{}' ({}) default={} labels={:?}",
                name, node.kind, node.default, node.labels
            );
            definitions.push(SupervisorDefinition {
                name: name.clone(),
                labels: node.labels.clone(),
                default: node.default,
                executor,
            });
        }

        let dispatcher = Self::new(definitions, strategy)?;
        info!(
            "Loaded {} supervisor(s) with {:?} selection",
            dispatcher.definitions.len(),
            dispatcher.strategy
        );
        Ok(dispatcher)
    }

    /// Loads the supervisor file at `path`
    pub fn load(path: impl AsRef<Path>, factory: &ExecutorFactory) -> Result<Self, SupervisorError> {
        let config = SupervisorConfig::load(path)?;
        Self::from_config(&config, factory)
    }

    pub fn strategy(&self) -> SelectionStrategy {
        self.strategy
    }

    pub fn definitions(&self) -> &[SupervisorDefinition] {
        &self.definitions
    }

    /// Picks the supervisor that will run `pipeline`
    pub fn select(&self, pipeline: &Pipeline) -> Result<SupervisorHandle, SupervisorError> {
        let (candidates, strategy): (Vec<&SupervisorDefinition>, _) = match pipeline.label() {
            None => (
                self.definitions.iter().filter(|d| d.default).collect(),
                self.strategy,
            ),
            Some(label) => (
                self.definitions
                    .iter()
                    .filter(|d| d.accepts_label(label))
                    .collect(),
                SelectionStrategy::Random,
            ),
        };

        if candidates.is_empty() {
            return Err(SupervisorError::routing(format!(
                "cannot match any supervisor for pipeline '{}'",
                pipeline.id
            )));
        }

        let mut usage = self.usage.lock().unwrap_or_else(|e| e.into_inner());

        let selected = match strategy {
            SelectionStrategy::Random => {
                candidates[rand::thread_rng().gen_range(0..candidates.len())]
            }
            SelectionStrategy::RoundRobin => Self::least_used(&candidates, &usage),
        };

        let count = usage.entry(selected.name.clone()).or_insert(0);
        *count += 1;

        debug!(
            "Selected supervisor '{}' for pipeline '{}' using {:?} (uses: {})",
            selected.name, pipeline.id, strategy, count
        );

        Ok(SupervisorHandle {
            name: selected.name.clone(),
            executor: Arc::clone(&selected.executor),
        })
    }

    /// Runs the request on the selected supervisor; blocks until it finishes
    pub fn execute(
        &self,
        handle: &SupervisorHandle,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResult, ExecutorError> {
        info!(
            "Executing {} on supervisor '{}'",
            request.execution.ident(),
            handle.name
        );
        handle.executor.execute(request)
    }

    /// First never-used candidate, otherwise the least used (earliest wins ties)
    fn least_used<'a>(
        candidates: &[&'a SupervisorDefinition],
        usage: &HashMap<String, u64>,
    ) -> &'a SupervisorDefinition {
        let mut best = candidates[0];
        let mut best_count = u64::MAX;

        for &candidate in candidates {
            match usage.get(&candidate.name) {
                None => return candidate,
                Some(&count) if count < best_count => {
                    best = candidate;
                    best_count = count;
                }
                Some(_) => {}
            }
        }

        best
    }
}
