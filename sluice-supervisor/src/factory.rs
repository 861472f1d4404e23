//! Executor factory
//!
//! Closed registry mapping a node type tag to an executor constructor.
//! Embedders may register additional tags before the configuration is
//! loaded; a tag nobody registered is rejected at load time.

use std::collections::HashMap;
use std::sync::Arc;

use crate::docker::{self, DockerRunExecutor};
use crate::error::SupervisorError;
use crate::executor::Executor;
use crate::native::{self, NativeExecutor};

/// Builds an executor from a node's `attributes` value
pub type ExecutorConstructor =
    Box<dyn Fn(&serde_yaml::Value) -> Result<Arc<dyn Executor>, SupervisorError> + Send + Sync>;

pub struct ExecutorFactory {
    constructors: HashMap<String, ExecutorConstructor>,
}

impl ExecutorFactory {
    /// Factory with no registered types
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Factory with the built-in `native` and `docker-run` types
    pub fn with_builtins() -> Self {
        let mut factory = Self::empty();
        factory.register(native::TYPE_TAG, |attributes| {
            Ok(Arc::new(NativeExecutor::from_attributes(attributes)?))
        });
        factory.register(docker::TYPE_TAG, |attributes| {
            Ok(Arc::new(DockerRunExecutor::from_attributes(attributes)?))
        });
        factory
    }

    /// Registers (or replaces) the constructor for `tag`
    pub fn register<F>(&mut self, tag: impl Into<String>, constructor: F)
    where
        F: Fn(&serde_yaml::Value) -> Result<Arc<dyn Executor>, SupervisorError>
            + Send
            + Sync
            + 'static,
    {
        self.constructors.insert(tag.into(), Box::new(constructor));
    }

    pub fn supports(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    pub fn create(
        &self,
        tag: &str,
        attributes: &serde_yaml::Value,
    ) -> Result<Arc<dyn Executor>, SupervisorError> {
        let constructor = self
            .constructors
            .get(tag)
            .ok_or_else(|| SupervisorError::UnknownType(tag.to_string()))?;
        constructor(attributes)
    }
}

impl Default for ExecutorFactory {
    fn default() -> Self {
        Self::with_builtins()
    }
}
