//! Pipeline Registry
//!
//! Resolves a pipeline id to its declaration. The file-backed registry reads
//! `<root>/pipelines/<id>.json`:
//!
//! ```json
//! {
//!   "title": "Deploy",
//!   "secret": "s3cret",
//!   "supervisor_label": "docker",
//!   "params": {"env": "prod"},
//!   "script": "scripts/deploy.py",
//!   "configs": ["configs/deploy.yaml"]
//! }
//! ```
//!
//! `script` and `configs` are paths relative to the root; their contents are
//! loaded on every lookup.

use async_trait::async_trait;
use serde::Deserialize;
use sluice_core::domain::pipeline::Pipeline;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Pipeline '{0}' not found")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid pipeline declaration: {0}")]
    Invalid(String),
}

#[async_trait]
pub trait PipelineRegistry: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Pipeline, RegistryError>;
}

/// Pipeline declaration as stored on disk
#[derive(Debug, Deserialize)]
struct PipelineDeclaration {
    title: String,
    secret: String,
    #[serde(default)]
    supervisor_label: Option<String>,
    #[serde(default)]
    params: HashMap<String, serde_json::Value>,
    script: String,
    #[serde(default)]
    configs: Vec<String>,
}

pub struct FilePipelineRegistry {
    root: PathBuf,
}

impl FilePipelineRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves a path from a declaration, refusing anything outside the root
    fn resolve(&self, relative: &str) -> Result<PathBuf, RegistryError> {
        let path = Path::new(relative);
        let escapes = path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));

        if relative.is_empty() || escapes {
            return Err(RegistryError::Invalid(format!(
                "path '{}' must be relative to the storage root",
                relative
            )));
        }

        Ok(self.root.join(path))
    }

    async fn read(&self, relative: &str) -> Result<String, RegistryError> {
        let path = self.resolve(relative)?;
        tokio::fs::read_to_string(&path).await.map_err(|e| {
            RegistryError::Invalid(format!("cannot read '{}': {}", relative, e))
        })
    }
}

#[async_trait]
impl PipelineRegistry for FilePipelineRegistry {
    async fn find_by_id(&self, id: &str) -> Result<Pipeline, RegistryError> {
        if !is_valid_id(id) {
            return Err(RegistryError::NotFound(id.to_string()));
        }

        let path = self.root.join("pipelines").join(format!("{}.json", id));
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RegistryError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let declaration: PipelineDeclaration = serde_json::from_str(&content)
            .map_err(|e| RegistryError::Invalid(format!("{}: {}", id, e)))?;

        let script = self.read(&declaration.script).await?;
        let mut config_payloads = Vec::with_capacity(declaration.configs.len());
        for config in &declaration.configs {
            config_payloads.push(self.read(config).await?);
        }

        tracing::debug!(
            "Loaded pipeline '{}' ({} config payload(s))",
            id,
            config_payloads.len()
        );

        Ok(Pipeline {
            id: id.to_string(),
            title: declaration.title,
            secret: declaration.secret,
            supervisor_label: declaration.supervisor_label,
            params: declaration.params,
            script,
            config_payloads,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Pipeline ids are file names: `[A-Za-z0-9_.-]`, never `..`
fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && !id.contains("..")
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}
