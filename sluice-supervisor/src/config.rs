//! Supervisor configuration
//!
//! Parses the static supervisor file: the selection strategy plus an ordered
//! set of named nodes, each bound to an executor type.
//!
//! ```yaml
//! settings:
//!   selection_strategy: round-robin
//! nodes:
//!   local:
//!     type: native
//!     default: true
//!     labels: [shell]
//!     attributes:
//!       workspaces_path: /var/lib/sluice/workspaces
//! ```

use serde::Deserialize;
use std::path::Path;

use crate::error::SupervisorError;

fn default_strategy() -> String {
    "random".to_string()
}

/// Top-level `settings` section
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_strategy")]
    pub selection_strategy: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            selection_strategy: default_strategy(),
        }
    }
}

/// One entry under `nodes`
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub attributes: serde_yaml::Value,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    settings: Settings,
    #[serde(default)]
    nodes: serde_yaml::Mapping,
}

/// Parsed supervisor file; `nodes` keeps the file order
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub settings: Settings,
    pub nodes: Vec<(String, NodeConfig)>,
}

impl SupervisorConfig {
    pub fn from_yaml(source: &str) -> Result<Self, SupervisorError> {
        let raw: RawConfig = serde_yaml::from_str(source)?;

        let mut nodes = Vec::with_capacity(raw.nodes.len());
        for (key, value) in raw.nodes {
            let name = key
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| SupervisorError::configuration("node names must be strings"))?;
            let node: NodeConfig = serde_yaml::from_value(value).map_err(|e| {
                SupervisorError::configuration(format!("node '{}': {}", name, e))
            })?;
            nodes.push((name, node));
        }

        Ok(Self {
            settings: raw.settings,
            nodes,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SupervisorError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            SupervisorError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&source)
    }
}
