//! Pipeline domain types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Pipeline declaration
///
/// Resolved by the pipeline registry on every request. The script and the
/// configuration payloads are already loaded from storage; the dispatch core
/// never mutates a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: String,
    pub title: String,
    pub secret: String,
    /// Routes the pipeline to supervisors carrying this label (or this name)
    pub supervisor_label: Option<String>,
    pub params: HashMap<String, serde_json::Value>,
    pub script: String,
    pub config_payloads: Vec<String>,
}

impl Pipeline {
    /// Label used for supervisor routing, ignoring blank values
    pub fn label(&self) -> Option<&str> {
        self.supervisor_label
            .as_deref()
            .map(str::trim)
            .filter(|label| !label.is_empty())
    }
}
