//! Native executor
//!
//! Runs the script as a local subprocess inside a per-pipeline workspace
//! directory. No isolation is applied.

use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tempfile::TempPath;
use tracing::{debug, info};

use crate::error::SupervisorError;
use crate::executor::{ExecutionRequest, ExecutionResult, Executor, ExecutorError, run_captured};

pub const TYPE_TAG: &str = "native";

/// Directory inside the workspace holding per-execution scripts
const SCRIPTS_DIR: &str = ".sluice";

const ENTRYPOINT_SUFFIX: &str = ".entrypoint";

fn default_timeout() -> u64 {
    3600
}

/// Attributes accepted by a `native` node
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NativeAttributes {
    pub workspaces_path: PathBuf,
    /// Program the script is passed to; without it the script runs via its shebang
    #[serde(default)]
    pub interpreter: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

pub struct NativeExecutor {
    attributes: NativeAttributes,
}

impl NativeExecutor {
    pub fn new(attributes: NativeAttributes) -> Result<Self, SupervisorError> {
        if attributes.timeout_seconds == 0 {
            return Err(SupervisorError::configuration(
                "native: timeout_seconds must be greater than 0",
            ));
        }

        std::fs::create_dir_all(&attributes.workspaces_path).map_err(|e| {
            SupervisorError::configuration(format!(
                "native: cannot create workspaces_path {}: {}",
                attributes.workspaces_path.display(),
                e
            ))
        })?;

        Ok(Self { attributes })
    }

    /// Builds the executor from a node's `attributes` mapping
    pub fn from_attributes(value: &serde_yaml::Value) -> Result<Self, SupervisorError> {
        let attributes: NativeAttributes = serde_yaml::from_value(value.clone())
            .map_err(|e| SupervisorError::configuration(format!("native: {}", e)))?;
        Self::new(attributes)
    }

    fn workspace_for(&self, pipeline_id: &str) -> PathBuf {
        self.attributes.workspaces_path.join(pipeline_id)
    }

    /// Writes the script to a file private to this execution
    ///
    /// The file is closed before it is returned and removed when the returned
    /// path is dropped.
    fn stage_entrypoint(
        workspace: &Path,
        request: &ExecutionRequest,
    ) -> Result<TempPath, ExecutorError> {
        let scripts = workspace.join(SCRIPTS_DIR);
        std::fs::create_dir_all(&scripts)?;

        let mut file = tempfile::Builder::new()
            .prefix(&format!("{}-", request.execution.ident()))
            .suffix(ENTRYPOINT_SUFFIX)
            .tempfile_in(&scripts)?;
        file.write_all(request.script.as_bytes())?;
        file.flush()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o755))?;
        }

        Ok(file.into_temp_path())
    }
}

impl Executor for NativeExecutor {
    fn kind(&self) -> &'static str {
        TYPE_TAG
    }

    fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, ExecutorError> {
        let workspace = self.workspace_for(&request.execution.pipeline_id);
        let entrypoint = Self::stage_entrypoint(&workspace, request)?;

        info!(
            "Running {} natively in {}",
            request.execution.ident(),
            workspace.display()
        );

        let mut command = match &self.attributes.interpreter {
            Some(interpreter) => {
                let mut command = Command::new(interpreter);
                command.arg(entrypoint.as_os_str());
                command
            }
            None => Command::new(entrypoint.as_os_str()),
        };
        command.current_dir(&workspace).envs(request.environment()?);

        let result = run_captured(
            command,
            Some(Duration::from_secs(self.attributes.timeout_seconds)),
        )?;

        debug!(
            "{} exited with code {}",
            request.execution.ident(),
            result.exit_code
        );
        Ok(result)
    }
}
