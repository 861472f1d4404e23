//! Docker-run executor
//!
//! Handles a throwaway container per execution:
//! - Starting a detached, idle container named after the execution
//! - Copying the script in as `/entrypoint.py`
//! - Running the configured command with the script environment
//! - Removing the container afterwards, whatever happened

use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::SupervisorError;
use crate::executor::{ExecutionRequest, ExecutionResult, Executor, ExecutorError, run_captured};

pub const TYPE_TAG: &str = "docker-run";

/// Upper bound on a container's life, in case cleanup never happens
const CONTAINER_LIFETIME: &str = "7200";

fn default_image() -> String {
    "python:3.7-alpine".to_string()
}

fn default_binary() -> String {
    "docker".to_string()
}

fn default_command() -> String {
    "python3 /entrypoint.py".to_string()
}

/// Attributes accepted by a `docker-run` node
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DockerRunAttributes {
    #[serde(default = "default_image")]
    pub image: String,
    #[serde(default = "default_binary")]
    pub docker_binary: String,
    #[serde(default = "default_command")]
    pub command: String,
}

impl Default for DockerRunAttributes {
    fn default() -> Self {
        Self {
            image: default_image(),
            docker_binary: default_binary(),
            command: default_command(),
        }
    }
}

pub struct DockerRunExecutor {
    attributes: DockerRunAttributes,
}

impl DockerRunExecutor {
    pub fn new(attributes: DockerRunAttributes) -> Result<Self, SupervisorError> {
        if attributes.image.trim().is_empty() {
            return Err(SupervisorError::configuration("docker-run: image cannot be empty"));
        }
        if attributes.command.split_whitespace().next().is_none() {
            return Err(SupervisorError::configuration(
                "docker-run: command cannot be empty",
            ));
        }
        Ok(Self { attributes })
    }

    /// Builds the executor from a node's `attributes` mapping (null means defaults)
    pub fn from_attributes(value: &serde_yaml::Value) -> Result<Self, SupervisorError> {
        let attributes = if value.is_null() {
            DockerRunAttributes::default()
        } else {
            serde_yaml::from_value(value.clone())
                .map_err(|e| SupervisorError::configuration(format!("docker-run: {}", e)))?
        };
        Self::new(attributes)
    }

    fn run_args(&self, name: &str) -> Vec<String> {
        vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            name.to_string(),
            self.attributes.image.clone(),
            "sleep".to_string(),
            CONTAINER_LIFETIME.to_string(),
        ]
    }

    fn exec_args(&self, name: &str, env: &BTreeMap<String, String>) -> Vec<String> {
        let mut args = vec!["exec".to_string()];
        for (key, value) in env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(name.to_string());
        args.extend(self.attributes.command.split_whitespace().map(str::to_string));
        args
    }

    fn docker(&self, args: &[String]) -> Result<ExecutionResult, ExecutorError> {
        let mut command = Command::new(&self.attributes.docker_binary);
        command.args(args);
        run_captured(command, None)
    }

    /// Runs a docker subcommand that must succeed for the execution to proceed
    fn docker_checked(&self, args: &[String]) -> Result<(), ExecutorError> {
        let result = self.docker(args)?;
        if !result.is_success() {
            return Err(ExecutorError::Backend(format!(
                "{} {} failed with exit code {}: {}",
                self.attributes.docker_binary,
                args.first().map(String::as_str).unwrap_or_default(),
                result.exit_code,
                result.output.trim()
            )));
        }
        Ok(())
    }
}

impl Executor for DockerRunExecutor {
    fn kind(&self) -> &'static str {
        TYPE_TAG
    }

    fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, ExecutorError> {
        let name = request.execution.ident();
        let env = request.environment()?;

        let script = stage_script(&request.script)?;

        info!(
            "Spawning container {} from image {}",
            name, self.attributes.image
        );
        self.docker_checked(&self.run_args(&name))?;
        let _container = Container {
            binary: &self.attributes.docker_binary,
            name: &name,
        };

        self.docker_checked(&[
            "cp".to_string(),
            script.path().display().to_string(),
            format!("{}:/entrypoint.py", name),
        ])?;

        debug!("Running '{}' in container {}", self.attributes.command, name);
        let result = self.docker(&self.exec_args(&name, &env))?;

        debug!("Container {} finished with code {}", name, result.exit_code);
        Ok(result)
    }
}

/// Writes the script to a fresh, exclusively created temporary file
fn stage_script(script: &str) -> Result<NamedTempFile, ExecutorError> {
    let mut file = tempfile::Builder::new()
        .prefix("sluice-")
        .suffix(".entrypoint.py")
        .tempfile()?;
    file.write_all(script.as_bytes())?;
    file.flush()?;
    Ok(file)
}

/// Running container, removed on drop
struct Container<'a> {
    binary: &'a str,
    name: &'a str,
}

impl Drop for Container<'_> {
    fn drop(&mut self) {
        match Command::new(self.binary)
            .arg("rm")
            .arg("-f")
            .arg(self.name)
            .output()
        {
            Ok(output) if output.status.success() => {
                debug!("Container {} removed", self.name);
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!("Failed to remove container {}: {}", self.name, stderr.trim());
            }
            Err(e) => {
                warn!("Failed to remove container {}: {}", self.name, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::tests::request;

    #[test]
    fn test_attribute_defaults() {
        let executor = DockerRunExecutor::from_attributes(&serde_yaml::Value::Null).unwrap();
        assert_eq!(executor.attributes.image, "python:3.7-alpine");
        assert_eq!(executor.attributes.docker_binary, "docker");
        assert_eq!(executor.attributes.command, "python3 /entrypoint.py");

        let value: serde_yaml::Value = serde_yaml::from_str("image: alpine:3").unwrap();
        let executor = DockerRunExecutor::from_attributes(&value).unwrap();
        assert_eq!(executor.attributes.image, "alpine:3");
        assert_eq!(executor.attributes.docker_binary, "docker");
    }

    #[test]
    fn test_rejects_invalid_attributes() {
        let value: serde_yaml::Value = serde_yaml::from_str("image: ''").unwrap();
        assert!(DockerRunExecutor::from_attributes(&value).is_err());

        let value: serde_yaml::Value = serde_yaml::from_str("workspaces_path: /tmp").unwrap();
        assert!(DockerRunExecutor::from_attributes(&value).is_err());
    }

    #[test]
    fn test_container_commands() {
        let executor = DockerRunExecutor::new(DockerRunAttributes {
            command: "sh /entrypoint.py".to_string(),
            ..Default::default()
        })
        .unwrap();
        let req = request("deploy", "echo hi");
        let name = req.execution.ident();

        assert_eq!(
            executor.run_args(&name),
            vec![
                "run",
                "-d",
                "--name",
                "pipe_deploy_exec_42",
                "python:3.7-alpine",
                "sleep",
                "7200"
            ]
        );

        let args = executor.exec_args(&name, &req.environment().unwrap());
        assert_eq!(args.first().map(String::as_str), Some("exec"));
        assert!(args.contains(&"BUILD_NUMBER=42".to_string()));
        assert!(args.contains(&"COMMUNICATION_TOKEN=tok-123".to_string()));
        assert_eq!(
            &args[args.len() - 3..],
            &["pipe_deploy_exec_42", "sh", "/entrypoint.py"]
        );
    }

    /// Writes a stand-in docker binary that appends its arguments to `calls.log`
    #[cfg(unix)]
    fn recording_binary(dir: &std::path::Path) -> String {
        use std::os::unix::fs::PermissionsExt;

        let binary = dir.join("docker");
        let script = format!(
            "#!/bin/sh\necho \"$@\" >> {}\n",
            dir.join("calls.log").display()
        );
        std::fs::write(&binary, script).unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();
        binary.display().to_string()
    }

    #[cfg(unix)]
    #[test]
    fn test_script_is_staged_in_a_fresh_private_file() {
        let dir = tempfile::tempdir().unwrap();
        let executor = DockerRunExecutor::new(DockerRunAttributes {
            docker_binary: recording_binary(dir.path()),
            ..Default::default()
        })
        .unwrap();

        let mut req = request("docker-staging", "print('run')");
        req.execution.execution_number = 987_654;

        // A file planted where a predictable staging name would land
        let victim = dir.path().join("victim");
        std::fs::write(&victim, "precious").unwrap();
        let predictable = std::env::temp_dir()
            .join(format!("{}.entrypoint.py", req.execution.ident()));
        let _ = std::fs::remove_file(&predictable);
        std::os::unix::fs::symlink(&victim, &predictable).unwrap();

        let result = executor.execute(&req);
        let _ = std::fs::remove_file(&predictable);
        assert!(result.unwrap().is_success());

        assert_eq!(std::fs::read_to_string(&victim).unwrap(), "precious");

        let calls = std::fs::read_to_string(dir.path().join("calls.log")).unwrap();
        let copy = calls.lines().find(|l| l.starts_with("cp ")).unwrap();
        let staged = copy.split_whitespace().nth(1).unwrap();
        assert_ne!(std::path::Path::new(staged), predictable.as_path());
        assert!(!std::path::Path::new(staged).exists());
        assert!(calls.lines().any(|l| l == "rm -f pipe_docker-staging_exec_987654"));
    }

    #[test]
    fn test_missing_binary_is_an_error() {
        let executor = DockerRunExecutor::new(DockerRunAttributes {
            docker_binary: "/nonexistent/docker".to_string(),
            ..Default::default()
        })
        .unwrap();

        assert!(executor.execute(&request("deploy", "print(1)")).is_err());
    }
}
