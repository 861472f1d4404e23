//! Executor abstraction
//!
//! An executor runs one pipeline script and reports its combined output and
//! exit code. Executors are blocking; callers on an async runtime are expected
//! to move the call onto a blocking thread.

use sluice_core::domain::execution::Execution;
use std::collections::{BTreeMap, HashMap};
use std::io::{ErrorKind, Read};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// How often a running child is checked against its deadline
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Spawn attempts while the executable is still open for writing elsewhere
const SPAWN_ATTEMPTS: u32 = 10;

/// Everything an executor needs to run one execution
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub execution: Execution,
    pub script: String,
    pub payload: String,
    /// Capability token the script uses to call back into the orchestrator
    pub token: String,
    /// Query parameters by name; repeated keys keep every value in order
    pub query: BTreeMap<String, Vec<String>>,
    pub headers: BTreeMap<String, String>,
    pub config_payloads: Vec<String>,
    pub params: HashMap<String, serde_json::Value>,
    /// Base URL scripts use to reach the orchestrator
    pub master_url: String,
}

impl ExecutionRequest {
    /// Environment variables handed to the script
    pub fn environment(&self) -> Result<BTreeMap<String, String>, ExecutorError> {
        let mut env = BTreeMap::new();
        env.insert("TRIGGER_PAYLOAD".to_string(), self.payload.clone());
        env.insert(
            "CONFIG_PAYLOADS".to_string(),
            serde_json::to_string(&self.config_payloads)?,
        );
        env.insert("COMMUNICATION_TOKEN".to_string(), self.token.clone());
        env.insert("HTTP_QUERY".to_string(), serde_json::to_string(&self.query)?);
        env.insert("PARAMS".to_string(), serde_json::to_string(&self.params)?);
        env.insert(
            "HTTP_HEADERS".to_string(),
            serde_json::to_string(&self.headers)?,
        );
        env.insert(
            "BUILD_NUMBER".to_string(),
            self.execution.execution_number.to_string(),
        );
        env.insert("MASTER_BASE_URL".to_string(), self.master_url.clone());
        env.insert(
            "PIPELINE_ID".to_string(),
            self.execution.pipeline_id.clone(),
        );

        if let Ok(tz) = std::env::var("TZ") {
            env.insert("TZ".to_string(), tz);
        }

        Ok(env)
    }
}

/// Output of a finished script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Stdout followed by stderr
    pub output: String,
    pub exit_code: i32,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Errors raised while running a script
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode environment: {0}")]
    Environment(#[from] serde_json::Error),

    #[error("Execution exceeded {seconds}s and was killed")]
    Timeout { seconds: u64 },

    /// The backend itself failed (e.g. the container could not be started)
    #[error("Executor failure: {0}")]
    Backend(String),

    /// The executor panicked or its worker thread was lost
    #[error("Executor aborted: {0}")]
    Aborted(String),
}

/// A worker backend able to run pipeline scripts
pub trait Executor: Send + Sync {
    /// Type tag this executor was registered under
    fn kind(&self) -> &'static str;

    /// Runs the script to completion
    fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, ExecutorError>;
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Spawns the command, retrying while the kernel reports the executable busy
///
/// A freshly written script can still be held open for writing by a child
/// forked concurrently from another thread until that child execs.
fn spawn(command: &mut Command) -> std::io::Result<Child> {
    let mut attempt = 1;
    loop {
        match command.spawn() {
            Err(e) if e.kind() == ErrorKind::ExecutableFileBusy && attempt < SPAWN_ATTEMPTS => {
                debug!("Executable busy, retrying spawn ({}/{})", attempt, SPAWN_ATTEMPTS);
                thread::sleep(Duration::from_millis(10 * u64::from(attempt)));
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Runs a command, capturing stdout and stderr, optionally bounded by `timeout`
///
/// On overrun the child is killed and `ExecutorError::Timeout` is returned.
pub(crate) fn run_captured(
    mut command: Command,
    timeout: Option<Duration>,
) -> Result<ExecutionResult, ExecutorError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = spawn(&mut command)?;

    let stdout = child.stdout.take().map(spawn_reader);
    let stderr = child.stderr.take().map(spawn_reader);

    let status = match timeout {
        None => child.wait()?,
        Some(limit) => {
            let deadline = Instant::now() + limit;
            loop {
                if let Some(status) = child.try_wait()? {
                    break status;
                }
                if Instant::now() >= deadline {
                    warn!("Process {} exceeded {:?}, killing it", child.id(), limit);
                    if let Err(e) = child.kill() {
                        warn!("Failed to kill process {}: {}", child.id(), e);
                    }
                    let _ = child.wait();
                    return Err(ExecutorError::Timeout {
                        seconds: limit.as_secs(),
                    });
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
    };

    let mut output = join_reader(stdout);
    output.push_str(&join_reader(stderr));

    let exit_code = status.code().unwrap_or(-1);
    debug!(
        "Process finished: exit_code={}, output_len={}",
        exit_code,
        output.len()
    );

    Ok(ExecutionResult { output, exit_code })
}

fn spawn_reader<R: Read + Send + 'static>(mut source: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = source.read_to_end(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}
