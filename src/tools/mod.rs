//! Tools a workflow step can invoke
//!
//! Each step names a [`Tool`]; the dispatcher resolves the step's parameters
//! into a typed [`ToolCall`] and runs the matching handler. Handlers never
//! return errors: every failure is reported as a failed [`ExecutionResult`].

pub mod edit;
pub mod glob;
pub mod read;
pub mod search;
pub mod shell;
pub mod write;

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::workflow::interrupt::Interrupt;
use crate::workflow::template::{substitute, value_to_string};
use crate::workflow::types::{Params, Step};

pub use edit::execute_edit;
pub use glob::execute_glob;
pub use read::execute_read;
pub use search::execute_search;
pub use shell::execute_shell;
pub use write::execute_write;

/// Default hard limit for a shell command
pub const DEFAULT_SHELL_TIMEOUT: Duration = Duration::from_secs(120);

/// The closed set of tools a step can name
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum Tool {
    /// `Bash`: run a shell command
    Shell,
    /// `Read`: read a file
    Read,
    /// `Write`: write a file
    Write,
    /// `Grep`: search file contents
    Search,
    /// `Glob`: enumerate matching paths
    Glob,
    /// `Edit`: placeholder for interactive edits
    Edit,
    /// Any other name, kept for the no-op message
    Unsupported(String),
}

impl From<String> for Tool {
    fn from(name: String) -> Self {
        match name.to_lowercase().as_str() {
            "bash" | "shell" | "sh" => Tool::Shell,
            "read" => Tool::Read,
            "write" => Tool::Write,
            "grep" | "search" => Tool::Search,
            "glob" => Tool::Glob,
            "edit" => Tool::Edit,
            _ => Tool::Unsupported(name),
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Tool::Shell => write!(f, "Bash"),
            Tool::Read => write!(f, "Read"),
            Tool::Write => write!(f, "Write"),
            Tool::Search => write!(f, "Grep"),
            Tool::Glob => write!(f, "Glob"),
            Tool::Edit => write!(f, "Edit"),
            Tool::Unsupported(name) => write!(f, "{}", name),
        }
    }
}

/// Outcome of a single tool execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failed,
}

/// Result of executing a step's tool
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub status: StepStatus,

    /// Captured output (stdout, file contents, matches...)
    pub output: Option<String>,

    /// Failure message or captured stderr
    pub error: Option<String>,

    /// Process exit code, when the tool has one
    pub exit_code: Option<i32>,

    /// Time spent in the handler
    #[serde(rename = "duration_secs", serialize_with = "serialize_secs")]
    pub duration: Duration,

    /// 1-based attempt of the enclosing phase
    pub attempt: u32,
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

impl ExecutionResult {
    /// Create a successful result
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Success,
            output: Some(output.into()),
            error: None,
            exit_code: None,
            duration: Duration::ZERO,
            attempt: 1,
        }
    }

    /// Create a failed result
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Failed,
            output: None,
            error: Some(message.into()),
            exit_code: None,
            duration: Duration::ZERO,
            attempt: 1,
        }
    }

    /// Attach an exit code
    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }

    /// Turn this result into a failure, keeping the captured output
    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = StepStatus::Failed;
        self.error = Some(message.into());
    }
}

/// Settings shared by every dispatch in a run
#[derive(Debug, Clone)]
pub struct DispatchContext {
    /// Timeout for shell commands without their own `timeout` param
    pub shell_timeout: Duration,

    /// Cancellation flag polled by long running handlers
    pub interrupt: Interrupt,
}

impl Default for DispatchContext {
    fn default() -> Self {
        Self {
            shell_timeout: DEFAULT_SHELL_TIMEOUT,
            interrupt: Interrupt::new(),
        }
    }
}

/// A tool invocation with its parameters resolved
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    Shell { command: String, timeout: Duration },
    Read { file_path: PathBuf },
    Write { file_path: PathBuf, content: String },
    Search { pattern: String, path: PathBuf },
    Glob { pattern: String },
    Edit,
    Noop { message: String },
}

impl ToolCall {
    /// Resolve `step` into a call, substituting `params` into every argument
    pub fn prepare(step: &Step, params: &Params, shell_timeout: Duration) -> Result<Self, String> {
        let arg = |key: &str| -> Option<String> {
            step.params
                .get(key)
                .map(|value| substitute(&value_to_string(value), params))
        };
        let required = |key: &str, tool: &str| -> Result<String, String> {
            arg(key).ok_or_else(|| format!("missing required parameter '{}' for {}", key, tool))
        };

        let Some(tool) = &step.tool else {
            return Ok(ToolCall::Noop {
                message: format!("Action '{}' completed (simulation)", step.display_name()),
            });
        };

        let call = match tool {
            Tool::Shell => {
                let timeout = match arg("timeout") {
                    Some(raw) => parse_timeout(&raw)?,
                    None => shell_timeout,
                };
                ToolCall::Shell {
                    command: required("command", "Bash")?,
                    timeout,
                }
            }
            Tool::Read => ToolCall::Read {
                file_path: required("file_path", "Read")?.into(),
            },
            Tool::Write => ToolCall::Write {
                file_path: required("file_path", "Write")?.into(),
                content: arg("content").unwrap_or_default(),
            },
            Tool::Search => ToolCall::Search {
                pattern: required("pattern", "Grep")?,
                path: arg("path").unwrap_or_else(|| ".".to_string()).into(),
            },
            Tool::Glob => ToolCall::Glob {
                pattern: required("pattern", "Glob")?,
            },
            Tool::Edit => ToolCall::Edit,
            Tool::Unsupported(name) => ToolCall::Noop {
                message: format!(
                    "Tool '{}' is not supported; step '{}' recorded as a no-op",
                    name,
                    step.display_name()
                ),
            },
        };

        Ok(call)
    }
}

fn parse_timeout(raw: &str) -> Result<Duration, String> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| *secs > 0.0)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| format!("invalid timeout '{}': expected a positive number of seconds", raw))
}

/// Execute one step's tool and time it
pub async fn dispatch(step: &Step, params: &Params, ctx: &DispatchContext) -> ExecutionResult {
    let start = Instant::now();

    let mut result = match ToolCall::prepare(step, params, ctx.shell_timeout) {
        Ok(call) => run(call, ctx).await,
        Err(message) => ExecutionResult::error(message),
    };

    result.duration = start.elapsed();
    result
}

async fn run(call: ToolCall, ctx: &DispatchContext) -> ExecutionResult {
    match call {
        ToolCall::Shell { command, timeout } => {
            execute_shell(&command, timeout, &ctx.interrupt).await
        }
        ToolCall::Read { file_path } => execute_read(&file_path).await,
        ToolCall::Write { file_path, content } => execute_write(&file_path, &content).await,
        ToolCall::Search { pattern, path } => {
            let interrupt = ctx.interrupt.clone();
            run_blocking(move || execute_search(&pattern, &path, &interrupt)).await
        }
        ToolCall::Glob { pattern } => {
            let interrupt = ctx.interrupt.clone();
            run_blocking(move || execute_glob(&pattern, &interrupt)).await
        }
        ToolCall::Edit => execute_edit(),
        ToolCall::Noop { message } => ExecutionResult::success(message),
    }
}

/// Run a filesystem walk off the async runtime
async fn run_blocking<F>(handler: F) -> ExecutionResult
where
    F: FnOnce() -> ExecutionResult + Send + 'static,
{
    match tokio::task::spawn_blocking(handler).await {
        Ok(result) => result,
        Err(e) => ExecutionResult::error(format!("Tool task failed: {}", e)),
    }
}
