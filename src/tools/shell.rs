use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout_at, Instant};

use crate::tools::ExecutionResult;
use crate::workflow::interrupt::Interrupt;

/// How often the running child is checked for exit, timeout and interruption
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Execute a shell command, capturing stdout, stderr and the exit code
///
/// # Arguments
/// * `command` - Command line passed to `sh -c` (`cmd /C` on Windows)
/// * `timeout` - Hard limit; the child is killed once it is exceeded
/// * `interrupt` - Shared cancellation flag, polled while the child runs
pub async fn execute_shell(command: &str, timeout: Duration, interrupt: &Interrupt) -> ExecutionResult {
    let (shell, shell_arg) = if cfg!(target_os = "windows") {
        ("cmd", "/C")
    } else {
        ("sh", "-c")
    };

    tracing::debug!(command, timeout_secs = timeout.as_secs_f64(), "spawning shell command");

    let mut child = match Command::new(shell)
        .arg(shell_arg)
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            return ExecutionResult::error(format!("Failed to start command '{}': {}", command, e))
        }
    };

    let stdout_task = child.stdout.take().map(|out| tokio::spawn(read_all(out)));
    let stderr_task = child.stderr.take().map(|err| tokio::spawn(read_all(err)));

    // Timeouts too large to represent never expire
    let deadline = Instant::now().checked_add(timeout);
    let timed_out = || ExecutionResult::error(format!("Command timed out after {}s", timeout.as_secs_f64()));

    // Main process monitoring loop
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if interrupt.is_interrupted() {
                    let _ = child.kill().await;
                    let reason = interrupt
                        .reason()
                        .unwrap_or_else(|| "no reason provided".to_string());
                    tracing::warn!(command, %reason, "shell command cancelled");
                    return ExecutionResult::error(format!("Command cancelled: {}", reason));
                }
                if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    let _ = child.kill().await;
                    tracing::warn!(command, "shell command timed out");
                    return timed_out();
                }
            }
            Err(e) => {
                let _ = child.kill().await;
                return ExecutionResult::error(format!("Error monitoring process status: {}", e));
            }
        }

        sleep(POLL_INTERVAL).await;
    };

    // A background grandchild can hold the pipes open past the shell's exit
    let (Some(stdout), Some(stderr)) = (
        collect(stdout_task, deadline).await,
        collect(stderr_task, deadline).await,
    ) else {
        return timed_out();
    };

    let exit_code = status.code();
    if status.success() {
        let mut result = ExecutionResult::success(stdout).with_exit_code(exit_code);
        // Diagnostics of a passing command stay visible to validation rules
        if !stderr.trim().is_empty() {
            result.error = Some(stderr);
        }
        result
    } else {
        let error = if stderr.trim().is_empty() {
            match exit_code {
                Some(code) => format!("Command exited with status {}", code),
                None => "Command terminated by signal".to_string(),
            }
        } else {
            stderr
        };
        let mut result = ExecutionResult::error(error).with_exit_code(exit_code);
        result.output = Some(stdout);
        result
    }
}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut buf = Vec::new();
    let _ = reader.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}

/// Wait for a reader task until `deadline`; `None` means it did not finish
async fn collect(task: Option<JoinHandle<String>>, deadline: Option<Instant>) -> Option<String> {
    let Some(handle) = task else {
        return Some(String::new());
    };
    match deadline {
        Some(deadline) => match timeout_at(deadline, handle).await {
            Ok(joined) => Some(joined.unwrap_or_default()),
            Err(_) => None,
        },
        None => Some(handle.await.unwrap_or_default()),
    }
}
