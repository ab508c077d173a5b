use crate::tools::ExecutionResult;
use crate::workflow::interrupt::Interrupt;

/// List paths matching a glob pattern, sorted and newline separated
pub fn execute_glob(pattern: &str, interrupt: &Interrupt) -> ExecutionResult {
    let entries = match glob::glob(pattern) {
        Ok(entries) => entries,
        Err(e) => return ExecutionResult::error(format!("Invalid glob pattern '{}': {}", pattern, e)),
    };

    let mut paths = Vec::new();
    for entry in entries {
        if let Some(cancelled) = cancelled(interrupt) {
            return cancelled;
        }
        if let Ok(path) = entry {
            paths.push(path.display().to_string());
        }
    }
    if let Some(cancelled) = cancelled(interrupt) {
        return cancelled;
    }
    paths.sort();

    tracing::debug!(pattern, matches = paths.len(), "glob finished");
    ExecutionResult::success(paths.join("\n"))
}

fn cancelled(interrupt: &Interrupt) -> Option<ExecutionResult> {
    interrupt.is_interrupted().then(|| {
        let reason = interrupt.reason().unwrap_or_else(|| "no reason provided".to_string());
        ExecutionResult::error(format!("Glob cancelled: {}", reason))
    })
}
