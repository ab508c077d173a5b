use regex::Regex;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

use crate::tools::ExecutionResult;
use crate::workflow::interrupt::Interrupt;

/// Search files under `path` for lines matching the regex `pattern`
///
/// Matches are reported as `path:line:text`, one per line. Like grep, the
/// exit code is 0 when something matched and 1 otherwise; both count as a
/// successful step. Unreadable and non UTF-8 files are skipped. The walk
/// stops early once `interrupt` is set.
pub fn execute_search(pattern: &str, path: &Path, interrupt: &Interrupt) -> ExecutionResult {
    let regex = match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(e) => return ExecutionResult::error(format!("Invalid search pattern '{}': {}", pattern, e)),
    };

    if !path.exists() {
        return ExecutionResult::error(format!("Error: Path does not exist: '{}'", path.display()))
            .with_exit_code(Some(2));
    }

    let mut matches = Vec::new();
    let walker = WalkDir::new(path).sort_by_file_name().into_iter();

    for entry in walker.filter_map(Result::ok) {
        if interrupt.is_interrupted() {
            let reason = interrupt.reason().unwrap_or_else(|| "no reason provided".to_string());
            return ExecutionResult::error(format!("Search cancelled: {}", reason));
        }
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(content) = fs::read_to_string(entry.path()) else {
            continue;
        };
        for (index, line) in content.lines().enumerate() {
            if regex.is_match(line) {
                matches.push(format!("{}:{}:{}", entry.path().display(), index + 1, line));
            }
        }
    }

    tracing::debug!(pattern, path = %path.display(), matches = matches.len(), "search finished");

    let exit_code = if matches.is_empty() { 1 } else { 0 };
    ExecutionResult::success(matches.join("\n")).with_exit_code(Some(exit_code))
}
