use crate::tools::ExecutionResult;

/// Placeholder for interactive edits
///
/// Edits need an agent driving them, which the engine does not have; the
/// step always succeeds and nothing on disk changes.
pub fn execute_edit() -> ExecutionResult {
    ExecutionResult::success("Edit operation skipped (requires an interactive agent)")
}
