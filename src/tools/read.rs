use std::path::Path;
use tokio::fs;

use crate::tools::ExecutionResult;

/// Read a whole file and return its contents as the step output
pub async fn execute_read(file_path: &Path) -> ExecutionResult {
    match fs::read_to_string(file_path).await {
        Ok(content) => {
            tracing::debug!(path = %file_path.display(), bytes = content.len(), "read file");
            ExecutionResult::success(content)
        }
        Err(e) => ExecutionResult::error(format!(
            "Error reading file '{}': {}",
            file_path.display(),
            e
        )),
    }
}
