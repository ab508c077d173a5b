use std::path::Path;
use tokio::fs;

use crate::tools::ExecutionResult;

/// Write `content` to `file_path`, creating missing parent directories
pub async fn execute_write(file_path: &Path, content: &str) -> ExecutionResult {
    if let Some(parent) = file_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent).await {
                return ExecutionResult::error(format!(
                    "Error creating directory '{}': {}",
                    parent.display(),
                    e
                ));
            }
        }
    }

    match fs::write(file_path, content).await {
        Ok(()) => ExecutionResult::success(format!(
            "Wrote {} bytes to {}",
            content.len(),
            file_path.display()
        )),
        Err(e) => ExecutionResult::error(format!(
            "Error writing to file '{}': {}",
            file_path.display(),
            e
        )),
    }
}
