//! Error types for workflow operations

use std::path::PathBuf;

use crate::workflow::validation::ValidationFailed;

/// Error types for workflow operations
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Workflow not found: {name} (searched: {})", format_dirs(.searched))]
    DefinitionNotFound { name: String, searched: Vec<PathBuf> },

    #[error("Invalid workflow definition: {0}")]
    DefinitionInvalid(String),

    #[error("Missing required parameter: {0}")]
    MissingInput(String),

    #[error("Step failed: {step} - {cause}")]
    StepFailed { step: String, cause: StepFailure },

    #[error("Phase '{phase}' failed after {attempts} attempt(s)")]
    PhaseRetryExhausted {
        phase: String,
        attempts: u32,
        #[source]
        source: Box<WorkflowError>,
    },

    #[error("Unmet success criteria: {}", .0.join(", "))]
    SuccessCriteriaUnmet(Vec<String>),

    #[error("Workflow cancelled: {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a single step failed
#[derive(Debug, thiserror::Error)]
pub enum StepFailure {
    /// The tool reported a failure
    #[error("{0}")]
    Dispatch(String),

    /// The tool succeeded but a validation rule did not hold
    #[error(transparent)]
    Validation(#[from] ValidationFailed),
}

impl WorkflowError {
    /// Innermost message, skipping the phase wrapper
    pub fn root_message(&self) -> String {
        match self {
            WorkflowError::PhaseRetryExhausted { source, .. } => source.root_message(),
            other => other.to_string(),
        }
    }
}

fn format_dirs(dirs: &[PathBuf]) -> String {
    if dirs.is_empty() {
        return "no directories".to_string();
    }
    dirs.iter()
        .map(|d| d.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
