//! Loader for workflow definitions
//!
//! Handles loading workflow definitions from YAML files found in an
//! ordered list of search directories, by default `.flowrun/workflows`
//! followed by `~/.flowrun/workflows`.

use dirs::home_dir;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::EngineConfig;
use crate::workflow::error::WorkflowError;
use crate::workflow::types::WorkflowDefinition;

/// Get path to the home directory workflow location
pub fn home_workflows_path() -> Option<PathBuf> {
    home_dir().map(|path| path.join(".flowrun").join("workflows"))
}

/// Finds and parses workflow documents
#[derive(Debug, Clone)]
pub struct WorkflowLoader {
    dirs: Vec<PathBuf>,
}

impl WorkflowLoader {
    /// Search the given directories, earlier ones first
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// Configured workflow directory, then the home directory when enabled
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut dirs = vec![config.workflow_dir.clone()];
        if config.include_home_dir {
            if let Some(home) = home_workflows_path() {
                if !dirs.contains(&home) {
                    dirs.push(home);
                }
            }
        }
        Self::new(dirs)
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Load a workflow by name (with or without a .yaml/.yml extension)
    pub fn load(&self, name: &str) -> Result<WorkflowDefinition, WorkflowError> {
        let path = self.find_workflow_file(name)?;
        Self::load_file(&path)
    }

    /// Load and validate a workflow document at an explicit path
    pub fn load_file(path: &Path) -> Result<WorkflowDefinition, WorkflowError> {
        let content = fs::read_to_string(path)?;
        WorkflowDefinition::from_yaml(&content).map_err(|e| match e {
            WorkflowError::DefinitionInvalid(msg) => {
                WorkflowError::DefinitionInvalid(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Find a workflow file by name
    ///
    /// Each directory is tried in order, first with the name as given (or
    /// with `.yaml` appended) and then with the alternate extension.
    pub fn find_workflow_file(&self, name: &str) -> Result<PathBuf, WorkflowError> {
        let normalized_name = if name.ends_with(".yaml") || name.ends_with(".yml") {
            name.to_string()
        } else {
            format!("{}.yaml", name)
        };

        let alt_name = match normalized_name.strip_suffix(".yaml") {
            Some(stem) => format!("{}.yml", stem),
            None => format!("{}.yaml", normalized_name.trim_end_matches(".yml")),
        };

        for dir in &self.dirs {
            for candidate in [&normalized_name, &alt_name] {
                let path = dir.join(candidate);
                if path.is_file() {
                    tracing::debug!(path = %path.display(), "found workflow");
                    return Ok(path);
                }
            }
        }

        Err(WorkflowError::DefinitionNotFound {
            name: name.to_string(),
            searched: self.dirs.clone(),
        })
    }

    /// List all available workflows
    ///
    /// Returns the sorted, de-duplicated names (without extensions) of
    /// every workflow document in the search directories.
    pub fn list_workflows(&self) -> Result<Vec<String>, WorkflowError> {
        let mut workflows = Vec::new();

        for dir in &self.dirs {
            if dir.is_dir() {
                add_workflows_from_dir(dir, &mut workflows)?;
            }
        }

        workflows.sort();
        workflows.dedup();

        Ok(workflows)
    }
}

/// Add workflows from a directory to the list
fn add_workflows_from_dir(dir: &Path, workflows: &mut Vec<String>) -> Result<(), WorkflowError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();

        let is_yaml = path
            .extension()
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        if !is_yaml {
            continue;
        }
        if let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) {
            workflows.push(name.to_string());
        }
    }

    Ok(())
}
