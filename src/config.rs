//! Configuration for the workflow engine
//!
//! Values are layered: built-in defaults, then an optional
//! `.flowrun/config.{yaml,toml,json}` file, then `FLOWRUN_*` environment
//! variables. Command line flags are applied on top by the binary.

use config::{Config as ConfigLib, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up relative to the working directory, extension optional
pub const DEFAULT_CONFIG_FILE: &str = ".flowrun/config";

/// Engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// First directory searched for workflow documents
    pub workflow_dir: PathBuf,

    /// Also search `~/.flowrun/workflows`
    pub include_home_dir: bool,

    /// Default shell command timeout in seconds
    pub shell_timeout_secs: u64,

    /// Fail runs whose success criteria evaluate to false
    pub enforce_success_criteria: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workflow_dir: PathBuf::from(".flowrun").join("workflows"),
            include_home_dir: true,
            shell_timeout_secs: 120,
            enforce_success_criteria: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from the default config file and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    /// Load configuration with `file` (extension optional) as the file layer
    pub fn load_from(file: &Path) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = ConfigLib::builder()
            .set_default("workflow_dir", defaults.workflow_dir.display().to_string())?
            .set_default("include_home_dir", defaults.include_home_dir)?
            .set_default("shell_timeout_secs", defaults.shell_timeout_secs)?
            .set_default("enforce_success_criteria", defaults.enforce_success_criteria)?
            .add_source(File::with_name(&file.display().to_string()).required(false))
            .add_source(Environment::with_prefix("FLOWRUN").try_parsing(true))
            .build()?;

        let loaded: Self = config.try_deserialize()?;
        if loaded.shell_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "shell_timeout_secs must be a positive number of seconds".to_string(),
            ));
        }
        tracing::debug!(?loaded, "configuration loaded");
        Ok(loaded)
    }

    pub fn shell_timeout(&self) -> Duration {
        Duration::from_secs(self.shell_timeout_secs)
    }
}
