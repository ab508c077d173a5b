//! Command-line interface definition and argument parsing
//!
//! This module uses clap to define and parse command-line arguments.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for flowrun
#[derive(Parser, Debug)]
#[command(
    name = "flowrun",
    about = "Run declarative YAML workflows",
    version,
    long_about = "flowrun loads workflow definitions from .flowrun/workflows and executes their phases and steps with retries, validation and escalation."
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Directory searched first for workflow documents
    #[arg(long, global = true)]
    pub workflow_dir: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands for flowrun
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a workflow
    Run {
        /// Name of the workflow to run
        name: String,

        /// Parameters for the workflow in key=value format
        #[arg(value_name = "KEY=VALUE")]
        args: Vec<String>,

        /// Additional key=value parameter
        #[arg(long = "param", short = 'p', value_name = "KEY=VALUE")]
        parameters: Vec<String>,

        /// Default shell command timeout in seconds
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        timeout: Option<u64>,

        /// Print the final workflow state as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Load and validate a workflow without running it
    Validate {
        /// Name of the workflow to validate
        name: String,
    },

    /// List available workflows
    List,
}

/// Default log filter for a `-v` count
pub fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::try_parse_from([
            "flowrun", "run", "release", "version=1.2", "-p", "env=prod", "-vv", "--timeout", "30", "--json",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Run { name, args, parameters, timeout, json } => {
                assert_eq!(name, "release");
                assert_eq!(args, vec!["version=1.2"]);
                assert_eq!(parameters, vec!["env=prod"]);
                assert_eq!(timeout, Some(30));
                assert!(json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(Cli::try_parse_from(["flowrun", "run", "release", "--timeout", "0"]).is_err());
    }

    #[test]
    fn test_global_workflow_dir() {
        let cli = Cli::try_parse_from(["flowrun", "list", "--workflow-dir", "ci"]).unwrap();
        assert_eq!(cli.workflow_dir, Some(PathBuf::from("ci")));
        assert!(matches!(cli.command, Commands::List));
    }

    #[test]
    fn test_log_level() {
        assert_eq!(log_level(0), "warn");
        assert_eq!(log_level(1), "info");
        assert_eq!(log_level(5), "debug");
    }
}
