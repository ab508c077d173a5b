//! flowrun - declarative workflow runner
//!
//! Parses the command line, layers configuration and dispatches to the
//! workflow subcommands.

mod cli;

use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use flowrun::config::EngineConfig;
use flowrun::workflow::cli::{handle_list, handle_run, handle_validate};
use flowrun::workflow::interrupt::Interrupt;
use flowrun::workflow::WorkflowEngine;

/// Main entry point for the application
fn main() -> ExitCode {
    // Load environment variables from .env file
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli::log_level(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut config = EngineConfig::load().context("Error loading configuration")?;
    if let Some(dir) = cli.workflow_dir {
        config.workflow_dir = dir;
    }
    if let Commands::Run { timeout: Some(secs), .. } = &cli.command {
        config.shell_timeout_secs = *secs;
    }

    let interrupt = Interrupt::new();
    let handle = interrupt.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nOperation interrupted by user");
        handle.interrupt("interrupted by user");
    })
    .context("Failed to set Ctrl+C handler")?;

    let engine = WorkflowEngine::from_config(&config).with_interrupt(interrupt);

    match cli.command {
        Commands::Run { name, mut args, parameters, json, .. } => {
            args.extend(parameters);
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            runtime.block_on(handle_run(&engine, &name, &args, json))
        }
        Commands::Validate { name } => handle_validate(engine.loader(), &name).map(|()| true),
        Commands::List => handle_list(engine.loader()).map(|()| true),
    }
}
