//! CLI integration for the workflow system
//!
//! Provides the handlers behind the `run`, `validate` and `list`
//! subcommands and the parsing of `key=value` parameters.

use anyhow::{bail, Context};
use serde_yaml::Value as YamlValue;

use crate::workflow::executor::{WorkflowEngine, WorkflowRun};
use crate::workflow::loader::WorkflowLoader;
use crate::workflow::types::Params;

/// Run a workflow and report the outcome
///
/// Returns `Ok(false)` when the workflow ran but did not complete; the
/// failure has already been reported on stderr.
pub async fn handle_run(
    engine: &WorkflowEngine,
    name: &str,
    param_values: &[String],
    json: bool,
) -> anyhow::Result<bool> {
    let parameters = parse_parameters(param_values)?;

    let run = engine.execute(name, parameters).await;

    if json {
        let report = serde_json::to_string_pretty(&run.state).context("failed to serialize run state")?;
        println!("{}", report);
    }
    print_summary(&run);

    Ok(run.is_success())
}

/// Load and validate a workflow without running it
pub fn handle_validate(loader: &WorkflowLoader, name: &str) -> anyhow::Result<()> {
    let path = loader.find_workflow_file(name)?;
    let workflow = WorkflowLoader::load_file(&path)?;

    println!(
        "Workflow '{}' is valid ({} step(s), {})",
        workflow.name,
        workflow.step_count(),
        path.display()
    );
    for placeholder in workflow.undeclared_placeholders() {
        eprintln!(
            "warning: placeholder '{{{{ {} }}}}' is not a declared input and will be left as-is unless passed",
            placeholder
        );
    }
    Ok(())
}

/// List all available workflows
pub fn handle_list(loader: &WorkflowLoader) -> anyhow::Result<()> {
    let workflows = loader.list_workflows()?;

    if workflows.is_empty() {
        let dirs: Vec<String> = loader.dirs().iter().map(|d| d.display().to_string()).collect();
        println!("No workflows found. Create one in {}", dirs.join(" or "));
        return Ok(());
    }

    println!("Available workflows:");
    for workflow in workflows {
        println!("  - {}", workflow);
    }

    println!("\nRun with: flowrun run <name> [key=value ...]");
    Ok(())
}

/// Parse parameters from a list of key=value strings
pub fn parse_parameters(param_values: &[String]) -> anyhow::Result<Params> {
    let mut parameters = Params::new();

    for param in param_values {
        match param.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                parameters.insert(key.trim().to_string(), YamlValue::String(value.to_string()));
            }
            _ => bail!("Invalid parameter format: {}. Use key=value", param),
        }
    }

    Ok(parameters)
}

fn print_summary(run: &WorkflowRun) {
    let state = &run.state;
    let elapsed = state
        .duration()
        .and_then(|d| d.to_std().ok())
        .map(|d| format!(" in {:.2}s", d.as_secs_f64()))
        .unwrap_or_default();

    match &run.result {
        Ok(()) => {
            eprintln!(
                "Workflow '{}' completed{} ({} step(s) completed)",
                state.workflow_name,
                elapsed,
                state.steps_completed.len()
            );
        }
        Err(e) => {
            eprintln!("Workflow '{}' failed{}: {}", state.workflow_name, elapsed, e);
            let root = e.root_message();
            if root != e.to_string() {
                eprintln!("  cause: {}", root);
            }
            if !state.steps_failed.is_empty() {
                eprintln!("  failed steps: {}", state.steps_failed.join(", "));
            }
            for escalation in &state.escalations {
                eprintln!("  escalated to {}: {}", escalation.target, escalation.reason);
            }
        }
    }

    for criterion in &state.unmet_criteria {
        eprintln!("  unmet success criterion: {}", criterion);
    }
}
