//! Type definitions for the workflow system
//!
//! Defines the structure of workflows, phases, steps and their inputs.
//! Documents are deserialized into a permissive raw form first and then
//! converted into a [`WorkflowDefinition`], which rejects structurally
//! invalid documents before anything runs.

use serde::Deserialize;
use serde_yaml::Value;
use std::collections::{HashMap, HashSet};

use crate::tools::Tool;
use crate::workflow::error::WorkflowError;
use crate::workflow::template::{placeholders, value_to_string};
use crate::workflow::validation::ValidationRule;

/// Literal every workflow document must carry in its `type` field
pub const WORKFLOW_KIND: &str = "workflow";

/// Parameter holding the failure message while failure actions run
pub const ESCALATION_ERROR_PARAM: &str = "error";

/// Runtime parameters, keyed by name
pub type Params = HashMap<String, Value>;

/// A complete, validated workflow definition
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    /// Name of the workflow
    pub name: String,

    /// Human readable description
    pub description: String,

    /// Declared kind, always [`WORKFLOW_KIND`] once loaded
    pub kind: String,

    /// Input requirements
    pub inputs: InputSpec,

    /// Phases or flat steps, never both
    pub body: WorkflowBody,

    /// Optional success criteria checked after all steps pass
    pub success_criteria: Option<SuccessCriteria>,
}

/// The executable part of a workflow
#[derive(Debug, Clone)]
pub enum WorkflowBody {
    /// Retryable phases, executed in order
    Phases(Vec<Phase>),

    /// Flat steps, executed once in order
    Steps(Vec<Step>),
}

/// Input requirements of a workflow
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InputSpec {
    /// Parameters the caller must supply
    #[serde(default)]
    pub required: Vec<String>,

    /// Values used when the caller does not supply a parameter
    #[serde(default)]
    pub defaults: HashMap<String, Value>,
}

/// A retryable group of steps
#[derive(Debug, Clone, Deserialize)]
pub struct Phase {
    #[serde(default = "default_phase_name")]
    pub name: String,

    pub description: Option<String>,

    /// How many times the whole step sequence may run
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default)]
    pub steps: Vec<Step>,

    /// Escalations run once the attempts are exhausted
    #[serde(default)]
    pub failure_actions: Vec<FailureAction>,
}

fn default_phase_name() -> String {
    "Unnamed Phase".to_string()
}

fn default_max_attempts() -> u32 {
    1
}

/// A single tool invocation
#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    /// Display name, preferred over `name`
    pub action: Option<String>,

    pub name: Option<String>,

    /// Tool to dispatch to; a missing tool is a simulated action
    pub tool: Option<Tool>,

    /// Handler specific arguments, values may contain placeholders
    #[serde(default)]
    pub params: HashMap<String, Value>,

    /// Skip the step unless this evaluates to true
    pub condition: Option<String>,

    /// Rules checked after a successful dispatch
    #[serde(default)]
    pub validation: Vec<ValidationRule>,

    /// Store the step output under this key
    pub store_output: Option<String>,
}

impl Step {
    /// Name used in logs and in the completed/failed step lists
    pub fn display_name(&self) -> &str {
        self.action
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("Unnamed Step")
    }
}

/// An escalation directive attached to a phase
#[derive(Debug, Clone, Deserialize)]
pub struct FailureAction {
    /// Who or what the failure is escalated to
    pub escalate_to: Option<String>,

    /// Reason template; `{{ error }}` expands to the failure message
    pub reason: Option<String>,

    /// Optional shell command run as part of the escalation
    pub command: Option<String>,
}

/// Assertions checked once every step has passed
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SuccessCriteria {
    #[serde(default)]
    pub all_of: Vec<String>,
}

/// Document shape as written on disk, before structural validation
#[derive(Debug, Deserialize)]
pub(crate) struct RawWorkflow {
    name: Option<String>,
    description: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    inputs: Option<InputSpec>,
    phases: Option<Vec<Phase>>,
    steps: Option<Vec<Step>>,
    success_criteria: Option<SuccessCriteria>,
}

impl TryFrom<RawWorkflow> for WorkflowDefinition {
    type Error = WorkflowError;

    fn try_from(raw: RawWorkflow) -> Result<Self, Self::Error> {
        let name = required_field(raw.name, "name")?;
        let description = required_field(raw.description, "description")?;
        let kind = required_field(raw.kind, "type")?;

        if kind != WORKFLOW_KIND {
            return Err(WorkflowError::DefinitionInvalid(format!(
                "invalid type '{}' (expected '{}')",
                kind, WORKFLOW_KIND
            )));
        }

        let body = match (raw.phases, raw.steps) {
            (Some(phases), None) => {
                if let Some(phase) = phases.iter().find(|p| p.max_attempts == 0) {
                    return Err(WorkflowError::DefinitionInvalid(format!(
                        "phase '{}' must allow at least one attempt",
                        phase.name
                    )));
                }
                WorkflowBody::Phases(phases)
            }
            (None, Some(steps)) => WorkflowBody::Steps(steps),
            (Some(_), Some(_)) => {
                return Err(WorkflowError::DefinitionInvalid(
                    "workflow must declare either 'phases' or 'steps', not both".to_string(),
                ))
            }
            (None, None) => {
                return Err(WorkflowError::DefinitionInvalid(
                    "workflow must declare either 'phases' or 'steps'".to_string(),
                ))
            }
        };

        Ok(Self {
            name,
            description,
            kind,
            inputs: raw.inputs.unwrap_or_default(),
            body,
            success_criteria: raw.success_criteria,
        })
    }
}

fn required_field(value: Option<String>, field: &str) -> Result<String, WorkflowError> {
    value.ok_or_else(|| WorkflowError::DefinitionInvalid(format!("missing required field: {}", field)))
}

impl WorkflowDefinition {
    /// Parse and validate a YAML workflow document
    pub fn from_yaml(content: &str) -> Result<Self, WorkflowError> {
        let raw: RawWorkflow = serde_yaml::from_str(content)
            .map_err(|e| WorkflowError::DefinitionInvalid(e.to_string()))?;
        raw.try_into()
    }

    /// Total number of steps across all phases
    pub fn step_count(&self) -> usize {
        self.steps().count()
    }

    /// Every step in execution order
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        let (phases, flat) = match &self.body {
            WorkflowBody::Phases(phases) => (phases.as_slice(), &[][..]),
            WorkflowBody::Steps(steps) => (&[][..], steps.as_slice()),
        };
        phases.iter().flat_map(|p| p.steps.iter()).chain(flat.iter())
    }

    /// Placeholders used by steps that no input, default or stored output provides
    ///
    /// Such placeholders are left verbatim at run time unless the caller
    /// passes a parameter of that name.
    pub fn undeclared_placeholders(&self) -> Vec<String> {
        let mut known: HashSet<&str> = self.inputs.required.iter().map(String::as_str).collect();
        known.extend(self.inputs.defaults.keys().map(String::as_str));
        known.extend(self.steps().filter_map(|s| s.store_output.as_deref()));

        let mut texts: Vec<String> = Vec::new();
        for step in self.steps() {
            texts.extend(step.params.values().map(value_to_string));
            texts.extend(step.condition.clone());
        }
        if let Some(criteria) = &self.success_criteria {
            texts.extend(criteria.all_of.iter().cloned());
        }

        // Failure actions also see `{{ error }}`
        let mut escalation_texts: Vec<String> = Vec::new();
        if let WorkflowBody::Phases(phases) = &self.body {
            for action in phases.iter().flat_map(|p| p.failure_actions.iter()) {
                escalation_texts.extend(action.reason.clone());
                escalation_texts.extend(action.command.clone());
            }
        }

        let escalation_names = escalation_texts
            .iter()
            .flat_map(|text| placeholders(text))
            .filter(|name| *name != ESCALATION_ERROR_PARAM);
        let mut names: Vec<String> = texts
            .iter()
            .flat_map(|text| placeholders(text))
            .chain(escalation_names)
            .filter(|name| !known.contains(name))
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();
        names
    }
}
