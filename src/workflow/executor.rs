//! Executor for workflows
//!
//! Drives a [`WorkflowDefinition`] phase by phase and step by step,
//! coordinating substitution, conditions, tool dispatch and validation, and
//! rolling every outcome up into a [`WorkflowState`].

use serde_yaml::Value;

use crate::config::EngineConfig;
use crate::tools::{self, execute_shell, DispatchContext};
use crate::workflow::condition::{evaluate, try_evaluate};
use crate::workflow::error::{StepFailure, WorkflowError};
use crate::workflow::interrupt::Interrupt;
use crate::workflow::loader::WorkflowLoader;
use crate::workflow::state::{Escalation, StepRecord, WorkflowState};
use crate::workflow::template::substitute;
use crate::workflow::types::{
    Params, Phase, Step, SuccessCriteria, WorkflowBody, WorkflowDefinition, ESCALATION_ERROR_PARAM,
};
use crate::workflow::validation::validate;

/// Outcome of a run: the full execution record plus how it ended
#[derive(Debug)]
pub struct WorkflowRun {
    pub state: WorkflowState,
    pub result: Result<(), WorkflowError>,
}

impl WorkflowRun {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Executes workflow definitions
#[derive(Debug, Clone)]
pub struct WorkflowEngine {
    loader: WorkflowLoader,
    ctx: DispatchContext,
    enforce_success_criteria: bool,
}

impl WorkflowEngine {
    /// Create an engine with default dispatch settings
    pub fn new(loader: WorkflowLoader) -> Self {
        Self {
            loader,
            ctx: DispatchContext::default(),
            enforce_success_criteria: false,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            loader: WorkflowLoader::from_config(config),
            ctx: DispatchContext {
                shell_timeout: config.shell_timeout(),
                ..DispatchContext::default()
            },
            enforce_success_criteria: config.enforce_success_criteria,
        }
    }

    /// Share a cancellation handle with the caller
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.ctx.interrupt = interrupt;
        self
    }

    pub fn with_enforced_success_criteria(mut self, enforce: bool) -> Self {
        self.enforce_success_criteria = enforce;
        self
    }

    pub fn loader(&self) -> &WorkflowLoader {
        &self.loader
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.ctx.interrupt
    }

    /// Load the named workflow and execute it with `params`
    pub async fn execute(&self, name: &str, params: Params) -> WorkflowRun {
        match self.loader.load(name) {
            Ok(definition) => self.execute_definition(&definition, params).await,
            Err(e) => {
                tracing::error!(workflow = name, error = %e, "failed to load workflow");
                let mut state = WorkflowState::new(name);
                state.fail();
                WorkflowRun { state, result: Err(e) }
            }
        }
    }

    /// Execute an already loaded definition
    pub async fn execute_definition(&self, definition: &WorkflowDefinition, params: Params) -> WorkflowRun {
        let mut run = Run {
            ctx: &self.ctx,
            state: WorkflowState::new(&definition.name),
            params,
        };

        let result = run.drive(definition, self.enforce_success_criteria).await;

        let mut state = run.state;
        match &result {
            Ok(()) => {
                state.complete();
                tracing::info!(
                    workflow = %definition.name,
                    steps = state.steps_completed.len(),
                    "workflow completed"
                );
            }
            Err(e) => {
                state.fail();
                tracing::error!(workflow = %definition.name, error = %e, "workflow failed");
            }
        }

        WorkflowRun { state, result }
    }
}

/// Mutable state of one execution
struct Run<'a> {
    ctx: &'a DispatchContext,
    state: WorkflowState,
    params: Params,
}

impl Run<'_> {
    async fn drive(&mut self, definition: &WorkflowDefinition, enforce_criteria: bool) -> Result<(), WorkflowError> {
        self.prepare_params(definition)?;

        self.state.start();
        tracing::info!(
            workflow = %definition.name,
            description = %definition.description,
            "starting workflow"
        );

        match &definition.body {
            WorkflowBody::Phases(phases) => {
                for phase in phases {
                    self.run_phase(phase).await?;
                }
            }
            WorkflowBody::Steps(steps) => self.run_steps(None, steps, 1).await?,
        }

        if let Some(criteria) = &definition.success_criteria {
            self.check_success_criteria(criteria, enforce_criteria)?;
        }

        Ok(())
    }

    /// Apply input defaults, then require every declared input
    fn prepare_params(&mut self, definition: &WorkflowDefinition) -> Result<(), WorkflowError> {
        for (key, value) in &definition.inputs.defaults {
            self.params.entry(key.clone()).or_insert_with(|| value.clone());
        }

        for required in &definition.inputs.required {
            if !self.params.contains_key(required) {
                return Err(WorkflowError::MissingInput(required.clone()));
            }
        }

        Ok(())
    }

    /// Run a phase, re-running its whole step sequence until it passes or
    /// the attempts are used up
    async fn run_phase(&mut self, phase: &Phase) -> Result<(), WorkflowError> {
        self.state.current_phase = Some(phase.name.clone());
        let mut attempt = 1;

        loop {
            tracing::info!(
                phase = %phase.name,
                attempt,
                max_attempts = phase.max_attempts,
                "starting phase"
            );

            match self.run_steps(Some(&phase.name), &phase.steps, attempt).await {
                Ok(()) => return Ok(()),
                Err(e @ WorkflowError::Cancelled(_)) => return Err(e),
                Err(_) if self.ctx.interrupt.is_interrupted() => return Err(self.cancelled()),
                Err(e) if attempt < phase.max_attempts => {
                    tracing::warn!(phase = %phase.name, attempt, error = %e, "phase attempt failed, retrying");
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(phase = %phase.name, attempts = attempt, error = %e, "phase failed");
                    self.escalate(phase, &e).await;
                    return Err(WorkflowError::PhaseRetryExhausted {
                        phase: phase.name.clone(),
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
            }
        }
    }

    async fn run_steps(&mut self, phase: Option<&str>, steps: &[Step], attempt: u32) -> Result<(), WorkflowError> {
        for (index, step) in steps.iter().enumerate() {
            if self.ctx.interrupt.is_interrupted() {
                return Err(self.cancelled());
            }
            tracing::info!(
                step = step.display_name(),
                position = index + 1,
                total = steps.len(),
                "running step"
            );
            self.run_step(phase, step, attempt).await?;
        }
        Ok(())
    }

    /// Condition, dispatch, validate, record
    async fn run_step(&mut self, phase: Option<&str>, step: &Step, attempt: u32) -> Result<(), WorkflowError> {
        let name = step.display_name().to_string();

        if let Some(condition) = &step.condition {
            if !evaluate(condition, &self.params) {
                tracing::info!(step = %name, condition = %condition, "condition not met, skipping step");
                return Ok(());
            }
        }

        let mut result = tools::dispatch(step, &self.params, self.ctx).await;
        result.attempt = attempt;

        let failure = if result.is_success() {
            match validate(&result, &step.validation) {
                Ok(()) => None,
                Err(violation) => {
                    result.mark_failed(violation.to_string());
                    Some(StepFailure::Validation(violation))
                }
            }
        } else {
            let message = result
                .error
                .clone()
                .unwrap_or_else(|| "step reported failure".to_string());
            Some(StepFailure::Dispatch(message))
        };

        let output = result.output.clone();
        self.state.step_results.push(StepRecord {
            phase: phase.map(str::to_string),
            step: name.clone(),
            result,
        });

        match failure {
            None => {
                tracing::debug!(step = %name, "step succeeded");
                self.state.steps_completed.push(name);
                if let Some(key) = &step.store_output {
                    let value = output
                        .unwrap_or_default()
                        .trim_end_matches(['\r', '\n'])
                        .to_string();
                    self.params.insert(key.clone(), Value::String(value.clone()));
                    self.state.outputs.insert(key.clone(), value);
                }
                Ok(())
            }
            Some(cause) => {
                tracing::warn!(step = %name, attempt, error = %cause, "step failed");
                self.state.steps_failed.push(name.clone());
                Err(WorkflowError::StepFailed { step: name, cause })
            }
        }
    }

    /// Record an escalation for every failure action; commands are best effort
    async fn escalate(&mut self, phase: &Phase, error: &WorkflowError) {
        let message = error.to_string();
        let mut params = self.params.clone();
        params.insert(ESCALATION_ERROR_PARAM.to_string(), Value::String(message.clone()));

        for action in &phase.failure_actions {
            let target = action
                .escalate_to
                .clone()
                .unwrap_or_else(|| "unassigned".to_string());
            let reason = match &action.reason {
                Some(template) => substitute(template, &params),
                None => message.clone(),
            };

            tracing::warn!(phase = %phase.name, target = %target, reason = %reason, "escalating");
            self.state.escalations.push(Escalation { target, reason });

            if let Some(command) = &action.command {
                let command = substitute(command, &params);
                let result = execute_shell(&command, self.ctx.shell_timeout, &self.ctx.interrupt).await;
                if !result.is_success() {
                    tracing::warn!(
                        phase = %phase.name,
                        command = %command,
                        error = result.error.as_deref().unwrap_or_default(),
                        "escalation command failed"
                    );
                }
            }
        }
    }

    fn check_success_criteria(&mut self, criteria: &SuccessCriteria, enforce: bool) -> Result<(), WorkflowError> {
        for criterion in &criteria.all_of {
            match try_evaluate(criterion, &self.params) {
                Ok(true) => tracing::debug!(criterion = %criterion, "success criterion met"),
                Ok(false) => {
                    tracing::warn!(criterion = %criterion, "success criterion not met");
                    self.state.unmet_criteria.push(criterion.clone());
                }
                Err(e) => {
                    tracing::info!(criterion = %criterion, reason = %e, "success criterion cannot be checked, assuming met");
                }
            }
        }

        if enforce && !self.state.unmet_criteria.is_empty() {
            return Err(WorkflowError::SuccessCriteriaUnmet(self.state.unmet_criteria.clone()));
        }
        Ok(())
    }

    fn cancelled(&self) -> WorkflowError {
        let reason = self
            .ctx
            .interrupt
            .reason()
            .unwrap_or_else(|| "interrupted".to_string());
        WorkflowError::Cancelled(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::state::WorkflowStatus;
    use std::fs;
    use tempfile::TempDir;

    fn engine() -> WorkflowEngine {
        WorkflowEngine::new(WorkflowLoader::new(Vec::new()))
    }

    fn definition(yaml: &str) -> WorkflowDefinition {
        WorkflowDefinition::from_yaml(yaml).unwrap()
    }

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from(*v)))
            .collect()
    }

    #[tokio::test]
    async fn test_invalid_definition_runs_nothing() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ran");
        fs::write(
            dir.path().join("nameless.yaml"),
            format!(
                "description: d\ntype: workflow\nsteps:\n  - tool: Write\n    params:\n      file_path: {}\n",
                marker.display()
            ),
        )
        .unwrap();

        let engine = WorkflowEngine::new(WorkflowLoader::new(vec![dir.path().to_path_buf()]));
        let run = engine.execute("nameless", Params::new()).await;

        assert!(matches!(run.result, Err(WorkflowError::DefinitionInvalid(_))));
        assert_eq!(run.state.status(), WorkflowStatus::Failed);
        assert!(run.state.steps_completed.is_empty());
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_unknown_workflow() {
        let run = engine().execute("nope", Params::new()).await;
        assert!(matches!(run.result, Err(WorkflowError::DefinitionNotFound { .. })));
        assert_eq!(run.state.status(), WorkflowStatus::Failed);
    }

    #[tokio::test]
    async fn test_false_condition_skips_step() {
        let def = definition(
            r#"
name: conditional
description: d
type: workflow
steps:
  - action: always
  - action: only on release
    condition: "{{ release }} == true"
  - action: not on release
    condition: "not {{ release }}"
"#,
        );
        let run = engine().execute_definition(&def, params(&[("release", "false")])).await;

        assert!(run.is_success());
        assert_eq!(run.state.steps_completed, vec!["always", "not on release"]);
        assert!(run.state.steps_failed.is_empty());
        assert_eq!(run.state.step_results.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_input_fails_before_any_step() {
        let def = definition(
            "name: w\ndescription: d\ntype: workflow\ninputs:\n  required: [ticket]\nsteps:\n  - action: a\n",
        );
        let run = engine().execute_definition(&def, Params::new()).await;

        match run.result {
            Err(WorkflowError::MissingInput(name)) => assert_eq!(name, "ticket"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(run.state.steps_completed.is_empty());
        assert!(run.state.start_time.is_none());
        assert_eq!(run.state.status(), WorkflowStatus::Failed);
    }

    #[tokio::test]
    async fn test_defaults_satisfy_required_inputs() {
        let def = definition(
            r#"
name: w
description: d
type: workflow
inputs:
  required: [env]
  defaults:
    env: staging
steps:
  - action: deploy
    condition: "{{ env }} == staging"
"#,
        );
        let run = engine().execute_definition(&def, Params::new()).await;
        assert!(run.is_success());
        assert_eq!(run.state.steps_completed, vec!["deploy"]);

        // caller values win over defaults
        let run = engine().execute_definition(&def, params(&[("env", "prod")])).await;
        assert!(run.is_success());
        assert!(run.state.steps_completed.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_phase_retries_whole_sequence() {
        let dir = TempDir::new().unwrap();
        let counter = dir.path().join("attempts");
        let def = definition(
            r#"
name: flaky
description: passes on the third try
type: workflow
phases:
  - name: build
    max_attempts: 3
    steps:
      - action: prepare
        tool: Bash
        params:
          command: "true"
      - action: bump counter
        tool: Bash
        params:
          command: "n=$(cat '{{ counter }}' 2>/dev/null || echo 0); n=$((n+1)); echo $n > '{{ counter }}'; [ $n -ge 3 ]"
"#,
        );
        let run = engine()
            .execute_definition(&def, params(&[("counter", &counter.display().to_string())]))
            .await;

        assert!(run.is_success(), "{:?}", run.result);
        assert_eq!(run.state.status(), WorkflowStatus::Completed);
        assert_eq!(fs::read_to_string(&counter).unwrap().trim(), "3");
        assert_eq!(
            run.state.steps_completed,
            vec!["prepare", "prepare", "prepare", "bump counter"]
        );
        assert_eq!(run.state.steps_failed, vec!["bump counter", "bump counter"]);
        let attempts: Vec<u32> = run.state.step_results.iter().map(|r| r.result.attempt).collect();
        assert_eq!(attempts, vec![1, 1, 2, 2, 3, 3]);
        assert_eq!(run.state.current_phase.as_deref(), Some("build"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_timeout_fails_step() {
        let def = definition(
            r#"
name: slow
description: d
type: workflow
steps:
  - action: hang
    tool: Bash
    params:
      command: sleep 5
      timeout: 0.2
"#,
        );
        let run = engine().execute_definition(&def, Params::new()).await;

        match &run.result {
            Err(WorkflowError::StepFailed { step, cause: StepFailure::Dispatch(message) }) => {
                assert_eq!(step, "hang");
                assert!(message.contains("timed out"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(run.state.steps_failed, vec!["hang"]);
        assert_eq!(run.state.step_results[0].result.exit_code, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_validation_failure_ends_workflow() {
        let def = definition(
            r#"
name: ab
description: d
type: workflow
phases:
  - name: check
    max_attempts: 1
    steps:
      - action: A
        tool: Bash
        params:
          command: "true"
      - action: B
        tool: Bash
        params:
          command: exit 1
        validation: [exit_code_equals_0]
"#,
        );
        let run = engine().execute_definition(&def, Params::new()).await;

        assert_eq!(run.state.status(), WorkflowStatus::Failed);
        assert_eq!(run.state.steps_completed, vec!["A"]);
        assert_eq!(run.state.steps_failed, vec!["B"]);
        match run.result {
            Err(WorkflowError::PhaseRetryExhausted { phase, attempts, source }) => {
                assert_eq!(phase, "check");
                assert_eq!(attempts, 1);
                assert!(matches!(*source, WorkflowError::StepFailed { .. }));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(run.state.end_time.is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_validation_turns_success_into_failure() {
        let def = definition(
            r#"
name: lint
description: d
type: workflow
steps:
  - action: lint
    tool: Bash
    params:
      command: "echo 'SyntaxError: oops' >&2"
    validation: [no_syntax_errors]
"#,
        );
        let run = engine().execute_definition(&def, Params::new()).await;
        match &run.result {
            Err(WorkflowError::StepFailed { step, cause: StepFailure::Validation(v) }) => {
                assert_eq!(step, "lint");
                assert_eq!(v.rule, crate::workflow::validation::ValidationRule::NoFailureMarkers);
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let def = definition(
            r#"
name: exit
description: d
type: workflow
steps:
  - action: no exit code
    validation: [exit_code_equals_0]
"#,
        );
        let run = engine().execute_definition(&def, Params::new()).await;
        match run.result {
            Err(WorkflowError::StepFailed { cause: StepFailure::Validation(v), .. }) => {
                assert!(v.detail.contains("no exit code"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(run.state.step_results[0].result.status, tools::StepStatus::Failed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_flat_steps_do_not_retry() {
        let def = definition(
            r#"
name: flat
description: d
type: workflow
steps:
  - action: first
  - action: broken
    tool: Bash
    params:
      command: exit 2
  - action: never
"#,
        );
        let run = engine().execute_definition(&def, Params::new()).await;

        assert!(matches!(run.result, Err(WorkflowError::StepFailed { .. })));
        assert_eq!(run.state.steps_completed, vec!["first"]);
        assert_eq!(run.state.steps_failed, vec!["broken"]);
        assert_eq!(run.state.current_phase, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stored_output_feeds_later_steps() {
        let def = definition(
            r#"
name: outputs
description: d
type: workflow
steps:
  - action: detect version
    tool: Bash
    params:
      command: echo 1.4.0
    store_output: version
  - action: tag
    tool: Bash
    params:
      command: "echo v{{ version }}"
    store_output: tag
  - action: major only
    condition: "{{ version }} == 2.0.0"
"#,
        );
        let run = engine().execute_definition(&def, Params::new()).await;

        assert!(run.is_success());
        assert_eq!(run.state.outputs.get("version").map(String::as_str), Some("1.4.0"));
        assert_eq!(run.state.outputs.get("tag").map(String::as_str), Some("v1.4.0"));
        assert_eq!(run.state.steps_completed, vec!["detect version", "tag"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exhausted_phase_escalates() {
        let dir = TempDir::new().unwrap();
        let notified = dir.path().join("notified");
        let def = definition(&format!(
            r#"
name: deploy
description: d
type: workflow
phases:
  - name: ship
    max_attempts: 2
    steps:
      - action: push
        tool: Bash
        params:
          command: exit 4
    failure_actions:
      - escalate_to: oncall
        reason: "{{{{ service }}}} deploy failed: {{{{ error }}}}"
        command: "echo paged > '{}'"
      - escalate_to: broken-hook
        command: exit 9
"#,
            notified.display()
        ));
        let run = engine().execute_definition(&def, params(&[("service", "api")])).await;

        match &run.result {
            Err(WorkflowError::PhaseRetryExhausted { attempts, .. }) => assert_eq!(*attempts, 2),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(run.state.steps_failed, vec!["push", "push"]);
        assert_eq!(run.state.escalations.len(), 2);
        assert_eq!(run.state.escalations[0].target, "oncall");
        assert_eq!(
            run.state.escalations[0].reason,
            "api deploy failed: Step failed: push - Command exited with status 4"
        );
        assert_eq!(
            run.state.escalations[1].reason,
            "Step failed: push - Command exited with status 4"
        );
        assert_eq!(fs::read_to_string(&notified).unwrap(), "paged\n");
    }

    #[tokio::test]
    async fn test_success_criteria_advisory_and_enforced() {
        let yaml = r#"
name: criteria
description: d
type: workflow
steps:
  - action: only step
success_criteria:
  all_of:
    - "{{ coverage_ok }}"
    - "All tests pass"
    - "{{ mode }} == strict"
"#;
        let def = definition(yaml);
        let input = params(&[("coverage_ok", "false"), ("mode", "strict")]);

        let run = engine().execute_definition(&def, input.clone()).await;
        assert!(run.is_success());
        assert_eq!(run.state.unmet_criteria, vec!["{{ coverage_ok }}"]);
        assert_eq!(run.state.status(), WorkflowStatus::Completed);

        let run = engine()
            .with_enforced_success_criteria(true)
            .execute_definition(&def, input)
            .await;
        match run.result {
            Err(WorkflowError::SuccessCriteriaUnmet(unmet)) => {
                assert_eq!(unmet, vec!["{{ coverage_ok }}"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(run.state.status(), WorkflowStatus::Failed);
        assert_eq!(run.state.steps_completed, vec!["only step"]);
    }

    #[tokio::test]
    async fn test_interrupt_cancels_before_steps() {
        let def = definition(
            "name: w\ndescription: d\ntype: workflow\nphases:\n  - name: p\n    max_attempts: 3\n    steps:\n      - action: a\n",
        );
        let interrupt = Interrupt::new();
        interrupt.interrupt("ctrl-c");
        let engine = engine().with_interrupt(interrupt.clone());

        let run = engine.execute_definition(&def, Params::new()).await;
        match run.result {
            Err(WorkflowError::Cancelled(reason)) => assert_eq!(reason, "ctrl-c"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(run.state.steps_completed.is_empty());
        assert!(run.state.escalations.is_empty());
        assert_eq!(run.state.status(), WorkflowStatus::Failed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_interrupt_during_step_stops_retries() {
        let def = definition(
            r#"
name: long
description: d
type: workflow
phases:
  - name: wait
    max_attempts: 5
    steps:
      - action: sleep
        tool: Bash
        params:
          command: sleep 5
"#,
        );
        let interrupt = Interrupt::new();
        let handle = interrupt.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            handle.interrupt("stop");
        });

        let run = engine().with_interrupt(interrupt).execute_definition(&def, Params::new()).await;
        assert!(matches!(run.result, Err(WorkflowError::Cancelled(_))));
        assert_eq!(run.state.steps_failed, vec!["sleep"]);
    }
}
