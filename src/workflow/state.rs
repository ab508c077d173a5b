//! Execution record of a single workflow run

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use crate::tools::ExecutionResult;

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    NotStarted,
    Running,
    Completed,
    Failed,
    /// Reserved; never produced by the engine
    Partial,
}

impl WorkflowStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Partial
        )
    }
}

/// An escalation raised when a phase ran out of attempts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Escalation {
    pub target: String,
    pub reason: String,
}

/// The result of one dispatched step
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    /// Enclosing phase, `None` for flat step workflows
    pub phase: Option<String>,
    pub step: String,
    pub result: ExecutionResult,
}

/// Authoritative record of a run, returned to the caller on success and failure
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowState {
    pub workflow_name: String,
    status: WorkflowStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub current_phase: Option<String>,
    pub steps_completed: Vec<String>,
    pub steps_failed: Vec<String>,
    pub outputs: IndexMap<String, String>,
    pub unmet_criteria: Vec<String>,
    pub escalations: Vec<Escalation>,
    pub step_results: Vec<StepRecord>,
}

impl WorkflowState {
    pub fn new(workflow_name: impl Into<String>) -> Self {
        Self {
            workflow_name: workflow_name.into(),
            status: WorkflowStatus::NotStarted,
            start_time: None,
            end_time: None,
            current_phase: None,
            steps_completed: Vec::new(),
            steps_failed: Vec::new(),
            outputs: IndexMap::new(),
            unmet_criteria: Vec::new(),
            escalations: Vec::new(),
            step_results: Vec::new(),
        }
    }

    pub fn status(&self) -> WorkflowStatus {
        self.status
    }

    /// Move to running and stamp the start time; ignored unless not started
    pub fn start(&mut self) {
        if self.status == WorkflowStatus::NotStarted {
            self.status = WorkflowStatus::Running;
            self.start_time = Some(Utc::now());
        }
    }

    /// Move to completed; only valid while running
    pub fn complete(&mut self) {
        if self.status == WorkflowStatus::Running {
            self.status = WorkflowStatus::Completed;
            self.end_time = Some(Utc::now());
        }
    }

    /// Move to failed from any non-terminal status
    pub fn fail(&mut self) {
        if !self.status.is_terminal() {
            self.status = WorkflowStatus::Failed;
            self.end_time = Some(Utc::now());
        }
    }

    /// Wall clock time of the run, once it has finished
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}
