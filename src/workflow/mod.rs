//! Workflow system for orchestrating sequences of tool invocations
//!
//! Workflows are YAML documents stored in `.flowrun/workflows` (or the
//! home directory equivalent) describing phases or flat steps. The engine
//! loads a document, substitutes parameters, evaluates conditions, dispatches
//! tools, validates results and records everything in a [`state::WorkflowState`].

pub mod cli;
pub mod condition;
pub mod error;
pub mod executor;
pub mod interrupt;
pub mod loader;
pub mod state;
pub mod template;
pub mod types;
pub mod validation;

pub use error::WorkflowError;
pub use executor::{WorkflowEngine, WorkflowRun};
pub use state::{WorkflowState, WorkflowStatus};
pub use types::{Params, WorkflowDefinition};
