//! flowrun: a declarative workflow execution engine
//!
//! Loads YAML workflow definitions made of phases or steps, runs each
//! step's tool with substituted parameters, retries failing phases and
//! escalates when they run out of attempts.

pub mod config;
pub mod tools;
pub mod workflow;
