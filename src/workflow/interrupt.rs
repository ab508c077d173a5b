//! Cancellation for running workflows
//!
//! An [`Interrupt`] is shared between the caller and the engine. The engine
//! checks it before each step and the shell tool polls it while a command
//! runs, killing the child when it is set.

use std::sync::{Arc, Mutex, MutexGuard};

/// Data structure for managing interruption with reason
#[derive(Debug, Default)]
pub struct InterruptData {
    /// Flag indicating whether the run should stop
    pub flag: bool,
    /// Optional reason for the interruption
    pub reason: Option<String>,
}

/// Cloneable handle to shared [`InterruptData`]
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    data: Arc<Mutex<InterruptData>>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request interruption; the first reason wins
    pub fn interrupt(&self, reason: impl Into<String>) {
        let mut data = self.lock();
        if !data.flag {
            data.flag = true;
            data.reason = Some(reason.into());
        }
    }

    /// Check if interruption is requested
    pub fn is_interrupted(&self) -> bool {
        self.lock().flag
    }

    /// Get interruption reason
    pub fn reason(&self) -> Option<String> {
        self.lock().reason.clone()
    }

    fn lock(&self) -> MutexGuard<'_, InterruptData> {
        // A poisoned flag is still a valid flag
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
