// src/dashboard/mod.rs

//! Progress sink for build tasks.
//!
//! The driver begins one task per queued action and reports state
//! transitions and action output to it. [`ConsoleDashboard`] renders through
//! `tracing`; [`memory::MemoryDashboard`] records everything for tests.

use std::fmt;
use std::sync::Arc;

pub mod console;
pub mod memory;

pub use console::ConsoleDashboard;
pub use memory::MemoryDashboard;

/// Externally visible state of a dashboard task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    /// Rolled back; waiting for a missing dependency to be provided.
    Blocked,
    /// Terminal: a test action ran and passed.
    Passed,
    Success,
    Failed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Blocked => "blocked",
            TaskState::Passed => "passed",
            TaskState::Success => "success",
            TaskState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One task on the dashboard, handed out by [`Dashboard::begin_task`].
pub trait DashboardTask: Send + Sync {
    fn set_state(&self, state: TaskState);

    /// Append a line (or chunk) of live output for this task.
    fn add_output(&self, text: &str);
}

pub trait Dashboard: Send + Sync {
    fn begin_task(&self, verb: &str, display_name: &str) -> Arc<dyn DashboardTask>;
}
