// src/dashboard/console.rs

use std::sync::Arc;

use tracing::{error, info, warn};

use super::{Dashboard, DashboardTask, TaskState};

/// Dashboard that renders task progress through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct ConsoleDashboard;

impl ConsoleDashboard {
    pub fn new() -> Self {
        Self
    }
}

impl Dashboard for ConsoleDashboard {
    fn begin_task(&self, verb: &str, display_name: &str) -> Arc<dyn DashboardTask> {
        Arc::new(ConsoleTask {
            verb: verb.to_string(),
            name: display_name.to_string(),
        })
    }
}

struct ConsoleTask {
    verb: String,
    name: String,
}

impl DashboardTask for ConsoleTask {
    fn set_state(&self, state: TaskState) {
        match state {
            TaskState::Failed => {
                error!(verb = %self.verb, task = %self.name, state = %state, "task state")
            }
            TaskState::Blocked => {
                warn!(verb = %self.verb, task = %self.name, state = %state, "task state")
            }
            _ => info!(verb = %self.verb, task = %self.name, state = %state, "task state"),
        }
    }

    fn add_output(&self, text: &str) {
        for line in text.lines() {
            info!(verb = %self.verb, task = %self.name, "{}", line);
        }
    }
}
