// src/dashboard/memory.rs

//! Recording dashboard used by tests.

use std::sync::{Arc, Mutex};

use super::{Dashboard, DashboardTask, TaskState};

/// Dashboard that records every task it begins, along with each task's
/// state transitions and output.
#[derive(Debug, Clone, Default)]
pub struct MemoryDashboard {
    tasks: Arc<Mutex<Vec<Arc<MemoryTask>>>>,
}

impl MemoryDashboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// All tasks begun so far, in begin order.
    pub fn tasks(&self) -> Vec<Arc<MemoryTask>> {
        self.tasks.lock().unwrap().clone()
    }

    /// The first task whose display name matches, if any.
    pub fn find(&self, display_name: &str) -> Option<Arc<MemoryTask>> {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.display_name == display_name)
            .cloned()
    }

    /// Final states of all tasks, in begin order.
    pub fn final_states(&self) -> Vec<TaskState> {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.final_state())
            .collect()
    }
}

impl Dashboard for MemoryDashboard {
    fn begin_task(&self, verb: &str, display_name: &str) -> Arc<dyn DashboardTask> {
        let task = Arc::new(MemoryTask {
            verb: verb.to_string(),
            display_name: display_name.to_string(),
            states: Mutex::new(vec![TaskState::Pending]),
            output: Mutex::new(String::new()),
        });
        self.tasks.lock().unwrap().push(Arc::clone(&task));
        task
    }
}

#[derive(Debug)]
pub struct MemoryTask {
    pub verb: String,
    pub display_name: String,
    states: Mutex<Vec<TaskState>>,
    output: Mutex<String>,
}

impl MemoryTask {
    /// Every state this task has been set to, starting with `Pending`.
    pub fn states(&self) -> Vec<TaskState> {
        self.states.lock().unwrap().clone()
    }

    pub fn final_state(&self) -> TaskState {
        *self.states.lock().unwrap().last().unwrap()
    }

    pub fn output(&self) -> String {
        self.output.lock().unwrap().clone()
    }
}

impl DashboardTask for MemoryTask {
    fn set_state(&self, state: TaskState) {
        self.states.lock().unwrap().push(state);
    }

    fn add_output(&self, text: &str) {
        let mut out = self.output.lock().unwrap();
        out.push_str(text);
        if !text.ends_with('\n') {
            out.push('\n');
        }
    }
}
