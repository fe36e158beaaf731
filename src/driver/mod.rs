// src/driver/mod.rs

//! The dependency-directed action driver.
//!
//! The driver discovers work by scanning a source tree, runs actions
//! concurrently under a parallelism cap, and reacts to the provisions
//! actions publish by unblocking waiting actions and firing new ones. No
//! dependency graph is supplied up front: an action that asks for an entity
//! nobody has provided yet is rolled back, parked as blocked, and retried
//! from scratch once the entity appears.
//!
//! The pure state machine lives in [`core`]; the async/IO shell that spawns
//! action futures and feeds completion events back in is implemented in
//! [`runtime`]. Actions talk to the driver through a [`BuildContext`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::action::Action;
use crate::dashboard::DashboardTask;
use crate::entity::EntityId;
use crate::fs::FileHandle;

pub mod context;
pub mod core;
pub mod runtime;

pub use self::context::BuildContext;
pub use self::core::DriverCore;
pub use self::runtime::DriverRuntime;

/// Stable handle to an action record; queues store these, never the
/// records themselves.
pub type ActionId = u64;

/// The global provider table: which file provides each entity.
pub type EntityMap = HashMap<EntityId, FileHandle>;

/// Shared read view of the entity table handed to running actions.
pub type SharedEntityMap = Arc<RwLock<EntityMap>>;

/// Per-action state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    /// Queued, runnable.
    Pending,
    /// Currently executing; the only state in which `BuildContext`
    /// operations are legal.
    Running,
    Succeeded,
    Passed,
    Failed,
}

/// An offer by an action to make a file available under one or more
/// entity ids. Committed to the entity table only if the action
/// terminates successfully with no missing dependencies.
#[derive(Debug, Clone)]
pub struct Provision {
    pub file: FileHandle,
    pub entities: Vec<EntityId>,
}

/// Everything an action accumulated while running, shipped to the driver
/// loop as one event after the action's future finishes. Rollback is
/// atomic by construction: a report with outstanding missing dependencies
/// is never applied.
#[derive(Debug)]
pub struct ActionReport {
    pub state: ActionState,
    /// Entity id -> human-readable title, for every `find_provider` miss.
    pub missing: HashMap<EntityId, String>,
    pub provisions: Vec<Provision>,
    pub outputs: Vec<FileHandle>,
}

/// Events flowing into the driver loop.
#[derive(Debug)]
pub enum DriverEvent {
    /// An action's future finished; apply rollback or commit.
    ActionReturned { id: ActionId, report: ActionReport },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

/// Command produced by the pure core, to be executed by the outer IO shell.
pub enum DriverCommand {
    /// Spawn this action's future.
    StartAction {
        id: ActionId,
        action: Arc<dyn Action>,
        task: Arc<dyn DashboardTask>,
        tmpdir: FileHandle,
    },
}

impl fmt::Debug for DriverCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverCommand::StartAction { id, tmpdir, .. } => f
                .debug_struct("StartAction")
                .field("id", id)
                .field("tmpdir", &tmpdir.display_name())
                .finish_non_exhaustive(),
        }
    }
}

/// Decision returned by the core after handling a single [`DriverEvent`].
#[derive(Debug)]
pub struct CoreStep {
    pub commands: Vec<DriverCommand>,
    /// False once nothing is active or pending (blocked actions cannot
    /// make progress on their own), or when shutdown was requested.
    pub keep_running: bool,
}

/// Terminal tallies for a whole build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub succeeded: usize,
    pub passed: usize,
    pub failed: usize,
    /// Actions still waiting on an entity nobody provided at shutdown.
    pub blocked: usize,
}

impl BuildSummary {
    /// True when every action that ran came out clean.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.blocked == 0
    }
}
