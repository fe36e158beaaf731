// src/driver/core.rs

//! Pure driver state machine.
//!
//! This module owns the factory registry, the trigger index, the entity
//! table, and the three disjoint action queues (pending stack, active set,
//! blocked set + blocked-by index). It consumes [`DriverEvent`]s and
//! produces [`DriverCommand`]s for the IO shell; it has no tokio types and
//! is exercised directly by synchronous tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use tracing::{debug, error, warn};

use crate::action::{Action, ActionFactory};
use crate::dashboard::{Dashboard, DashboardTask, TaskState};
use crate::entity::EntityId;
use crate::fs::FileHandle;
use crate::types::DuplicateProvisions;

use super::{
    ActionId, ActionReport, ActionState, BuildSummary, CoreStep, DriverCommand, DriverEvent,
    SharedEntityMap,
};

/// One queued/active/blocked action, owned by the records arena.
struct ActionRecord {
    action: Arc<dyn Action>,
    task: Arc<dyn DashboardTask>,
    /// Directory in the tmp tree where the action's outputs land.
    tmpdir: FileHandle,
    state: ActionState,
    /// Non-empty only while the record is blocked; mirrors the entries
    /// held for it in `blocked_by`.
    missing: HashMap<EntityId, String>,
}

pub struct DriverCore {
    dashboard: Arc<dyn Dashboard>,
    src: FileHandle,
    tmp: FileHandle,
    max_concurrent: usize,
    duplicate_provisions: DuplicateProvisions,

    factories: BTreeMap<String, Arc<dyn ActionFactory>>,
    /// Exact-id trigger index: entity -> factories to ask on provision.
    triggers: HashMap<EntityId, Vec<Arc<dyn ActionFactory>>>,
    /// `kind:*` trigger index, keyed by kind.
    kind_triggers: HashMap<String, Vec<Arc<dyn ActionFactory>>>,

    entities: SharedEntityMap,

    /// Arena of action records; queues hold ids into it. Terminal records
    /// are discarded once their completion has been handled.
    records: HashMap<ActionId, ActionRecord>,
    next_action_id: ActionId,

    /// Runnable actions, as a stack: the scheduler pops from the back,
    /// yielding a depth-first build front.
    pending: Vec<ActionId>,
    active: Vec<ActionId>,
    blocked: HashSet<ActionId>,
    /// `(entity -> waiting action)` for every missing dependency of every
    /// blocked action.
    blocked_by: HashMap<EntityId, Vec<ActionId>>,

    summary: BuildSummary,
}

impl DriverCore {
    pub fn new(
        dashboard: Arc<dyn Dashboard>,
        src: FileHandle,
        tmp: FileHandle,
        max_concurrent: usize,
    ) -> Self {
        Self {
            dashboard,
            src,
            tmp,
            max_concurrent: max_concurrent.max(1),
            duplicate_provisions: DuplicateProvisions::default(),
            factories: BTreeMap::new(),
            triggers: HashMap::new(),
            kind_triggers: HashMap::new(),
            entities: Arc::new(RwLock::new(HashMap::new())),
            records: HashMap::new(),
            next_action_id: 0,
            pending: Vec::new(),
            active: Vec::new(),
            blocked: HashSet::new(),
            blocked_by: HashMap::new(),
            summary: BuildSummary::default(),
        }
    }

    pub fn with_duplicate_provisions(mut self, policy: DuplicateProvisions) -> Self {
        self.duplicate_provisions = policy;
        self
    }

    /// Register a factory and index its trigger interests.
    pub fn add_action_factory(&mut self, name: &str, factory: Arc<dyn ActionFactory>) {
        for id in factory.trigger_entities() {
            if id.is_kind_wildcard() {
                self.kind_triggers
                    .entry(id.kind().to_string())
                    .or_default()
                    .push(Arc::clone(&factory));
            } else {
                self.triggers.entry(id).or_default().push(Arc::clone(&factory));
            }
        }
        self.factories.insert(name.to_string(), factory);
    }

    /// Shared read view of the entity table, for build contexts and tests.
    pub fn entity_map(&self) -> SharedEntityMap {
        Arc::clone(&self.entities)
    }

    /// Nothing active and nothing runnable. Blocked actions do not count:
    /// they cannot make progress on their own.
    pub fn is_idle(&self) -> bool {
        self.active.is_empty() && self.pending.is_empty()
    }

    /// Scan the source tree mirrored into tmp, then fire one scheduler
    /// tick.
    pub fn start(&mut self) -> Vec<DriverCommand> {
        let (src, tmp) = (self.src.clone(), self.tmp.clone());
        self.scan_for_actions(&src, &tmp);
        self.start_some_actions()
    }

    /// Handle a single driver event.
    pub fn step(&mut self, event: DriverEvent) -> CoreStep {
        match event {
            DriverEvent::ActionReturned { id, report } => {
                let commands = self.handle_returned(id, report);
                CoreStep {
                    commands,
                    keep_running: !self.is_idle(),
                }
            }
            DriverEvent::ShutdownRequested => CoreStep {
                commands: Vec::new(),
                keep_running: false,
            },
        }
    }

    /// Iterative worklist over `(src, tmp-location)` pairs. Directories are
    /// mirrored into the tmp tree and their children pushed; every
    /// non-directory file is offered to every registered factory. No
    /// deduplication: if two factories match the same file, both actions
    /// run.
    pub fn scan_for_actions(&mut self, src: &FileHandle, tmp: &FileHandle) {
        let factories: Vec<Arc<dyn ActionFactory>> = self.factories.values().cloned().collect();

        let mut queue = vec![(src.clone(), tmp.clone())];
        while let Some((file, tmp_location)) = queue.pop() {
            if file.is_directory() {
                if !tmp_location.is_directory() {
                    if let Err(err) = tmp_location.create_directory() {
                        warn!(
                            path = %tmp_location.display_name(),
                            error = %err,
                            "failed to create tmp directory; skipping subtree"
                        );
                        continue;
                    }
                }

                match file.list() {
                    Ok(children) => {
                        for child in children {
                            let loc = tmp_location.relative(&child.basename());
                            queue.push((child, loc));
                        }
                    }
                    Err(err) => {
                        warn!(
                            path = %file.display_name(),
                            error = %err,
                            "failed to list directory; skipping"
                        );
                    }
                }
            } else {
                for factory in &factories {
                    if let Some(action) = factory.try_make_action(&file) {
                        self.queue_new_action(action, &file, &tmp_location);
                    }
                }
            }
        }
    }

    /// Begin a dashboard task for the action and push it onto the pending
    /// stack. Does not tick the scheduler; callers tick explicitly or rely
    /// on an imminent tick.
    pub fn queue_new_action(
        &mut self,
        action: Box<dyn Action>,
        file: &FileHandle,
        tmp_location: &FileHandle,
    ) {
        let action: Arc<dyn Action> = Arc::from(action);
        let task = self.dashboard.begin_task(action.verb(), &file.display_name());
        let tmpdir = tmp_location.parent().unwrap_or_else(|| tmp_location.clone());

        let id = self.next_action_id;
        self.next_action_id += 1;

        self.records.insert(
            id,
            ActionRecord {
                action,
                task,
                tmpdir,
                state: ActionState::Pending,
                missing: HashMap::new(),
            },
        );
        self.pending.push(id);
    }

    /// Scheduler tick: promote pending actions to active while below the
    /// parallelism cap.
    pub fn start_some_actions(&mut self) -> Vec<DriverCommand> {
        let mut commands = Vec::new();

        while self.active.len() < self.max_concurrent {
            let Some(id) = self.pending.pop() else { break };
            let Some(record) = self.records.get_mut(&id) else {
                error!(action = id, "pending action has no record");
                continue;
            };

            if record.state != ActionState::Pending {
                error!(action = id, state = ?record.state, "starting an action that is not pending");
            }
            record.state = ActionState::Running;
            record.task.set_state(TaskState::Running);
            self.active.push(id);

            commands.push(DriverCommand::StartAction {
                id,
                action: Arc::clone(&record.action),
                task: Arc::clone(&record.task),
                tmpdir: record.tmpdir.clone(),
            });
        }

        commands
    }

    /// Apply a completed action's report: rollback to blocked if it had
    /// missing dependencies, otherwise commit or discard its effects. Ends
    /// with a scheduler tick.
    fn handle_returned(&mut self, id: ActionId, report: ActionReport) -> Vec<DriverCommand> {
        match self.active.iter().position(|&a| a == id) {
            Some(pos) => {
                self.active.remove(pos);
            }
            None => error!(action = id, "returned action not found in active set"),
        }

        if !report.missing.is_empty() {
            self.roll_back(id, report.missing);
        } else {
            self.finish(id, report);
        }

        self.start_some_actions()
    }

    /// Failed due to missing dependencies: discard the report's outputs
    /// and provisions, reset the record to pending, and park it as blocked
    /// under each missing id. The action will be retried from scratch once
    /// any of those ids is provided.
    fn roll_back(&mut self, id: ActionId, missing: HashMap<EntityId, String>) {
        let Some(record) = self.records.get_mut(&id) else {
            error!(action = id, "rolled-back action has no record");
            return;
        };
        record.state = ActionState::Pending;

        let ids: Vec<EntityId> = missing.keys().cloned().collect();
        record.missing = missing;
        record.task.set_state(TaskState::Blocked);

        self.blocked.insert(id);
        for ent in ids {
            self.blocked_by.entry(ent).or_default().push(id);
        }
    }

    /// Terminal handling with no missing dependencies: commit provisions
    /// on success/passed, discard effects on failure, then drop the record.
    fn finish(&mut self, id: ActionId, report: ActionReport) {
        let Some(record) = self.records.get_mut(&id) else {
            error!(action = id, "finished action has no record");
            return;
        };

        let state = match report.state {
            ActionState::Pending | ActionState::Running => {
                error!(action = id, state = ?report.state, "non-terminal state in completion report");
                ActionState::Failed
            }
            terminal => terminal,
        };
        record.state = state;

        match state {
            ActionState::Succeeded | ActionState::Passed => {
                record.task.set_state(if state == ActionState::Passed {
                    TaskState::Passed
                } else {
                    TaskState::Success
                });
                if state == ActionState::Passed {
                    self.summary.passed += 1;
                } else {
                    self.summary.succeeded += 1;
                }

                for provision in report.provisions {
                    for ent in &provision.entities {
                        self.register_provider(ent, &provision.file);
                    }
                }
                for out in report.outputs {
                    self.scan_for_actions(&out, &out);
                }
            }
            _ => {
                record.task.set_state(TaskState::Failed);
                self.summary.failed += 1;
            }
        }

        self.records.remove(&id);
    }

    /// Publish `file` as the provider of `ent`: update the entity table,
    /// wake every blocked action whose missing set becomes empty, and fire
    /// trigger factories.
    fn register_provider(&mut self, ent: &EntityId, file: &FileHandle) {
        {
            let mut map = self.entities.write().unwrap();
            if map.contains_key(ent) {
                match self.duplicate_provisions {
                    DuplicateProvisions::Overwrite => {}
                    DuplicateProvisions::Warn => {
                        warn!(entity = %ent, "entity provided more than once; overwriting");
                    }
                    DuplicateProvisions::KeepExisting => {
                        debug!(entity = %ent, "entity provided more than once; keeping existing");
                        return;
                    }
                }
            }
            map.insert(ent.clone(), file.clone());
        }

        if let Some(waiters) = self.blocked_by.remove(ent) {
            for waiter in waiters {
                let Some(record) = self.records.get_mut(&waiter) else {
                    error!(action = waiter, "blocked action has no record");
                    continue;
                };
                record.missing.remove(ent);
                if record.missing.is_empty() {
                    if self.blocked.remove(&waiter) {
                        self.pending.push(waiter);
                    } else {
                        error!(action = waiter, "action not in blocked set");
                    }
                }
            }
        }

        let mut fired: Vec<Arc<dyn ActionFactory>> = Vec::new();
        if let Some(factories) = self.triggers.get(ent) {
            fired.extend(factories.iter().cloned());
        }
        if let Some(factories) = self.kind_triggers.get(ent.kind()) {
            fired.extend(factories.iter().cloned());
        }
        for factory in fired {
            if let Some(action) = factory.try_make_trigger_action(ent, file) {
                self.queue_new_action(action, file, file);
            }
        }
    }

    /// Report every non-terminated task as failed and return the final
    /// tallies. Blocked actions are permanently unmet dependencies; active
    /// or still-pending ones can only remain on an early shutdown.
    pub fn shutdown(&mut self) -> BuildSummary {
        for id in self.blocked.drain() {
            if let Some(record) = self.records.remove(&id) {
                record.task.set_state(TaskState::Failed);
                self.summary.blocked += 1;
            }
        }
        self.blocked_by.clear();

        for id in self.active.drain(..).chain(self.pending.drain(..)) {
            if let Some(record) = self.records.remove(&id) {
                record.task.set_state(TaskState::Failed);
                self.summary.failed += 1;
            }
        }

        self.summary
    }

    /// Number of currently active actions (for tests and diagnostics).
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn blocked_count(&self) -> usize {
        self.blocked.len()
    }

    pub fn summary(&self) -> BuildSummary {
        self.summary
    }
}

impl std::fmt::Debug for DriverCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverCore")
            .field("max_concurrent", &self.max_concurrent)
            .field("pending", &self.pending)
            .field("active", &self.active)
            .field("blocked", &self.blocked)
            .finish_non_exhaustive()
    }
}
