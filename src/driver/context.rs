// src/driver/context.rs

//! The runtime interface an action uses to query and publish entities,
//! allocate outputs, and signal completion.
//!
//! Effects accumulate locally in the context and are only applied to
//! driver state after the action's future finishes, via the
//! [`ActionReport`] the runtime ships back to the driver loop. Terminal
//! calls therefore never mutate driver-wide state synchronously, and an
//! action is guaranteed to have finished returning before its rollback or
//! commit runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::error;

use crate::dashboard::DashboardTask;
use crate::entity::EntityId;
use crate::errors::{FlowbuildError, Result};
use crate::fs::FileHandle;

use super::{ActionReport, ActionState, Provision, SharedEntityMap};

pub struct BuildContext {
    entities: SharedEntityMap,
    task: Arc<dyn DashboardTask>,
    /// Directory in the tmp tree where this action's outputs land.
    tmpdir: FileHandle,
    inner: Mutex<ContextInner>,
}

struct ContextInner {
    state: ActionState,
    missing: HashMap<EntityId, String>,
    provisions: Vec<Provision>,
    outputs: Vec<FileHandle>,
}

impl BuildContext {
    pub(crate) fn new(
        entities: SharedEntityMap,
        task: Arc<dyn DashboardTask>,
        tmpdir: FileHandle,
    ) -> Self {
        Self {
            entities,
            task,
            tmpdir,
            inner: Mutex::new(ContextInner {
                state: ActionState::Running,
                missing: HashMap::new(),
                provisions: Vec::new(),
                outputs: Vec::new(),
            }),
        }
    }

    /// Look up the provider of `id`.
    ///
    /// On a miss, records `(id, title)` as a missing dependency and returns
    /// `None`. The action may keep running and accumulate further misses,
    /// but it may not later report `success`/`passed` while any are
    /// outstanding; whatever terminal state it does report, it will be
    /// rolled back and retried once one of the missing ids is provided.
    pub fn find_provider(&self, id: &EntityId, title: &str) -> Result<Option<FileHandle>> {
        let found = self.find_optional_provider(id)?;
        if found.is_none() {
            let mut inner = self.inner.lock().unwrap();
            inner.missing.insert(id.clone(), title.to_string());
        }
        Ok(found)
    }

    /// Like [`find_provider`](Self::find_provider), but a miss is not
    /// recorded as a missing dependency.
    pub fn find_optional_provider(&self, id: &EntityId) -> Result<Option<FileHandle>> {
        self.ensure_running()?;
        Ok(self.entities.read().unwrap().get(id).cloned())
    }

    /// Offer `file` as the provider of each id in `entities`. Not visible
    /// in the entity table until this action terminates successfully.
    pub fn provide(&self, file: &FileHandle, entities: Vec<EntityId>) -> Result<()> {
        self.ensure_running()?;
        let mut inner = self.inner.lock().unwrap();
        inner.provisions.push(Provision {
            file: file.clone(),
            entities,
        });
        Ok(())
    }

    /// Allocate an output file handle at `tmpdir/basename`. The handle is
    /// retained so the resulting tree can be scanned for new actions on
    /// success; a clone is returned for the action to write through.
    pub fn new_output(&self, basename: &str) -> Result<FileHandle> {
        self.ensure_running()?;
        let file = self.tmpdir.relative(basename);
        let mut inner = self.inner.lock().unwrap();
        inner.outputs.push(file.clone());
        Ok(file)
    }

    /// Forward a line of live output to the dashboard task.
    pub fn log(&self, text: &str) -> Result<()> {
        self.ensure_running()?;
        self.task.add_output(text);
        Ok(())
    }

    /// Report success. Errors if any missing dependencies are outstanding;
    /// the state is left RUNNING in that case so a propagated error takes
    /// the ordinary failure path.
    pub fn success(&self) -> Result<()> {
        self.terminate(ActionState::Succeeded)
    }

    /// Report that a test action ran and passed.
    pub fn passed(&self) -> Result<()> {
        self.terminate(ActionState::Passed)
    }

    /// Report failure. Always legal while running.
    pub fn failed(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != ActionState::Running {
            return Err(FlowbuildError::NotRunning);
        }
        inner.state = ActionState::Failed;
        Ok(())
    }

    fn terminate(&self, state: ActionState) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != ActionState::Running {
            return Err(FlowbuildError::NotRunning);
        }
        if !inner.missing.is_empty() {
            return Err(FlowbuildError::MissingDependencies);
        }
        inner.state = state;
        Ok(())
    }

    fn ensure_running(&self) -> Result<()> {
        if self.inner.lock().unwrap().state != ActionState::Running {
            return Err(FlowbuildError::NotRunning);
        }
        Ok(())
    }

    pub(crate) fn is_running(&self) -> bool {
        self.inner.lock().unwrap().state == ActionState::Running
    }

    /// Record an action-level error: log it to the task, and mark the
    /// action failed iff it was still running.
    pub(crate) fn fail_with(&self, note: &str) {
        self.task.add_output(note);
        let mut inner = self.inner.lock().unwrap();
        if inner.state == ActionState::Running {
            inner.state = ActionState::Failed;
        }
    }

    /// Extract the completion report. Called exactly once by the runtime
    /// after the action's future has finished.
    pub(crate) fn take_report(&self) -> ActionReport {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == ActionState::Running {
            error!("taking report from an action still marked running");
            inner.state = ActionState::Failed;
        }
        ActionReport {
            state: inner.state,
            missing: std::mem::take(&mut inner.missing),
            provisions: std::mem::take(&mut inner.provisions),
            outputs: std::mem::take(&mut inner.outputs),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::RwLock;

    use super::*;
    use crate::dashboard::{Dashboard, MemoryDashboard};
    use crate::fs::mock::MockFileSystem;
    use crate::fs::FileSystem;

    fn test_context() -> (BuildContext, SharedEntityMap) {
        let fs: Arc<dyn FileSystem> = Arc::new(MockFileSystem::new());
        let entities: SharedEntityMap = Arc::new(RwLock::new(HashMap::new()));
        let dashboard = MemoryDashboard::new();
        let task = dashboard.begin_task("test", "ctx");
        let tmpdir = FileHandle::new(fs, "tmp");
        (
            BuildContext::new(Arc::clone(&entities), task, tmpdir),
            entities,
        )
    }

    #[test]
    fn find_provider_records_missing_dependency() {
        let (ctx, entities) = test_context();
        let id = EntityId::parse("protobuf:a.proto");

        assert!(ctx.find_provider(&id, "compiled a.proto").unwrap().is_none());
        assert!(matches!(
            ctx.success(),
            Err(FlowbuildError::MissingDependencies)
        ));
        // Still running: the failure path is taken by whoever observes the
        // error, not by the terminate call itself.
        assert!(ctx.is_running());

        entities.write().unwrap().insert(
            id.clone(),
            FileHandle::new(Arc::new(MockFileSystem::new()), "tmp/a.proto"),
        );
        assert!(ctx.find_provider(&id, "compiled a.proto").unwrap().is_some());
    }

    #[test]
    fn optional_miss_is_not_recorded() {
        let (ctx, _entities) = test_context();
        let id = EntityId::parse("protobuf:a.proto");

        assert!(ctx.find_optional_provider(&id).unwrap().is_none());
        ctx.success().unwrap();
        assert_eq!(ctx.take_report().state, ActionState::Succeeded);
    }

    #[test]
    fn operations_fail_outside_running() {
        let (ctx, _entities) = test_context();
        ctx.success().unwrap();

        assert!(matches!(
            ctx.log("late"),
            Err(FlowbuildError::NotRunning)
        ));
        assert!(matches!(ctx.failed(), Err(FlowbuildError::NotRunning)));
        assert!(matches!(
            ctx.new_output("x"),
            Err(FlowbuildError::NotRunning)
        ));
    }

    #[test]
    fn report_carries_accumulated_effects() {
        let (ctx, _entities) = test_context();
        let out = ctx.new_output("a.pb.h").unwrap();
        assert_eq!(out.display_name(), "tmp/a.pb.h");
        ctx.provide(&out, vec![EntityId::parse("protobuf:a.proto")])
            .unwrap();
        ctx.success().unwrap();

        let report = ctx.take_report();
        assert_eq!(report.state, ActionState::Succeeded);
        assert_eq!(report.outputs.len(), 1);
        assert_eq!(report.provisions.len(), 1);
        assert_eq!(report.provisions[0].file, out);
    }
}
