// src/action/mod.rs

//! Action and factory plugin surface.
//!
//! An [`Action`] is one unit of work registered against a source file
//! (typically: run a rule script or subprocess). An [`ActionFactory`]
//! decides whether a given file, or a newly provided entity, warrants an
//! action. Factories are registered once at startup and live for the
//! process.

use async_trait::async_trait;

use crate::driver::BuildContext;
use crate::entity::EntityId;
use crate::errors::Result;
use crate::fs::FileHandle;

pub mod script;

pub use script::{ScriptAction, ScriptFactory};

/// A unit of build work.
///
/// `start` runs on the driver's runtime and must eventually report exactly
/// one of `success`/`passed`/`failed` on the context. Returning `Err` is
/// the uncaught-error path: the driver logs it to the task and treats the
/// action as failed if it was still running. Returning `Ok` without a
/// terminal report is also a failure, since nothing can complete the
/// action afterwards.
#[async_trait]
pub trait Action: Send + Sync {
    /// Verb shown on the dashboard, e.g. `compile` or `test`.
    fn verb(&self) -> &str;

    async fn start(&self, ctx: &BuildContext) -> Result<()>;
}

/// Decides whether files or newly provided entities warrant actions.
pub trait ActionFactory: Send + Sync {
    /// Offer a scanned (or freshly output) file to this factory.
    fn try_make_action(&self, file: &FileHandle) -> Option<Box<dyn Action>>;

    /// Offer a newly provided entity this factory registered interest in.
    fn try_make_trigger_action(
        &self,
        id: &EntityId,
        file: &FileHandle,
    ) -> Option<Box<dyn Action>> {
        let _ = (id, file);
        None
    }

    /// Entities whose provision should invoke `try_make_trigger_action`.
    /// An id of the form `kind:*` matches every entity of that kind.
    fn trigger_entities(&self) -> Vec<EntityId> {
        Vec::new()
    }
}
