// src/driver/runtime.rs

//! Async IO shell around [`DriverCore`].
//!
//! The shell owns the event channel, spawns one future per started action,
//! and feeds completion events back into the core. Each action runs in its
//! own task; a wrapper task awaits it, converts errors and panics into the
//! failure path, extracts the context's report, and ships it to the loop.
//! Driver state is only ever mutated here, between action futures, so the
//! core needs no locking of its own.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info};

use super::{ActionId, BuildContext, BuildSummary, DriverCommand, DriverCore, DriverEvent};

pub struct DriverRuntime {
    core: DriverCore,
    event_rx: mpsc::UnboundedReceiver<DriverEvent>,
    event_tx: mpsc::UnboundedSender<DriverEvent>,
    /// Abort handles for in-flight actions, cancelled on shutdown.
    running: HashMap<ActionId, RunningAction>,
}

struct RunningAction {
    wrapper: JoinHandle<()>,
    action: AbortHandle,
}

impl fmt::Debug for DriverRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRuntime")
            .field("core", &self.core)
            .field("running", &self.running.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl DriverRuntime {
    pub fn new(core: DriverCore) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            core,
            event_rx,
            event_tx,
            running: HashMap::new(),
        }
    }

    /// Sender for external events, e.g. a Ctrl-C handler sending
    /// [`DriverEvent::ShutdownRequested`].
    pub fn event_sender(&self) -> mpsc::UnboundedSender<DriverEvent> {
        self.event_tx.clone()
    }

    /// Main event loop.
    ///
    /// Scans the source tree, runs actions until nothing is active or
    /// pending (or shutdown is requested), then reports all non-terminated
    /// tasks as failed and returns the tallies.
    pub async fn run(mut self) -> BuildSummary {
        info!("build driver started");

        let commands = self.core.start();
        self.execute(commands);

        loop {
            if self.core.is_idle() {
                break;
            }

            let Some(event) = self.event_rx.recv().await else {
                info!("driver event channel closed; exiting");
                break;
            };
            debug!(?event, "driver received event");

            if let DriverEvent::ActionReturned { id, .. } = &event {
                self.running.remove(id);
            }

            let step = self.core.step(event);
            self.execute(step.commands);

            if !step.keep_running {
                break;
            }
        }

        for (_, running) in self.running.drain() {
            running.action.abort();
            running.wrapper.abort();
        }

        let summary = self.core.shutdown();
        info!(?summary, "build driver exiting");
        summary
    }

    fn execute(&mut self, commands: Vec<DriverCommand>) {
        for command in commands {
            match command {
                DriverCommand::StartAction {
                    id,
                    action,
                    task,
                    tmpdir,
                } => {
                    let ctx = Arc::new(BuildContext::new(self.core.entity_map(), task, tmpdir));
                    let tx = self.event_tx.clone();

                    let inner = tokio::spawn({
                        let action = Arc::clone(&action);
                        let ctx = Arc::clone(&ctx);
                        async move { action.start(&ctx).await }
                    });
                    let abort = inner.abort_handle();

                    let wrapper = tokio::spawn(async move {
                        match inner.await {
                            Ok(Ok(())) => {
                                if ctx.is_running() {
                                    ctx.fail_with("action returned without reporting a result");
                                }
                            }
                            Ok(Err(err)) => ctx.fail_with(&format!("action error: {err}")),
                            Err(join_err) if join_err.is_panic() => {
                                ctx.fail_with("action panicked");
                            }
                            Err(_) => return, // cancelled during shutdown
                        }

                        let report = ctx.take_report();
                        let _ = tx.send(DriverEvent::ActionReturned { id, report });
                    });

                    self.running.insert(
                        id,
                        RunningAction {
                            wrapper,
                            action: abort,
                        },
                    );
                }
            }
        }
    }
}
