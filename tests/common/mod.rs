#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use tracing_subscriber::{fmt, EnvFilter};

use flowbuild::action::{Action, ActionFactory};
use flowbuild::dashboard::MemoryDashboard;
use flowbuild::driver::{BuildContext, DriverCore};
use flowbuild::entity::EntityId;
use flowbuild::errors::Result;
use flowbuild::fs::mock::MockFileSystem;
use flowbuild::fs::{FileHandle, FileSystem};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - Enable levels with e.g. `RUST_LOG=debug cargo test`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Build a mock tree with the given files under `src/`, plus an empty
/// `tmp/`, and a core wired to a recording dashboard.
pub fn setup(max_concurrent: usize, files: &[&str]) -> (DriverCore, MemoryDashboard, MockFileSystem) {
    init_tracing();

    let mock = MockFileSystem::new();
    mock.add_dir("src");
    mock.add_dir("tmp");
    for file in files {
        mock.add_file(format!("src/{file}"), *file);
    }

    let fs: Arc<dyn FileSystem> = Arc::new(mock.clone());
    let dashboard = MemoryDashboard::new();
    let core = DriverCore::new(
        Arc::new(dashboard.clone()),
        FileHandle::new(Arc::clone(&fs), "src"),
        FileHandle::new(fs, "tmp"),
        max_concurrent,
    );

    (core, dashboard, mock)
}

/// Factory matching files by basename suffix, producing actions through a
/// closure.
pub struct SuffixFactory {
    suffix: String,
    make: Box<dyn Fn(&FileHandle) -> Box<dyn Action> + Send + Sync>,
}

impl SuffixFactory {
    pub fn new(
        suffix: &str,
        make: impl Fn(&FileHandle) -> Box<dyn Action> + Send + Sync + 'static,
    ) -> Self {
        Self {
            suffix: suffix.to_string(),
            make: Box::new(make),
        }
    }
}

impl ActionFactory for SuffixFactory {
    fn try_make_action(&self, file: &FileHandle) -> Option<Box<dyn Action>> {
        if file.basename().ends_with(&self.suffix) {
            Some((self.make)(file))
        } else {
            None
        }
    }
}

/// Action that allocates outputs, offers them as provisions, and succeeds.
pub struct ProvideAction {
    pub verb: String,
    /// `(output basename, entity ids it provides)`.
    pub provides: Vec<(String, Vec<EntityId>)>,
    /// Delay before providing, to order interleavings in tests.
    pub delay: Duration,
}

impl ProvideAction {
    pub fn new(verb: &str, output: &str, entities: &[&str]) -> Self {
        Self {
            verb: verb.to_string(),
            provides: vec![(
                output.to_string(),
                entities.iter().map(|e| EntityId::parse(e)).collect(),
            )],
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Action for ProvideAction {
    fn verb(&self) -> &str {
        &self.verb
    }

    async fn start(&self, ctx: &BuildContext) -> Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        for (basename, entities) in &self.provides {
            let out = ctx.new_output(basename)?;
            out.write(basename.as_bytes())?;
            ctx.provide(&out, entities.clone())?;
        }
        ctx.success()?;
        Ok(())
    }
}

/// Action that requires entities via `find_provider`; reports failed if any
/// are missing (inducing rollback to blocked), otherwise succeeds.
pub struct RequireAction {
    pub verb: String,
    pub needs: Vec<EntityId>,
    /// Optional sleep between the lookup and the terminal report.
    pub linger: Duration,
}

impl RequireAction {
    pub fn new(verb: &str, needs: &[&str]) -> Self {
        Self {
            verb: verb.to_string(),
            needs: needs.iter().map(|e| EntityId::parse(e)).collect(),
            linger: Duration::ZERO,
        }
    }

    pub fn with_linger(mut self, linger: Duration) -> Self {
        self.linger = linger;
        self
    }
}

#[async_trait]
impl Action for RequireAction {
    fn verb(&self) -> &str {
        &self.verb
    }

    async fn start(&self, ctx: &BuildContext) -> Result<()> {
        let mut missed = false;
        for id in &self.needs {
            if ctx.find_provider(id, id.as_str())?.is_none() {
                missed = true;
            }
        }
        if !self.linger.is_zero() {
            tokio::time::sleep(self.linger).await;
        }
        if missed {
            ctx.failed()?;
        } else {
            ctx.success()?;
        }
        Ok(())
    }
}

/// Action that logs and fails, optionally after offering a provision that
/// must never become visible.
pub struct FailAction {
    pub verb: String,
    pub provide_first: Option<(String, EntityId)>,
}

impl FailAction {
    pub fn new(verb: &str) -> Self {
        Self {
            verb: verb.to_string(),
            provide_first: None,
        }
    }

    pub fn providing_first(mut self, output: &str, entity: &str) -> Self {
        self.provide_first = Some((output.to_string(), EntityId::parse(entity)));
        self
    }
}

#[async_trait]
impl Action for FailAction {
    fn verb(&self) -> &str {
        &self.verb
    }

    async fn start(&self, ctx: &BuildContext) -> Result<()> {
        if let Some((output, entity)) = &self.provide_first {
            let out = ctx.new_output(output)?;
            ctx.provide(&out, vec![entity.clone()])?;
        }
        ctx.log("boom")?;
        ctx.failed()?;
        Ok(())
    }
}

/// Tracks how many actions run concurrently and the maximum ever observed.
#[derive(Debug, Default)]
pub struct ConcurrencyProbe {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl ConcurrencyProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

/// Action that holds a concurrency probe slot for a while, then succeeds.
pub struct SlowAction {
    pub verb: String,
    pub probe: Arc<ConcurrencyProbe>,
    pub hold: Duration,
}

#[async_trait]
impl Action for SlowAction {
    fn verb(&self) -> &str {
        &self.verb
    }

    async fn start(&self, ctx: &BuildContext) -> Result<()> {
        self.probe.enter();
        tokio::time::sleep(self.hold).await;
        self.probe.exit();
        ctx.success()?;
        Ok(())
    }
}
