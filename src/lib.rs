// src/lib.rs

pub mod action;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod driver;
pub mod entity;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod types;

use std::sync::Arc;

use tracing::{info, warn};

use crate::action::ScriptFactory;
use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dashboard::ConsoleDashboard;
use crate::driver::{BuildSummary, DriverCore, DriverEvent, DriverRuntime};
use crate::entity::EntityId;
use crate::errors::{FlowbuildError, Result};
use crate::fs::{DiskFileSystem, FileHandle, FileSystem};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - driver core / runtime
/// - one script factory per configured rule
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<BuildSummary> {
    let cfg = load_and_validate(&args.config)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(BuildSummary::default());
    }

    let src = args.src.unwrap_or_else(|| cfg.build.src.clone());
    let tmp = args.tmp.unwrap_or_else(|| cfg.build.tmp.clone());
    let jobs = args.jobs.unwrap_or(cfg.build.max_concurrent);

    let fs: Arc<dyn FileSystem> = Arc::new(DiskFileSystem);
    let src_handle = FileHandle::new(Arc::clone(&fs), &src);
    let tmp_handle = FileHandle::new(Arc::clone(&fs), &tmp);
    if !src_handle.is_directory() {
        return Err(FlowbuildError::Config(format!(
            "source tree '{src}' is not a directory"
        )));
    }

    let dashboard = Arc::new(ConsoleDashboard::new());
    let mut core = DriverCore::new(dashboard, src_handle, tmp_handle, jobs)
        .with_duplicate_provisions(cfg.build.duplicate_provisions);

    for rule in &cfg.rule {
        let triggers: Vec<EntityId> = rule.triggers.iter().map(|t| EntityId::parse(t)).collect();
        let factory = ScriptFactory::new(&rule.script, rule.match_suffix.as_str(), rule.verb.as_str())
            .with_triggers(triggers);
        core.add_action_factory(&rule.name, Arc::new(factory));
    }

    let runtime = DriverRuntime::new(core);

    // Ctrl-C -> graceful shutdown.
    {
        let tx = runtime.event_sender();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(DriverEvent::ShutdownRequested);
        });
    }

    let summary = runtime.run().await;

    info!(
        succeeded = summary.succeeded,
        passed = summary.passed,
        failed = summary.failed,
        blocked = summary.blocked,
        "build finished"
    );
    if summary.blocked > 0 {
        warn!(
            count = summary.blocked,
            "some actions were permanently blocked on entities nobody provided"
        );
    }

    Ok(summary)
}

/// Simple dry-run output: print rules and the build section.
fn print_dry_run(cfg: &ConfigFile) {
    println!("flowbuild dry-run");
    println!("  build.src = {}", cfg.build.src);
    println!("  build.tmp = {}", cfg.build.tmp);
    println!("  build.max_concurrent = {}", cfg.build.max_concurrent);
    println!(
        "  build.duplicate_provisions = {:?}",
        cfg.build.duplicate_provisions
    );
    println!();

    println!("rules ({}):", cfg.rule.len());
    for rule in &cfg.rule {
        println!("  - {}", rule.name);
        println!("      script: {}", rule.script);
        println!("      match: {}", rule.match_suffix);
        println!("      verb: {}", rule.verb);
        if !rule.triggers.is_empty() {
            println!("      triggers: {:?}", rule.triggers);
        }
    }
}
