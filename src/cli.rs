// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::Parser;

/// Command-line arguments for `flowbuild`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "flowbuild",
    version,
    about = "Dependency-discovering build driver: scan a source tree, run rule actions, react to what they provide.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Flowbuild.toml")]
    pub config: String,

    /// Source tree to scan (overrides [build].src).
    #[arg(long, value_name = "DIR")]
    pub src: Option<String>,

    /// Output tree mirroring the source tree (overrides [build].tmp).
    #[arg(long, value_name = "DIR")]
    pub tmp: Option<String>,

    /// Maximum number of concurrently running actions
    /// (overrides [build].max_concurrent).
    #[arg(long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Log filter: a level (`error`..`trace`) or tracing directives such
    /// as `flowbuild::driver=debug`.
    ///
    /// If omitted, `FLOWBUILD_LOG` or `info` is used.
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,

    /// Parse + validate, print the rules, but don't run any actions.
    #[arg(long)]
    pub dry_run: bool,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
