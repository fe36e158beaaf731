// src/logging.rs

//! Logging setup for `flowbuild`.
//!
//! The subscriber is driven by `tracing_subscriber::EnvFilter` directives,
//! so `--log-level` accepts anything from a bare level (`debug`) to
//! per-module directives (`flowbuild::driver=trace,info`). Resolution
//! order: the CLI flag, then the `FLOWBUILD_LOG` environment variable,
//! then `info`.

use anyhow::Context;
use tracing_subscriber::{fmt, EnvFilter};

use crate::errors::Result;

/// Environment variable consulted when no CLI filter is given.
pub const LOG_ENV_VAR: &str = "FLOWBUILD_LOG";

const DEFAULT_FILTER: &str = "info";

/// Initialise the global logging subscriber.
///
/// Safe to call once at startup. A malformed CLI filter is an error; a
/// malformed or unset `FLOWBUILD_LOG` silently falls back to the default.
pub fn init_logging(cli_filter: Option<&str>) -> Result<()> {
    let filter = match cli_filter {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("invalid log filter '{directives}'"))?,
        None => EnvFilter::try_from_env(LOG_ENV_VAR)
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}
