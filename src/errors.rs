// src/errors.rs

//! Crate-wide error type and Result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowbuildError {
    #[error("configuration error: {0}")]
    Config(String),

    /// A `BuildContext` operation was invoked while the action was not in
    /// the RUNNING state.
    #[error("action is not running")]
    NotRunning,

    /// `success`/`passed` was reported while missing dependencies were
    /// still outstanding.
    #[error("action reported success despite missing dependencies")]
    MissingDependencies,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, FlowbuildError>;
