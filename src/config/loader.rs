// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Read and deserialize a config file without semantic validation.
/// Use [`load_and_validate`] for the full pipeline.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading config file at {:?}", path))?;

    let raw: RawConfigFile = toml::from_str(&contents)?;
    Ok(raw)
}

/// Load a configuration file and validate it. The recommended entry point.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw = load_from_path(&path)?;
    raw.try_into()
}

/// Default config path in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Flowbuild.toml")
}
