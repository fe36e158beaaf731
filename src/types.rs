// src/types.rs

//! Small shared policy types used by both config and the driver.

use serde::Deserialize;

/// What to do when a second successful action provides an entity id that is
/// already in the entity table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateProvisions {
    /// Last writer wins, silently.
    #[default]
    Overwrite,
    /// Last writer wins, with a warning.
    Warn,
    /// First writer wins; the later provision of that id is ignored.
    KeepExisting,
}
