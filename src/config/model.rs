// src/config/model.rs

use serde::Deserialize;

use crate::types::DuplicateProvisions;

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [build]
/// src = "src"
/// tmp = "tmp"
/// max_concurrent = 4
/// duplicate_provisions = "overwrite"
///
/// [[rule]]
/// name = "protoc"
/// script = "rules/protoc.sh"
/// match = ".proto"
/// verb = "compile"
/// triggers = ["filetype:.capnp"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub build: BuildSection,

    /// All `[[rule]]` sections, in file order.
    #[serde(default)]
    pub rule: Vec<RuleConfig>,
}

/// `[build]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildSection {
    /// Source tree to scan for actions.
    #[serde(default = "default_src")]
    pub src: String,

    /// Tree mirroring `src` where action outputs land.
    #[serde(default = "default_tmp")]
    pub tmp: String,

    /// Parallelism cap for running actions. Must be >= 1.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Policy when two successful actions provide the same entity id.
    #[serde(default)]
    pub duplicate_provisions: DuplicateProvisions,
}

fn default_src() -> String {
    "src".to_string()
}

fn default_tmp() -> String {
    "tmp".to_string()
}

fn default_max_concurrent() -> usize {
    4
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            src: default_src(),
            tmp: default_tmp(),
            max_concurrent: default_max_concurrent(),
            duplicate_provisions: DuplicateProvisions::default(),
        }
    }
}

/// One `[[rule]]` section: an external rule script and what it claims.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    /// Registry key; unique across rules.
    pub name: String,

    /// Executable rule script, resolved relative to the working directory.
    pub script: String,

    /// Filename suffix this rule claims, e.g. `.proto`.
    #[serde(rename = "match")]
    pub match_suffix: String,

    /// Dashboard verb for actions made by this rule.
    #[serde(default = "default_verb")]
    pub verb: String,

    /// Entity ids whose provision should invoke this rule; `kind:*`
    /// matches every entity of that kind.
    #[serde(default)]
    pub triggers: Vec<String>,
}

fn default_verb() -> String {
    "build".to_string()
}

/// Validated configuration. Construct via `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub build: BuildSection,
    pub rule: Vec<RuleConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(build: BuildSection, rule: Vec<RuleConfig>) -> Self {
        Self { build, rule }
    }
}
