// src/entity.rs

//! Entity identifiers.
//!
//! An [`EntityId`] names a capability that actions consume and produce:
//! `filetype:.proto`, `file:foo/bar.proto`, `protobuf:foo.proto`. The text
//! before the first `:` is the *kind*, the rest is the *name*. Ids are
//! immutable, cheap to clone, and compare/hash by their full text.

use std::fmt;
use std::sync::Arc;

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(Arc<str>);

impl EntityId {
    /// Build an id from a kind and a name, e.g. `("protobuf", "a.proto")`.
    pub fn new(kind: &str, name: &str) -> Self {
        EntityId(Arc::from(format!("{kind}:{name}").as_str()))
    }

    /// Parse an id from its `kind:name` text form.
    pub fn parse(s: &str) -> Self {
        EntityId(Arc::from(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The text before the first `:`, or the whole id if there is none.
    pub fn kind(&self) -> &str {
        match self.0.find(':') {
            Some(pos) => &self.0[..pos],
            None => &self.0,
        }
    }

    /// The text after the first `:`, or `""` if there is none.
    pub fn name(&self) -> &str {
        match self.0.find(':') {
            Some(pos) => &self.0[pos + 1..],
            None => "",
        }
    }

    /// Whether this id is a kind-wide trigger pattern, e.g. `protobuf:*`.
    pub fn is_kind_wildcard(&self) -> bool {
        self.name() == "*"
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId::parse(s)
    }
}
