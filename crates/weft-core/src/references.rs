//! Reference tracking for import paths introduced by weaving
//!
//! Every advice that emits code pointing into another package records the
//! package here, together with how the package is reached:
//! - `ImportStatement`: the woven file imports it; the compiler needs the
//!   package's archive and the linker needs it too.
//! - `RelocationTarget`: only reached through a linker relocation (for example
//!   a `//go:linkname` pull); the compiler never sees it, the linker does.
//!
//! Maps from different files merge commutatively, so weaving order inside a
//! package does not change the result.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// How a referenced package is reached. `ImportStatement` is the more
/// specific kind and wins when both are recorded for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceKind {
    RelocationTarget,
    ImportStatement,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceMap {
    entries: BTreeMap<String, ReferenceKind>,
}

impl ReferenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reference, keeping the most specific kind seen for the path.
    pub fn add(&mut self, path: impl Into<String>, kind: ReferenceKind) {
        let entry = self.entries.entry(path.into()).or_insert(kind);
        if kind > *entry {
            *entry = kind;
        }
    }

    pub fn merge(&mut self, other: &ReferenceMap) {
        for (path, kind) in &other.entries {
            self.add(path.clone(), *kind);
        }
    }

    pub fn get(&self, path: &str) -> Option<ReferenceKind> {
        self.entries.get(path).copied()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn remove(&mut self, path: &str) -> Option<ReferenceKind> {
        self.entries.remove(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ReferenceKind)> {
        self.entries.iter().map(|(path, kind)| (path.as_str(), *kind))
    }

    pub fn paths_of_kind(&self, kind: ReferenceKind) -> impl Iterator<Item = &str> {
        self.iter()
            .filter(move |(_, k)| *k == kind)
            .map(|(path, _)| path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, ReferenceKind)> for ReferenceMap {
    fn from_iter<T: IntoIterator<Item = (String, ReferenceKind)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (path, kind) in iter {
            map.add(path, kind);
        }
        map
    }
}
