//! Imports added to a woven file
//!
//! Generated code refers to packages through private names (`__weft_<alias>`)
//! so it never collides with, or depends on, the file's own imports. All
//! added imports go into a single generated region right after the package
//! clause, which keeps every original line where it was.

use std::collections::BTreeMap;

use weft_parser::imports::default_package_name;
use weft_parser::ImportSpec;

const LOCAL_PREFIX: &str = "__weft_";

/// Import path -> local name for everything weaving adds to one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportPlan {
    /// Path -> local name (`_` for blank imports).
    by_path: BTreeMap<String, String>,
    /// Paths already imported by an earlier weave.
    existing: BTreeMap<String, String>,
}

impl ImportPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with the imports of a previously generated import region so
    /// names stay stable across re-weaves.
    pub fn with_existing<'a>(specs: impl IntoIterator<Item = &'a ImportSpec>) -> Self {
        let mut plan = Self::new();
        for spec in specs {
            let name = spec.name.clone().unwrap_or_else(|| default_package_name(&spec.path));
            plan.existing.insert(spec.path.clone(), name);
        }
        plan
    }

    /// Name `path` would be imported as, without recording it.
    pub fn preview(&self, alias: &str, path: &str) -> String {
        if let Some(name) = self.name_for(path) {
            if name != "_" {
                return name.to_string();
            }
        }
        let base = format!("{}{}", LOCAL_PREFIX, sanitize(alias));
        let mut candidate = base.clone();
        let mut n = 1;
        while self.name_taken(&candidate) {
            n += 1;
            candidate = format!("{}_{}", base, n);
        }
        candidate
    }

    /// Record `path` under the name `preview` returns for it.
    pub fn add(&mut self, alias: &str, path: &str) -> String {
        if alias == "_" {
            if self.name_for(path).is_none() {
                self.by_path.insert(path.to_string(), "_".to_string());
            }
            return "_".to_string();
        }
        let name = self.preview(alias, path);
        if self.existing.get(path) != Some(&name) {
            self.by_path.insert(path.to_string(), name.clone());
        }
        name
    }

    /// Imports not covered by the existing region.
    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Every import of the region: existing ones first, then new ones, each
    /// group sorted by path.
    pub fn entries(&self) -> Vec<(&str, &str)> {
        let existing = self.existing.iter();
        let added = self
            .by_path
            .iter()
            .filter(|(path, _)| !self.existing.contains_key(*path));
        existing
            .chain(added)
            .map(|(path, name)| (name.as_str(), path.as_str()))
            .collect()
    }

    /// `import (a "x"; b "y")`, on one line.
    pub fn render(&self) -> String {
        let specs: Vec<String> = self
            .entries()
            .into_iter()
            .map(|(name, path)| format!("{} {:?}", name, path))
            .collect();
        format!("import ({})", specs.join("; "))
    }

    fn name_for(&self, path: &str) -> Option<&str> {
        self.by_path
            .get(path)
            .or_else(|| self.existing.get(path))
            .map(String::as_str)
    }

    fn name_taken(&self, name: &str) -> bool {
        self.by_path.values().chain(self.existing.values()).any(|n| n == name)
    }
}

fn sanitize(alias: &str) -> String {
    alias
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}
