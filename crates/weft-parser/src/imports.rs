//! Import declarations of a Go file

use std::ops::Range;

use tree_sitter::Node;

use crate::source::{children, named_children, SourceFile};

/// One `import` spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    /// Explicit name (`_`, `.`, or an alias) when present.
    pub name: Option<String>,
    pub path: String,
    pub range: Range<usize>,
}

impl ImportSpec {
    /// Name the file uses to refer to the package, if it can be referenced.
    pub fn local_name(&self) -> Option<String> {
        match self.name.as_deref() {
            Some("_") | Some(".") => None,
            Some(name) => Some(name.to_string()),
            None => Some(default_package_name(&self.path)),
        }
    }
}

/// Imports of one file, in source order.
#[derive(Debug, Clone, Default)]
pub struct ImportTable {
    specs: Vec<ImportSpec>,
}

impl ImportTable {
    pub fn new(file: &SourceFile) -> Self {
        let mut specs = Vec::new();
        for decl in children(file.root())
            .into_iter()
            .filter(|n| n.kind() == "import_declaration")
        {
            collect_specs(file, decl, &mut specs);
        }
        Self { specs }
    }

    pub fn specs(&self) -> &[ImportSpec] {
        &self.specs
    }

    pub fn imports(&self, path: &str) -> bool {
        self.specs.iter().any(|s| s.path == path)
    }

    /// Import path bound to a local package name.
    pub fn path_for(&self, local: &str) -> Option<&str> {
        self.specs
            .iter()
            .find(|s| s.local_name().as_deref() == Some(local))
            .map(|s| s.path.as_str())
    }
}

fn collect_specs(file: &SourceFile, node: Node<'_>, out: &mut Vec<ImportSpec>) {
    for child in named_children(node) {
        match child.kind() {
            "import_spec" => {
                let path = child
                    .child_by_field_name("path")
                    .map(|p| unquote(file.node_text(p)))
                    .unwrap_or_default();
                if path.is_empty() {
                    continue;
                }
                let name = child
                    .child_by_field_name("name")
                    .map(|n| file.node_text(n).to_string());
                out.push(ImportSpec {
                    name,
                    path,
                    range: child.byte_range(),
                });
            }
            "import_spec_list" => collect_specs(file, child, out),
            _ => {}
        }
    }
}

fn unquote(literal: &str) -> String {
    literal.trim_matches(|c| c == '"' || c == '`').to_string()
}

/// Conventional package name for an import path: the last element, skipping
/// a major-version suffix (`/v2`) and dropping `.vN`/`go-` decorations.
pub fn default_package_name(path: &str) -> String {
    let mut elems: Vec<&str> = path.split('/').collect();
    if elems.len() > 1 {
        if let Some(last) = elems.last() {
            if is_major_version(last) {
                elems.pop();
            }
        }
    }
    let mut name = elems.last().copied().unwrap_or(path);
    if let Some((base, suffix)) = name.rsplit_once('.') {
        if is_major_version(suffix) {
            name = base;
        }
    }
    let name = name.strip_prefix("go-").unwrap_or(name);
    name.replace(['-', '.'], "_")
}

fn is_major_version(s: &str) -> bool {
    s.strip_prefix('v')
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}
