//! Weaving and unweaving whole files
//!
//! One weave is parse, decorate, infer types, walk, render. The walk visits
//! children before their parent so that an outer replacement renders the
//! edits already made inside it. Subtrees inside a generated region, or
//! under a `//weft:ignore` directive, are never visited.

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use tree_sitter::Node;
use weft_core::{ActivationFlags, ReferenceKind, ReferenceMap};
use weft_parser::markers::{scan_regions, IGNORE_DIRECTIVE};
use weft_parser::{
    Decorations, GoParser, ImportTable, MarkerAttrs, MarkerError, ParseError, Region, TypeResolver,
};

use crate::advice::{Weaver, IMPORTS_ASPECT, IMPORTS_KIND};
use crate::catalog::{Advice, Aspect, Catalog};
use crate::edits::EditSet;
use crate::error::{summarize, Diagnostic, WeaveError};
use crate::imports::ImportPlan;
use crate::matcher::MatchContext;

/// Result of weaving one file.
#[derive(Debug, Clone)]
pub struct WeaveOutcome {
    pub path: PathBuf,
    /// `false` when no advice applied; `source` is then the input unchanged.
    pub modified: bool,
    pub source: String,
    /// Import paths the woven file needs, including those added by an
    /// earlier weave of the same file.
    pub references: ReferenceMap,
    pub diagnostics: Vec<Diagnostic>,
}

impl WeaveOutcome {
    fn unchanged(path: &Path, source: &str, references: ReferenceMap) -> Self {
        Self {
            path: path.to_path_buf(),
            modified: false,
            source: source.to_string(),
            references,
            diagnostics: Vec::new(),
        }
    }
}

/// Applies a catalog to Go source files.
pub struct Injector<'c> {
    catalog: &'c Catalog,
    flags: ActivationFlags,
    /// Import paths whose resolution is in progress in a parent process.
    resolving: Vec<String>,
}

impl<'c> Injector<'c> {
    pub fn new(catalog: &'c Catalog, flags: ActivationFlags) -> Self {
        Self {
            catalog,
            flags,
            resolving: Vec::new(),
        }
    }

    /// Refuse advice that would reference any of `paths`.
    pub fn with_resolving(mut self, paths: impl IntoIterator<Item = String>) -> Self {
        self.resolving = paths.into_iter().collect();
        self
    }

    pub fn catalog(&self) -> &Catalog {
        self.catalog
    }

    /// Aspects that may apply to files of `package_path`.
    pub fn applicable_aspects(&self, package_path: Option<&str>) -> Vec<&'c Aspect> {
        let runtime = package_path
            .map(|p| self.catalog.is_runtime_package(p))
            .unwrap_or(false);

        self.catalog
            .aspects()
            .iter()
            .filter(|aspect| {
                if !aspect.enabled(&self.flags) || aspect.internal_only != runtime {
                    return false;
                }
                let refers_to = |path: &str| {
                    aspect.referenced_paths.iter().any(|p| p == path)
                };
                if let Some(path) = self.resolving.iter().find(|p| refers_to(p)) {
                    debug!(aspect = %aspect.id, %path, "skipping aspect referencing a package being resolved");
                    return false;
                }
                !package_path.map(refers_to).unwrap_or(false)
            })
            .collect()
    }

    /// Weave one file with a fresh parser.
    pub fn weave(
        &self,
        path: impl AsRef<Path>,
        text: &str,
        package_path: Option<&str>,
    ) -> Result<WeaveOutcome, WeaveError> {
        let mut parser = GoParser::new()?;
        self.weave_with(&mut parser, path.as_ref(), text, package_path)
    }

    pub fn weave_with(
        &self,
        parser: &mut GoParser,
        path: &Path,
        text: &str,
        package_path: Option<&str>,
    ) -> Result<WeaveOutcome, WeaveError> {
        let regions = scan_regions(text).map_err(|source| WeaveError::Markers {
            path: path.to_path_buf(),
            source,
        })?;

        let aspects = self.applicable_aspects(package_path);
        let previous = self.previous_references(text, &regions);
        if aspects.is_empty() {
            return Ok(WeaveOutcome::unchanged(path, text, previous));
        }

        let file = parser.parse(path, text)?;
        let imports = ImportTable::new(&file);
        let decorations = Decorations::new(&file);
        let types = TypeResolver::new(&file, &imports, package_path);

        let import_region = regions
            .iter()
            .find(|r| r.attrs.aspect == IMPORTS_ASPECT && r.attrs.kind == IMPORTS_KIND)
            .cloned();
        let plan = match &import_region {
            Some(region) => ImportPlan::with_existing(
                imports.specs().iter().filter(|s| region.contains(&s.range)),
            ),
            None => ImportPlan::new(),
        };

        let mut weaver = Weaver {
            ctx: MatchContext {
                file: &file,
                imports: &imports,
                decorations: &decorations,
                types: &types,
                package_path,
            },
            regions,
            edits: EditSet::new(file.text(), path.to_string_lossy()),
            plan,
            references: previous,
            diagnostics: Vec::new(),
        };

        visit(&mut weaver, &aspects, file.root(), true);

        if weaver.edits.is_empty() {
            debug!(path = %path.display(), "nothing to weave");
            let mut outcome = WeaveOutcome::unchanged(path, text, weaver.references);
            outcome.diagnostics = weaver.diagnostics;
            return Ok(outcome);
        }

        if !weaver.plan.is_empty() {
            let attrs = MarkerAttrs::new(IMPORTS_KIND, IMPORTS_ASPECT);
            let body = format!("; {}", weaver.plan.render());
            let placed = match &import_region {
                Some(region) => weaver.edits.regenerate(region.range.clone(), attrs, body),
                None => {
                    let at = file
                        .package_clause()
                        .map(|clause| clause.end_byte())
                        .unwrap_or(0);
                    weaver.edits.insert(at, attrs, body)
                }
            };
            // the package clause is never inside an edit
            debug_assert!(placed.is_ok());
        }

        let source = weaver.edits.apply();
        info!(
            path = %path.display(),
            edits = weaver.edits.edits().len(),
            diagnostics = weaver.diagnostics.len(),
            "wove file"
        );
        Ok(WeaveOutcome {
            path: path.to_path_buf(),
            modified: true,
            source,
            references: weaver.references,
            diagnostics: weaver.diagnostics,
        })
    }

    /// Weave every file of one package, spreading files over threads.
    /// Outcomes are returned in input order.
    pub fn weave_package(
        &self,
        files: &[(PathBuf, String)],
        package_path: Option<&str>,
    ) -> Vec<Result<WeaveOutcome, WeaveError>> {
        let outcomes = self.weave_parallel(files, package_path);
        let diagnostics: Vec<Diagnostic> = outcomes
            .iter()
            .flatten()
            .flat_map(|o| o.diagnostics.iter().cloned())
            .collect();
        if !diagnostics.is_empty() {
            info!(
                package = package_path.unwrap_or("-"),
                counts = ?summarize(&diagnostics),
                "weave diagnostics"
            );
        }
        outcomes
    }

    fn weave_parallel(
        &self,
        files: &[(PathBuf, String)],
        package_path: Option<&str>,
    ) -> Vec<Result<WeaveOutcome, WeaveError>> {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(files.len().max(1));
        if threads <= 1 {
            return self.weave_chunk(files, package_path);
        }
        let per_thread = files.len().div_ceil(threads);

        std::thread::scope(|s| {
            let mut tasks = Vec::with_capacity(threads);
            for chunk in files.chunks(per_thread) {
                tasks.push(s.spawn(move || self.weave_chunk(chunk, package_path)));
            }

            let mut outcomes = Vec::with_capacity(files.len());
            for task in tasks {
                match task.join() {
                    Ok(chunk) => outcomes.extend(chunk),
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
            outcomes
        })
    }

    fn weave_chunk(
        &self,
        files: &[(PathBuf, String)],
        package_path: Option<&str>,
    ) -> Vec<Result<WeaveOutcome, WeaveError>> {
        let mut parser = match GoParser::new() {
            Ok(parser) => parser,
            Err(e) => {
                let message = e.to_string();
                return files
                    .iter()
                    .map(|_| Err(WeaveError::Parse(ParseError::Language(message.clone()))))
                    .collect();
            }
        };
        files
            .iter()
            .map(|(path, text)| self.weave_with(&mut parser, path, text, package_path))
            .collect()
    }

    /// References carried by regions an earlier weave left in `text`.
    fn previous_references(&self, text: &str, regions: &[Region]) -> ReferenceMap {
        let mut references = ReferenceMap::new();
        for region in regions {
            if region.attrs.aspect == IMPORTS_ASPECT && region.attrs.kind == IMPORTS_KIND {
                for path in quoted_paths(&text[region.body.clone()]) {
                    references.add(path, ReferenceKind::ImportStatement);
                }
                continue;
            }
            let links = self
                .catalog
                .aspects()
                .iter()
                .filter(|a| a.id == region.attrs.aspect)
                .flat_map(|a| a.advice.iter())
                .filter(|advice| advice.kind() == region.attrs.kind)
                .filter_map(|advice| match advice {
                    Advice::InjectDeclarations { links, .. } => Some(links),
                    _ => None,
                })
                .flatten();
            for link in links {
                references.add(link.clone(), ReferenceKind::RelocationTarget);
            }
        }
        references
    }
}

fn visit<'f>(weaver: &mut Weaver<'_, 'f>, aspects: &[&Aspect], node: Node<'f>, is_root: bool) {
    if !is_root {
        let range = node.byte_range();
        if node.kind() == "comment" || weaver.regions.iter().any(|r| r.contains(&range)) {
            return;
        }
        if weaver
            .ctx
            .decorations
            .annotate(node)
            .directive(IGNORE_DIRECTIVE)
            .is_some()
        {
            debug!(line = node.start_position().row + 1, "ignoring subtree");
            return;
        }
    }

    let mut cursor = node.walk();
    let children: Vec<Node<'f>> = node.named_children(&mut cursor).collect();
    for child in children {
        visit(weaver, aspects, child, false);
    }

    for aspect in aspects {
        if aspect.file_scoped != is_root {
            continue;
        }
        if weaver.ctx.matches(&aspect.join_point, node) {
            weaver.apply_aspect(aspect, node);
        }
    }
}

/// String literal contents of an import region body.
fn quoted_paths(body: &str) -> Vec<String> {
    body.split('"')
        .skip(1)
        .step_by(2)
        .map(str::to_string)
        .collect()
}

/// Remove every generated region, restoring the text that was there before
/// weaving. Regions nested by later weaves are peeled one layer per pass.
pub fn unweave(text: &str) -> Result<String, MarkerError> {
    let mut current = text.to_string();
    loop {
        let regions = scan_regions(&current)?;
        if regions.is_empty() {
            return Ok(current);
        }
        let mut out = String::with_capacity(current.len());
        let mut cursor = 0;
        for region in &regions {
            out.push_str(&current[cursor..region.range.start]);
            if let Some(orig) = &region.attrs.orig {
                out.push_str(orig);
            }
            cursor = region.range.end;
        }
        out.push_str(&current[cursor..]);
        current = out;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CATALOG: &str = r#"
runtime-packages:
  - example.com/runtime
aspects:
  - id: wrap-get
    join-point:
      call: net/http.Get
    advice:
      - wrap-expression:
          template: "whttp.Observe({{ expr }})"
          imports:
            whttp: example.com/runtime/http
  - id: inside
    internal-only: true
    join-point:
      call: net/http.Get
    advice:
      - wrap-expression:
          template: "inner({{ expr }})"
"#;

    const SOURCE: &str = "package main\n\nimport \"net/http\"\n\nfunc main() {\n\tresp, err := http.Get(\"http://example.com\")\n\t_, _ = resp, err\n}\n";

    #[test]
    fn test_weave_then_unweave() {
        let catalog = Catalog::from_yaml_str(CATALOG).unwrap();
        let injector = Injector::new(&catalog, ActivationFlags::new());
        let outcome = injector.weave("main.go", SOURCE, Some("example.com/app")).unwrap();

        assert!(outcome.modified);
        assert!(outcome.source.starts_with(
            "package main/*weft:begin kind=imports aspect=weft*/; import (__weft_whttp \"example.com/runtime/http\")/*weft:end*/\n"
        ));
        assert!(outcome
            .source
            .contains("__weft_whttp.Observe(http.Get(\"http://example.com\"))/*weft:end*/"));
        assert_eq!(
            outcome.references.get("example.com/runtime/http"),
            Some(ReferenceKind::ImportStatement)
        );
        assert_eq!(unweave(&outcome.source).unwrap(), SOURCE);
    }

    #[test]
    fn test_runtime_packages_only_get_internal_aspects() {
        let catalog = Catalog::from_yaml_str(CATALOG).unwrap();
        let injector = Injector::new(&catalog, ActivationFlags::new());
        let ids: Vec<&str> = injector
            .applicable_aspects(Some("example.com/runtime/http"))
            .iter()
            .map(|a| a.id.as_str())
            .collect();
        assert_eq!(ids, vec!["inside"]);
    }

    #[test]
    fn test_resolving_stack_disables_aspects() {
        let catalog = Catalog::from_yaml_str(CATALOG).unwrap();
        let injector = Injector::new(&catalog, ActivationFlags::new())
            .with_resolving(vec!["example.com/runtime/http".to_string()]);
        let outcome = injector.weave("main.go", SOURCE, Some("example.com/app")).unwrap();
        assert!(!outcome.modified);
        assert_eq!(outcome.source, SOURCE);
    }

    #[test]
    fn test_unweave_peels_nested_layers() {
        let text = "x := /*weft:begin kind=wrap-expression aspect=b orig=f()*/g(/*weft:begin kind=wrap-expression aspect=a orig=f()*/h(f())/*weft:end*/)/*weft:end*/\n";
        assert_eq!(unweave(text).unwrap(), "x := f()\n");
    }
}
