//! Growing import configurations with the packages weaving introduced
//!
//! The go command plans every compile and link before any file is woven, so
//! their import configurations lack whatever the woven code now refers to.
//! Compile steps add the packages their own imports need; the link step
//! follows the link-deps manifests of every archive it links.

use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::{debug, info};
use weft_core::{ReferenceKind, ReferenceMap};

use crate::error::{RegistryError, Result};
use crate::importcfg::PackageRegister;
use crate::linkdeps::LinkDeps;
use crate::resolver::Resolver;

/// What a compile step changed.
#[derive(Debug, Default, PartialEq)]
pub struct CompileAugmentation {
    /// Packages spliced into the compile's import configuration. The link
    /// step needs them too.
    pub added: PackageRegister,
    /// Packages the linker must find for this archive: relocation targets
    /// and the imports added here.
    pub link_deps: LinkDeps,
}

impl CompileAugmentation {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.link_deps.is_empty()
    }
}

/// Resolve the import-statement references `register` lacks and add them,
/// with their dependencies, to `register`.
pub fn augment_compile(
    references: &ReferenceMap,
    register: &mut PackageRegister,
    resolver: &dyn Resolver,
) -> Result<CompileAugmentation> {
    let missing: Vec<String> = register
        .missing(references.paths_of_kind(ReferenceKind::ImportStatement))
        .into_iter()
        .filter(|p| *p != "unsafe")
        .map(String::from)
        .collect();

    let mut augmentation = CompileAugmentation {
        link_deps: references
            .paths_of_kind(ReferenceKind::RelocationTarget)
            .collect(),
        ..Default::default()
    };

    if !missing.is_empty() {
        let resolved = resolve_all(resolver, &missing)?;
        for (path, archive) in resolved.packages() {
            if !register.contains(path) {
                augmentation.added.insert(path, archive);
            }
        }
        register.merge_missing(&augmentation.added);
        augmentation.link_deps.extend(missing.iter().cloned());
        info!(
            requested = missing.len(),
            added = augmentation.added.len(),
            "added woven imports to import configuration"
        );
    }
    Ok(augmentation)
}

/// Complete a link import configuration. Registers recorded by compile steps
/// are merged first, then link-deps manifests are followed until no archive
/// asks for anything new. Returns how many packages were added.
pub fn augment_link<'r>(
    register: &mut PackageRegister,
    recorded: impl IntoIterator<Item = &'r PackageRegister>,
    resolver: &dyn Resolver,
) -> Result<usize> {
    let mut added = 0;
    for extra in recorded {
        added += register.merge_missing(extra);
    }

    let mut scanned: BTreeSet<PathBuf> = BTreeSet::new();
    loop {
        let mut wanted: BTreeSet<String> = BTreeSet::new();
        let archives: Vec<PathBuf> = register
            .packages()
            .map(|(_, archive)| archive.to_path_buf())
            .filter(|archive| !scanned.contains(archive))
            .collect();
        if archives.is_empty() {
            break;
        }

        for archive in archives {
            if let Some(deps) = LinkDeps::from_archive(&archive)? {
                wanted.extend(deps.iter().filter(|p| !register.contains(p)).map(String::from));
            }
            scanned.insert(archive);
        }
        if wanted.is_empty() {
            continue;
        }

        let wanted: Vec<String> = wanted.into_iter().collect();
        debug!(packages = ?wanted, "resolving link-time dependencies");
        let resolved = resolve_all(resolver, &wanted)?;
        added += register.merge_missing(&resolved);
    }

    if added > 0 {
        info!(added, "added link-time dependencies to link configuration");
    }
    Ok(added)
}

fn resolve_all(resolver: &dyn Resolver, paths: &[String]) -> Result<PackageRegister> {
    let resolved = resolver.resolve(paths)?;
    if let Some(path) = paths.iter().find(|p| !resolved.contains(p)) {
        return Err(RegistryError::Unresolved {
            import_path: path.clone(),
            reason: "resolver returned no archive".to_string(),
        });
    }
    Ok(resolved)
}
