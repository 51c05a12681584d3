//! Build-graph bookkeeping for weft
//!
//! Reads and writes the go toolchain's import configurations, embeds
//! link-time dependency manifests into package archives, locates archives
//! for packages introduced by weaving and carries state from compile steps
//! to the link step of the same build.

pub mod archive;
pub mod augment;
pub mod error;
pub mod importcfg;
pub mod linkdeps;
pub mod resolver;
pub mod state;

use std::io::Write;
use std::path::Path;

pub use augment::{augment_compile, augment_link, CompileAugmentation};
pub use error::{RegistryError, Result};
pub use importcfg::PackageRegister;
pub use linkdeps::LinkDeps;
pub use resolver::{GoListResolver, ResolutionStack, Resolver, RESOLVING_ENV};
pub use state::Session;

/// Replace `path` through a temporary file in the same directory, so a
/// concurrent reader sees either the old or the new content.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|e| RegistryError::io(dir, e))?;
    file.write_all(bytes)
        .map_err(|e| RegistryError::io(file.path(), e))?;
    file.persist(path)
        .map_err(|e| RegistryError::io(path, e.error))?;
    Ok(())
}
