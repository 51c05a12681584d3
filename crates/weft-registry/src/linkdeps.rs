//! Link-time dependency manifests
//!
//! Some packages introduced by weaving are only reached by the linker (a
//! `//go:linkname` pull, or an import added to a package whose importers were
//! compiled against the original import configuration). The compile step
//! records them in a manifest stored as an extra member of the package
//! archive; the link step collects the manifests of every archive it links.
//!
//! ```text
//! weft-linkdeps v1
//! # packages required at link time
//! github.com/weft-dev/weft/runtime/internal/boot
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use tracing::debug;

use crate::archive;
use crate::error::{RegistryError, Result};

/// Archive member holding the manifest.
pub const MEMBER_NAME: &str = "_weft_deps.v1";

const HEADER: &str = "weft-linkdeps v1";

/// Sorted, de-duplicated set of import paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkDeps {
    paths: BTreeSet<String>,
}

impl LinkDeps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the path was new.
    pub fn insert(&mut self, import_path: impl Into<String>) -> bool {
        self.paths.insert(import_path.into())
    }

    pub fn contains(&self, import_path: &str) -> bool {
        self.paths.contains(import_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty());
        match lines.next() {
            Some(HEADER) => {}
            Some(other) => {
                return Err(RegistryError::MalformedManifest(format!(
                    "unsupported header {:?}",
                    other
                )))
            }
            None => return Err(RegistryError::MalformedManifest("empty manifest".into())),
        }

        let mut deps = Self::new();
        for line in lines.filter(|l| !l.starts_with('#')) {
            if line.contains(char::is_whitespace) {
                return Err(RegistryError::MalformedManifest(format!(
                    "invalid import path {:?}",
                    line
                )));
            }
            deps.insert(line);
        }
        Ok(deps)
    }

    /// Manifest embedded in the archive at `path`, if it has one.
    pub fn from_archive(path: &Path) -> Result<Option<Self>> {
        let Some(data) = archive::read_member(path, MEMBER_NAME)? else {
            return Ok(None);
        };
        let text = String::from_utf8(data).map_err(|_| {
            RegistryError::MalformedManifest(format!("{} is not UTF-8", path.display()))
        })?;
        let deps = Self::parse(&text)?;
        debug!(archive = %path.display(), deps = deps.len(), "read link-deps manifest");
        Ok(Some(deps))
    }

    /// Store this manifest in the archive at `path`, replacing any earlier one.
    pub fn write_to_archive(&self, path: &Path) -> Result<()> {
        archive::write_member(path, MEMBER_NAME, self.to_string().as_bytes())?;
        debug!(archive = %path.display(), deps = self.len(), "embedded link-deps manifest");
        Ok(())
    }
}

impl<S: Into<String>> FromIterator<S> for LinkDeps {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            paths: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl<S: Into<String>> Extend<S> for LinkDeps {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        self.paths.extend(iter.into_iter().map(Into::into));
    }
}

impl fmt::Display for LinkDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", HEADER)?;
        for path in &self.paths {
            writeln!(f, "{}", path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_comments_and_blank_lines_are_ignored() {
        let deps = LinkDeps::parse("weft-linkdeps v1\n\n# boot\nb/c\na\n  a  \n").unwrap();
        assert_eq!(deps.iter().collect::<Vec<_>>(), vec!["a", "b/c"]);
        assert_eq!(deps.to_string(), "weft-linkdeps v1\na\nb/c\n");
    }

    #[test]
    fn test_header_is_required() {
        assert!(matches!(
            LinkDeps::parse("a\nb\n"),
            Err(RegistryError::MalformedManifest(_))
        ));
        assert!(LinkDeps::parse("").is_err());
        assert!(LinkDeps::parse("weft-linkdeps v2\n").is_err());
    }

    proptest! {
        #[test]
        fn prop_write_read_is_sorted_set(
            paths in proptest::collection::vec("[a-z][a-z0-9./_-]{0,20}", 0..16)
        ) {
            let written: LinkDeps = paths.iter().cloned().collect();
            let read = LinkDeps::parse(&written.to_string()).unwrap();

            let mut expected = paths.clone();
            expected.sort();
            expected.dedup();
            prop_assert_eq!(read.iter().collect::<Vec<_>>(), expected.iter().map(String::as_str).collect::<Vec<_>>());
            prop_assert_eq!(read, written);
        }
    }
}
