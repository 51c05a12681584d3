//! Go import configuration files
//!
//! The compiler and linker receive `-importcfg <file>` listing where every
//! package archive lives:
//!
//! ```text
//! # import config
//! packagefile fmt=/root/.cache/go-build/ab/abcd-d
//! importmap golang.org/x/net/http2/hpack=vendor/golang.org/x/net/http2/hpack
//! ```
//!
//! Lines this module does not interpret (comments, `modinfo`, ...) are kept
//! in order and written back unchanged.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RegistryError, Result};
use crate::write_atomic;

const PACKAGEFILE: &str = "packagefile";
const IMPORTMAP: &str = "importmap";

/// Import path -> archive, plus import aliases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRegister {
    packages: BTreeMap<String, PathBuf>,
    aliases: BTreeMap<String, String>,
    /// Uninterpreted lines, in file order.
    other: Vec<String>,
}

impl PackageRegister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut register = Self::new();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            let malformed = |message: &str| RegistryError::MalformedConfig {
                line: index + 1,
                message: format!("{}: {:?}", message, raw),
            };

            let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
            match verb {
                PACKAGEFILE => {
                    let (path, archive) = rest
                        .trim()
                        .split_once('=')
                        .ok_or_else(|| malformed("expected packagefile path=archive"))?;
                    if path.is_empty() || archive.is_empty() {
                        return Err(malformed("empty packagefile entry"));
                    }
                    register.packages.insert(path.to_string(), PathBuf::from(archive));
                }
                IMPORTMAP => {
                    let (alias, path) = rest
                        .trim()
                        .split_once('=')
                        .ok_or_else(|| malformed("expected importmap alias=path"))?;
                    if alias.is_empty() || path.is_empty() {
                        return Err(malformed("empty importmap entry"));
                    }
                    register.aliases.insert(alias.to_string(), path.to_string());
                }
                "" => {}
                _ => register.other.push(raw.to_string()),
            }
        }
        Ok(register)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| RegistryError::io(path, e))?;
        let register = Self::parse(&text)?;
        debug!(path = %path.display(), packages = register.packages.len(), "read import configuration");
        Ok(register)
    }

    /// Write to `path` through a temporary file in the same directory, so a
    /// concurrent reader sees either the old or the new file.
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        write_atomic(path, self.dump().as_bytes())?;
        debug!(path = %path.display(), packages = self.packages.len(), "wrote import configuration");
        Ok(())
    }

    /// Text form; `parse(dump())` returns an equal register.
    pub fn dump(&self) -> String {
        self.to_string()
    }

    pub fn archive(&self, import_path: &str) -> Option<&Path> {
        self.packages.get(import_path).map(PathBuf::as_path)
    }

    pub fn contains(&self, import_path: &str) -> bool {
        self.packages.contains_key(import_path)
    }

    /// Set the archive of a package, returning the previous one.
    pub fn insert(&mut self, import_path: impl Into<String>, archive: impl Into<PathBuf>) -> Option<PathBuf> {
        self.packages.insert(import_path.into(), archive.into())
    }

    pub fn add_alias(&mut self, alias: impl Into<String>, import_path: impl Into<String>) {
        self.aliases.insert(alias.into(), import_path.into());
    }

    pub fn alias(&self, alias: &str) -> Option<&str> {
        self.aliases.get(alias).map(String::as_str)
    }

    /// Add the packages of `other` this register lacks. Returns how many
    /// were added; existing entries are never overwritten.
    pub fn merge_missing(&mut self, other: &PackageRegister) -> usize {
        let mut added = 0;
        for (path, archive) in &other.packages {
            if !self.packages.contains_key(path) {
                self.packages.insert(path.clone(), archive.clone());
                added += 1;
            }
        }
        for (alias, path) in &other.aliases {
            self.aliases.entry(alias.clone()).or_insert_with(|| path.clone());
        }
        added
    }

    /// Those of `paths` that have no archive here.
    pub fn missing<'p>(&self, paths: impl IntoIterator<Item = &'p str>) -> Vec<&'p str> {
        paths.into_iter().filter(|p| !self.contains(p)).collect()
    }

    pub fn packages(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.packages.iter().map(|(p, a)| (p.as_str(), a.as_path()))
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl fmt::Display for PackageRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.other {
            writeln!(f, "{}", line)?;
        }
        for (alias, path) in &self.aliases {
            writeln!(f, "{} {}={}", IMPORTMAP, alias, path)?;
        }
        for (path, archive) in &self.packages {
            writeln!(f, "{} {}={}", PACKAGEFILE, path, archive.display())?;
        }
        Ok(())
    }
}
