//! State carried from compile steps to the link step of one build
//!
//! Packages added to a compile's import configuration are unknown to the
//! link step, which the go command planned before any weaving happened. Each
//! compile step that added packages records them in the build session's
//! directory; every link step of the build reads them all. The directory is
//! removed once the build is over.
//!
//! A session is identified by an explicit token or by the go command's
//! `$WORK` directory, which every step of one build shares and no two
//! concurrent builds do.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{RegistryError, Result};
use crate::importcfg::PackageRegister;
use crate::write_atomic;

const STATE_EXTENSION: &str = "state";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: String,
    dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct Entry {
    import_path: String,
    register: PackageRegister,
}

impl Session {
    /// Session named by an explicit token.
    pub fn from_token(token: &str) -> Self {
        Self::in_dir(std::env::temp_dir(), token)
    }

    /// Session of the build whose step writes `output`. Go build steps write
    /// to `$WORK/bNNN/...`; the session is derived from `$WORK`.
    pub fn from_output(output: &Path) -> Option<Self> {
        let work = output.ancestors().find_map(|dir| {
            let is_action_dir = matches!(
                dir.components().next_back(),
                Some(Component::Normal(name))
                    if name.to_str().is_some_and(|n| {
                        n.len() > 1 && n.starts_with('b') && n[1..].bytes().all(|b| b.is_ascii_digit())
                    })
            );
            is_action_dir.then(|| dir.parent()).flatten()
        })?;
        Some(Self::from_token(&work.to_string_lossy()))
    }

    /// Session rooted in `base` instead of the system temp directory.
    pub fn in_dir(base: impl AsRef<Path>, token: &str) -> Self {
        let digest = Sha256::digest(token.as_bytes());
        let id = hex::encode(&digest[..8]);
        let dir = base.as_ref().join(format!("weft-{}", id));
        Self { id, dir }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record the packages one compile step added.
    pub fn store(&self, import_path: &str, register: &PackageRegister) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| RegistryError::io(&self.dir, e))?;
        let entry = Entry {
            import_path: import_path.to_string(),
            register: register.clone(),
        };
        let bytes = postcard::to_stdvec(&entry).map_err(|e| RegistryError::State {
            path: self.dir.clone(),
            message: e.to_string(),
        })?;
        let path = self.entry_path(import_path);
        write_atomic(&path, &bytes)?;
        debug!(session = %self.id, %import_path, packages = register.len(), "stored session state");
        Ok(())
    }

    /// Every recorded register, by the import path of the step that wrote it.
    pub fn load(&self) -> Result<BTreeMap<String, PackageRegister>> {
        let mut out = BTreeMap::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(RegistryError::io(&self.dir, e)),
        };

        for entry in entries {
            let path = entry.map_err(|e| RegistryError::io(&self.dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(STATE_EXTENSION) {
                continue;
            }
            let bytes = std::fs::read(&path).map_err(|e| RegistryError::io(&path, e))?;
            let entry: Entry = postcard::from_bytes(&bytes).map_err(|e| RegistryError::State {
                path: path.clone(),
                message: e.to_string(),
            })?;
            out.insert(entry.import_path, entry.register);
        }
        debug!(session = %self.id, entries = out.len(), "loaded session state");
        Ok(out)
    }

    /// Remove the session directory.
    pub fn clear(&self) {
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(dir = %self.dir.display(), error = %e, "could not remove session state");
            }
        }
    }

    fn entry_path(&self, import_path: &str) -> PathBuf {
        let digest = Sha256::digest(import_path.as_bytes());
        self.dir
            .join(format!("{}.{}", hex::encode(&digest[..12]), STATE_EXTENSION))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_store_load_clear() {
        let base = tempfile::tempdir().unwrap();
        let session = Session::in_dir(base.path(), "build-1");

        let mut first = PackageRegister::new();
        first.insert("github.com/weft-dev/weft/runtime/nethttp", "/cache/nethttp.a");
        let mut second = PackageRegister::new();
        second.insert("github.com/weft-dev/weft/runtime/sql", "/cache/sql.a");

        session.store("example.com/app", &first).unwrap();
        session.store("example.com/app/db", &second).unwrap();

        let state = session.load().unwrap();
        assert_eq!(state.len(), 2);
        assert_eq!(state["example.com/app"], first);
        assert_eq!(state["example.com/app/db"], second);

        // a second link step of the same build sees the same state
        assert_eq!(session.load().unwrap(), state);

        session.clear();
        assert!(!session.dir().exists());
        assert!(session.load().unwrap().is_empty());
    }

    #[test]
    fn test_sessions_are_isolated() {
        let base = tempfile::tempdir().unwrap();
        let a = Session::in_dir(base.path(), "/tmp/go-build111");
        let b = Session::in_dir(base.path(), "/tmp/go-build222");
        assert_ne!(a.dir(), b.dir());

        a.store("p", &PackageRegister::new()).unwrap();
        assert!(b.load().unwrap().is_empty());
    }

    #[test]
    fn test_session_from_work_dir() {
        let one = Session::from_output(Path::new("/tmp/go-build123/b001/_pkg_.a")).unwrap();
        let two = Session::from_output(Path::new("/tmp/go-build123/b042/exe/a.out")).unwrap();
        assert_eq!(one, two);
        assert_eq!(one, Session::from_token("/tmp/go-build123"));
        assert!(Session::from_output(Path::new("/home/user/out.a")).is_none());
    }
}
