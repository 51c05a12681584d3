use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed import configuration at line {line}: {message}")]
    MalformedConfig { line: usize, message: String },

    #[error("Malformed link-deps manifest: {0}")]
    MalformedManifest(String),

    #[error("Malformed archive {path}: {message}")]
    MalformedArchive { path: PathBuf, message: String },

    #[error("Cannot resolve {import_path}: {reason}")]
    Unresolved { import_path: String, reason: String },

    #[error("Resolution cycle: {import_path} is already being resolved (via {stack})")]
    CycleDetected { import_path: String, stack: String },

    #[error("Command `{command}` failed: {message}")]
    Command { command: String, message: String },

    #[error("Session state {path}: {message}")]
    State { path: PathBuf, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RegistryError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RegistryError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
