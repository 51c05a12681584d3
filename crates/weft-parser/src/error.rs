use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to load Go grammar: {0}")]
    Language(String),

    #[error("{path}:{line}:{column}: syntax error")]
    Syntax {
        path: PathBuf,
        line: usize,
        column: usize,
    },

    #[error("Parser produced no tree for {0}")]
    NoTree(PathBuf),
}
