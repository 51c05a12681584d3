//! Error types and diagnostics for catalog compilation and weaving
//!
//! Two kinds of failure live here:
//! - `TemplateError`: a malformed advice template, reported when the catalog
//!   is loaded. All broken templates of a catalog are collected and reported
//!   together through `BatchErrors`.
//! - `WeaveError`: a file could not be woven at all.
//!
//! Advice that cannot be applied at one particular node is not an error; it
//! produces a `Diagnostic` in the weave outcome.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use weft_core::CoreError;
use weft_parser::{MarkerError, ParseError};

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("unterminated template hole at byte {0}")]
    UnterminatedHole(usize),

    #[error("unknown template hole {{{{ {0} }}}}")]
    UnknownHole(String),

    #[error("template hole {{{{ {0} }}}} is not allowed inside a raw string")]
    HoleInRawString(String),

    #[error("template does not parse as {context} at {line}:{column}")]
    Syntax {
        context: &'static str,
        line: usize,
        column: usize,
    },

    #[error("template import {alias:?} ({path}) is never used")]
    UnusedImport { alias: String, path: String },

    #[error("template imports {path} under both {first:?} and {second:?}")]
    DuplicateImport {
        path: String,
        first: String,
        second: String,
    },

    #[error("in aspect {aspect:?}, {kind} advice: {source}")]
    InAdvice {
        aspect: String,
        kind: &'static str,
        #[source]
        source: Box<TemplateError>,
    },

    #[error("Catalog error: {0}")]
    Catalog(#[from] CoreError),

    #[error("Parser error: {0}")]
    Parser(#[from] ParseError),

    #[error("Invalid templates ({count} total):\n{summary}")]
    Batch { count: usize, summary: String },
}

impl TemplateError {
    pub fn in_advice(self, aspect: &str, kind: &'static str) -> Self {
        TemplateError::InAdvice {
            aspect: aspect.to_string(),
            kind,
            source: Box::new(self),
        }
    }
}

#[derive(Error, Debug)]
pub enum WeaveError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("{path}: {source}")]
    Markers {
        path: PathBuf,
        #[source]
        source: MarkerError,
    },
}

/// Collects template errors so a catalog reports every broken template at once.
#[derive(Debug, Default)]
pub struct BatchErrors {
    entries: Vec<TemplateError>,
}

impl BatchErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, error: TemplateError) {
        self.entries.push(error);
    }

    pub fn has_errors(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Single error as-is, several folded into `TemplateError::Batch`.
    pub fn into_result(mut self) -> Result<(), TemplateError> {
        match self.entries.len() {
            0 => Ok(()),
            1 => Err(self.entries.remove(0)),
            count => Err(TemplateError::Batch {
                count,
                summary: self
                    .entries
                    .iter()
                    .map(|e| format!("  - {}", e))
                    .collect::<Vec<_>>()
                    .join("\n"),
            }),
        }
    }
}

/// Location context for where a diagnostic occurred
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticLocation {
    pub file: Option<PathBuf>,
    /// 1-based line
    pub line: Option<usize>,
    pub aspect: Option<String>,
}

impl DiagnosticLocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn in_aspect(mut self, aspect: impl Into<String>) -> Self {
        self.aspect = Some(aspect.into());
        self
    }
}

impl fmt::Display for DiagnosticLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{}:{}", file.display(), line)?,
            (Some(file), None) => write!(f, "{}", file.display())?,
            (None, Some(line)) => write!(f, "line {}", line)?,
            (None, None) => write!(f, "<unknown location>")?,
        }
        if let Some(aspect) = &self.aspect {
            write!(f, " [{}]", aspect)?;
        }
        Ok(())
    }
}

/// Why advice was skipped at a matched node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DiagnosticCategory {
    /// A template hole has no value at the node.
    UnboundHole,
    /// The advice kind does not fit the matched node.
    UnsupportedSite,
    /// The edit would overlap another edit.
    Conflict,
}

impl fmt::Display for DiagnosticCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticCategory::UnboundHole => write!(f, "UNBOUND_HOLE"),
            DiagnosticCategory::UnsupportedSite => write!(f, "UNSUPPORTED_SITE"),
            DiagnosticCategory::Conflict => write!(f, "CONFLICT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub category: DiagnosticCategory,
    pub location: DiagnosticLocation,
    pub message: String,
}

impl Diagnostic {
    pub fn new(category: DiagnosticCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            location: DiagnosticLocation::new(),
            message: message.into(),
        }
    }

    pub fn at(mut self, location: DiagnosticLocation) -> Self {
        self.location = location;
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] at {}: {}", self.category, self.location, self.message)
    }
}

/// Count diagnostics per category, for the end-of-package summary log.
pub fn summarize(diagnostics: &[Diagnostic]) -> BTreeMap<DiagnosticCategory, usize> {
    let mut counts = BTreeMap::new();
    for d in diagnostics {
        *counts.entry(d.category).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic::new(DiagnosticCategory::UnboundHole, "no context.Context parameter")
            .at(DiagnosticLocation::new()
                .in_file("handler.go")
                .at_line(12)
                .in_aspect("span-directive"));
        assert_eq!(
            d.to_string(),
            "[UNBOUND_HOLE] at handler.go:12 [span-directive]: no context.Context parameter"
        );
    }

    #[test]
    fn test_batch_errors() {
        let mut errors = BatchErrors::new();
        assert!(errors.into_result().is_ok());

        errors = BatchErrors::new();
        errors.add(TemplateError::UnknownHole("nope".into()));
        assert!(matches!(
            errors.into_result(),
            Err(TemplateError::UnknownHole(_))
        ));

        let mut errors = BatchErrors::new();
        errors.add(TemplateError::UnknownHole("a".into()));
        errors.add(TemplateError::UnterminatedHole(3));
        assert_eq!(errors.count(), 2);
        match errors.into_result() {
            Err(TemplateError::Batch { count, summary }) => {
                assert_eq!(count, 2);
                assert!(summary.contains("unterminated"));
            }
            other => panic!("expected batch error, got {:?}", other),
        }
    }

    #[test]
    fn test_summarize() {
        let diagnostics = vec![
            Diagnostic::new(DiagnosticCategory::Conflict, "a"),
            Diagnostic::new(DiagnosticCategory::UnboundHole, "b"),
            Diagnostic::new(DiagnosticCategory::Conflict, "c"),
        ];
        let counts = summarize(&diagnostics);
        assert_eq!(counts[&DiagnosticCategory::Conflict], 2);
        assert_eq!(counts[&DiagnosticCategory::UnboundHole], 1);
    }
}
