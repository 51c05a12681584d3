//! Source weaving for Go
//!
//! A [`Catalog`] of aspects is compiled once from YAML. An [`Injector`]
//! applies it to source files: join points select syntax nodes, advice
//! rewrites them through structural code templates, and every rewrite is
//! bracketed by markers so it can be reviewed and reverted with [`unweave`].

pub mod advice;
pub mod catalog;
pub mod edits;
pub mod error;
pub mod imports;
pub mod injector;
pub mod matcher;
pub mod template;

pub use catalog::{Advice, Aspect, Catalog, BUILTIN_CATALOG};
pub use error::{Diagnostic, DiagnosticCategory, DiagnosticLocation, TemplateError, WeaveError};
pub use injector::{unweave, Injector, WeaveOutcome};
pub use template::{CodeTemplate, TemplateContext};
