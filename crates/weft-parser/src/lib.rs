//! Comment-aware Go syntax trees for weaving
//!
//! Parsing is delegated to tree-sitter. On top of the raw tree this crate
//! binds comments to the declarations and statements they annotate, reads
//! `tool:name key:value` directives, locates previously generated regions and
//! infers static types where the source makes them evident.

pub mod decorate;
pub mod directive;
pub mod error;
pub mod function;
pub mod imports;
pub mod markers;
pub mod source;
pub mod types;

pub use decorate::{AnnotatedNode, Comment, Decorations};
pub use directive::Directive;
pub use error::ParseError;
pub use function::{FunctionInfo, Param};
pub use imports::{ImportSpec, ImportTable};
pub use markers::{MarkerAttrs, MarkerError, Region};
pub use source::{children, named_children, GoParser, SourceFile};
pub use types::TypeResolver;
