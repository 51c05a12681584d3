//! Core data model for weft: join points, advice, aspects and reference tracking

pub mod advice;
pub mod aspect;
pub mod error;
pub mod flags;
pub mod join_point;
pub mod references;
pub mod types;
pub mod yaml;

pub use advice::{AdviceSpec, TemplateSpec};
pub use aspect::{AspectSpec, CatalogSpec};
pub use error::CoreError;
pub use flags::ActivationFlags;
pub use join_point::{FunctionShape, JoinPoint, Signature};
pub use references::{ReferenceKind, ReferenceMap};
pub use types::{QualifiedName, TypeName};
