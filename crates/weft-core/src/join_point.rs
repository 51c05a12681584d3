//! Join points: declarative predicates selecting syntax locations
//!
//! A join point is pure data. Evaluation against a syntax tree lives in
//! `weft-codegen`; this module only defines the shapes and their catalog
//! (YAML) representation.

use serde::{Deserialize, Serialize};

use crate::types::{QualifiedName, TypeName};

/// Predicate over a syntax node and its static context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JoinPoint {
    /// Call of a package-level function, e.g. `net/http.ListenAndServe`.
    Call(QualifiedName),

    /// Call of a method on a value whose static type is `receiver`.
    MethodCall {
        receiver: TypeName,
        name: String,
    },

    /// Composite literal of the given type. With `field`, the join point
    /// is the value keyed by that field inside such a literal.
    CompositeLiteral {
        #[serde(rename = "type")]
        ty: TypeName,
        #[serde(default)]
        field: Option<String>,
    },

    /// Declaration of a named type in the current package.
    TypeDeclaration(String),

    /// Function or method declaration (or function literal) of a given shape.
    Function(FunctionShape),

    /// Node carrying a `//tool:name ...` directive comment.
    Directive(String),

    /// Files importing the given path.
    ImportPresent(String),

    /// Files whose package clause has the given name.
    PackageName(String),

    /// Files of the package with the given import path.
    ImportPath(String),

    /// `var`/`const` specs declaring `name` and/or having type `type`.
    ValueDeclaration {
        #[serde(default)]
        name: Option<String>,
        #[serde(default, rename = "type")]
        ty: Option<TypeName>,
    },

    /// Nodes located inside the body of a function matching the inner join point.
    FunctionBody(Box<JoinPoint>),

    AllOf(Vec<JoinPoint>),
    OneOf(Vec<JoinPoint>),
    Not(Box<JoinPoint>),
}

impl JoinPoint {
    /// Whether this join point can only be decided from file-level context
    /// and therefore matches every node of a selected file.
    pub fn is_file_scoped(&self) -> bool {
        match self {
            JoinPoint::ImportPresent(_) | JoinPoint::PackageName(_) | JoinPoint::ImportPath(_) => {
                true
            }
            JoinPoint::AllOf(items) | JoinPoint::OneOf(items) => {
                items.iter().all(JoinPoint::is_file_scoped)
            }
            JoinPoint::Not(inner) => inner.is_file_scoped(),
            _ => false,
        }
    }

    /// Directive names referenced anywhere in this join point.
    pub fn directives(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_directives(&mut out);
        out
    }

    fn collect_directives<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            JoinPoint::Directive(name) => out.push(name),
            JoinPoint::AllOf(items) | JoinPoint::OneOf(items) => {
                items.iter().for_each(|item| item.collect_directives(out))
            }
            JoinPoint::Not(inner) | JoinPoint::FunctionBody(inner) => {
                inner.collect_directives(out)
            }
            _ => {}
        }
    }
}

/// Shape constraints for function-like join points. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FunctionShape {
    #[serde(default)]
    pub name: Option<String>,

    /// Receiver type for methods; set means plain functions never match.
    #[serde(default)]
    pub receiver: Option<TypeName>,

    #[serde(default)]
    pub signature: Option<Signature>,

    /// At least one parameter has this type.
    #[serde(default)]
    pub has_parameter: Option<TypeName>,
}

/// Exact parameter and result types, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(default)]
    pub args: Vec<TypeName>,
    #[serde(default)]
    pub results: Vec<TypeName>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_representation() {
        let yaml = r#"
all-of:
  - directive: "weft:span"
  - function:
      has-parameter: context.Context
  - not:
      package-name: main
"#;
        let jp: JoinPoint = crate::yaml::from_str(yaml).unwrap();
        match &jp {
            JoinPoint::AllOf(items) => {
                assert_eq!(items.len(), 3);
                assert_eq!(items[0], JoinPoint::Directive("weft:span".to_string()));
                match &items[1] {
                    JoinPoint::Function(shape) => {
                        assert_eq!(
                            shape.has_parameter.as_ref().map(|t| t.to_string()),
                            Some("context.Context".to_string())
                        );
                    }
                    other => panic!("unexpected join point {:?}", other),
                }
            }
            other => panic!("unexpected join point {:?}", other),
        }
        assert_eq!(jp.directives(), vec!["weft:span"]);
        assert!(!jp.is_file_scoped());
    }

    #[test]
    fn test_file_scoped() {
        let jp = JoinPoint::AllOf(vec![
            JoinPoint::ImportPath("example.com/app".to_string()),
            JoinPoint::Not(Box::new(JoinPoint::PackageName("main".to_string()))),
        ]);
        assert!(jp.is_file_scoped());
    }

    #[test]
    fn test_call_from_string() {
        let jp: JoinPoint = crate::yaml::from_str("call: net/http.ListenAndServe").unwrap();
        assert_eq!(
            jp,
            JoinPoint::Call(QualifiedName::new("net/http", "ListenAndServe"))
        );
    }
}
