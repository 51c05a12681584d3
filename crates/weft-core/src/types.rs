//! Go qualified names and type names as they appear in catalogs
//!
//! A qualified name is written `import/path.Name`: the name is everything
//! after the last `.` that follows the last `/`, so `gopkg.in/yaml.v3.Node`
//! splits into `gopkg.in/yaml.v3` and `Node`. Names without a package part
//! (`error`, `string`, `[]byte`) are predeclared or unqualified.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// A possibly package-qualified Go identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QualifiedName {
    pub path: Option<String>,
    pub name: String,
}

impl QualifiedName {
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            name: name.into(),
        }
    }

    pub fn local(name: impl Into<String>) -> Self {
        Self {
            path: None,
            name: name.into(),
        }
    }
}

impl FromStr for QualifiedName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.chars().any(char::is_whitespace) {
            return Err(CoreError::InvalidTypeName(s.to_string()));
        }

        // Composite type expressions like `[]byte` or `map[string]int` are
        // kept whole; only plain `path.Name` forms are split.
        if s.contains(['[', ']', '(', ')', '{', '}', '*']) {
            return Ok(Self::local(s));
        }

        let tail_start = s.rfind('/').map(|i| i + 1).unwrap_or(0);
        match s[tail_start..].rfind('.') {
            Some(dot) => {
                let split = tail_start + dot;
                let (path, name) = (&s[..split], &s[split + 1..]);
                if path.is_empty() || name.is_empty() {
                    return Err(CoreError::InvalidTypeName(s.to_string()));
                }
                Ok(Self::new(path, name))
            }
            None if tail_start == 0 => Ok(Self::local(s)),
            None => Err(CoreError::InvalidTypeName(s.to_string())),
        }
    }
}

impl TryFrom<String> for QualifiedName {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<QualifiedName> for String {
    fn from(value: QualifiedName) -> Self {
        value.to_string()
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}.{}", path, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A type reference, optionally behind a single pointer indirection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TypeName {
    pub pointer: bool,
    pub name: QualifiedName,
}

impl TypeName {
    pub fn named(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            pointer: false,
            name: QualifiedName::new(path, name),
        }
    }

    pub fn pointer_to(mut self) -> Self {
        self.pointer = true;
        self
    }

    /// Whether `self` and `other` name the same type, ignoring pointer-ness.
    pub fn same_base(&self, other: &TypeName) -> bool {
        self.name == other.name
    }
}

impl FromStr for TypeName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (pointer, rest) = match trimmed.strip_prefix('*') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, trimmed),
        };
        Ok(Self {
            pointer,
            name: rest.parse()?,
        })
    }
}

impl TryFrom<String> for TypeName {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TypeName> for String {
    fn from(value: TypeName) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pointer {
            write!(f, "*")?;
        }
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_qualified_names() {
        let cases = vec![
            ("net/http.Get", Some("net/http"), "Get"),
            ("context.Context", Some("context"), "Context"),
            ("gopkg.in/yaml.v3.Node", Some("gopkg.in/yaml.v3"), "Node"),
            ("error", None, "error"),
            ("[]byte", None, "[]byte"),
        ];

        for (input, path, name) in cases {
            let parsed: QualifiedName = input.parse().unwrap();
            assert_eq!(parsed.path.as_deref(), path, "path mismatch for {}", input);
            assert_eq!(parsed.name, name, "name mismatch for {}", input);
            assert_eq!(parsed.to_string(), input);
        }
    }

    #[test]
    fn test_parse_type_names() {
        let ty: TypeName = "*net/http.Request".parse().unwrap();
        assert!(ty.pointer);
        assert_eq!(ty.name, QualifiedName::new("net/http", "Request"));
        assert_eq!(ty.to_string(), "*net/http.Request");

        let plain: TypeName = "net/http.Request".parse().unwrap();
        assert!(ty.same_base(&plain));
        assert_ne!(ty, plain);
    }

    #[test]
    fn test_rejects_malformed_names() {
        assert!("".parse::<QualifiedName>().is_err());
        assert!("net/http.".parse::<QualifiedName>().is_err());
        assert!("github.com/foo/bar".parse::<QualifiedName>().is_err());
        assert!("net/http Get".parse::<QualifiedName>().is_err());
    }
}
