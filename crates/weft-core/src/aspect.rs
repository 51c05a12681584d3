//! Aspects and the catalog specification they are loaded from

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::advice::AdviceSpec;
use crate::join_point::JoinPoint;
use crate::CoreError;

/// A join point with the advice applied where it matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AspectSpec {
    /// Identifier written into generated region markers.
    pub id: String,
    pub join_point: JoinPoint,
    pub advice: Vec<AdviceSpec>,
    /// Activation flags that must all be set for the aspect to apply.
    #[serde(default)]
    pub flags: BTreeMap<String, String>,
    /// Applies only inside the runtime packages instead of outside them.
    #[serde(default)]
    pub internal_only: bool,
}

/// Deserialized catalog document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CatalogSpec {
    /// Import path prefixes of the runtime library generated code calls into.
    #[serde(default)]
    pub runtime_packages: Vec<String>,
    pub aspects: Vec<AspectSpec>,
}

impl CatalogSpec {
    pub fn from_yaml_str(source: &str) -> Result<Self, CoreError> {
        let spec: CatalogSpec = crate::yaml::from_str(source)?;
        spec.validate()?;
        debug!(aspects = spec.aspects.len(), "parsed catalog specification");
        Ok(spec)
    }

    /// Structural checks that do not need a Go parser.
    pub fn validate(&self) -> Result<(), CoreError> {
        let mut seen = HashSet::new();
        for aspect in &self.aspects {
            if aspect.id.is_empty()
                || !aspect
                    .id
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
            {
                return Err(CoreError::InvalidCatalog(format!(
                    "aspect id {:?} must be non-empty and use only [A-Za-z0-9-_./]",
                    aspect.id
                )));
            }
            if !seen.insert(aspect.id.as_str()) {
                return Err(CoreError::InvalidCatalog(format!(
                    "duplicate aspect id {:?}",
                    aspect.id
                )));
            }
            if aspect.advice.is_empty() {
                return Err(CoreError::InvalidCatalog(format!(
                    "aspect {:?} has no advice",
                    aspect.id
                )));
            }
        }
        Ok(())
    }

    /// Whether `import_path` belongs to the runtime library.
    pub fn is_runtime_package(&self, import_path: &str) -> bool {
        self.runtime_packages.iter().any(|prefix| {
            import_path == prefix
                || import_path
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    /// Content hash of the catalog, folded into the toolchain version stamp.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        // deterministic for this data (BTreeMaps only)
        match crate::yaml::to_string(self) {
            Ok(text) => hasher.update(text.as_bytes()),
            Err(_) => hasher.update(format!("{:?}", self).as_bytes()),
        }
        hex::encode(&hasher.finalize()[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
runtime-packages:
  - example.com/weft-runtime
aspects:
  - id: http-client
    join-point:
      call: net/http.Get
    advice:
      - replace-callee:
          template: "whttp.Get"
          imports:
            whttp: example.com/weft-runtime/net/http
"#;

    #[test]
    fn test_parse_catalog() {
        let spec = CatalogSpec::from_yaml_str(CATALOG).unwrap();
        assert_eq!(spec.aspects.len(), 1);
        assert_eq!(spec.aspects[0].advice[0].kind(), "replace-callee");
        assert_eq!(
            spec.aspects[0].advice[0].referenced_paths(),
            vec!["example.com/weft-runtime/net/http"]
        );
        assert_eq!(spec.fingerprint().len(), 16);
    }

    #[test]
    fn test_runtime_package_prefix() {
        let spec = CatalogSpec::from_yaml_str(CATALOG).unwrap();
        assert!(spec.is_runtime_package("example.com/weft-runtime"));
        assert!(spec.is_runtime_package("example.com/weft-runtime/net/http"));
        assert!(!spec.is_runtime_package("example.com/weft-runtimex"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut spec = CatalogSpec::from_yaml_str(CATALOG).unwrap();
        spec.aspects.push(spec.aspects[0].clone());
        assert!(matches!(spec.validate(), Err(CoreError::InvalidCatalog(_))));
    }
}
