use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid type name: {0:?}")]
    InvalidTypeName(String),

    #[error("Invalid activation flag {0:?} (expected key=value)")]
    InvalidFlag(String),

    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),

    #[error("Catalog YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
