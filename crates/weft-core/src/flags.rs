//! Activation flags selecting between instrumentation styles

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// String key/value flags given to one weaving run. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationFlags(BTreeMap<String, String>);

impl ActivationFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `key=value` items; empty items are skipped.
    pub fn parse<'a>(items: impl IntoIterator<Item = &'a str>) -> Result<Self, CoreError> {
        let mut flags = Self::new();
        for item in items {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let (key, value) = item
                .split_once('=')
                .ok_or_else(|| CoreError::InvalidFlag(item.to_string()))?;
            if key.trim().is_empty() {
                return Err(CoreError::InvalidFlag(item.to_string()));
            }
            flags.set(key.trim(), value.trim());
        }
        Ok(flags)
    }

    /// Parse a comma separated list, as carried by `WEFT_FLAGS`.
    pub fn parse_list(list: &str) -> Result<Self, CoreError> {
        Self::parse(list.split(','))
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// True when every required flag is present with the required value.
    pub fn satisfies(&self, required: &BTreeMap<String, String>) -> bool {
        required
            .iter()
            .all(|(key, value)| self.get(key) == Some(value.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_satisfy() {
        let flags = ActivationFlags::parse_list("http-mode=wrap, sql=on,").unwrap();
        assert_eq!(flags.get("http-mode"), Some("wrap"));

        let mut required = BTreeMap::new();
        required.insert("http-mode".to_string(), "wrap".to_string());
        assert!(flags.satisfies(&required));

        required.insert("http-mode".to_string(), "report".to_string());
        assert!(!flags.satisfies(&required));

        assert!(flags.satisfies(&BTreeMap::new()));
    }

    #[test]
    fn test_rejects_missing_value() {
        assert!(ActivationFlags::parse_list("http-mode").is_err());
        assert!(ActivationFlags::parse_list("=wrap").is_err());
    }
}
