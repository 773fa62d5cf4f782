//! User configuration attached to a filesystem handle.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{FsError, FsResult};

/// Config key selecting the backend type at create time.
pub const CONFIG_FS_TYPE: &str = "fs-type";

/// Key/value configuration for one filesystem handle.
///
/// Keys are flat strings; backends namespace their own keys with a
/// `<backend>.` prefix (e.g. `flat.fsync`). The table is read-only once a
/// handle has been created from it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FsConfig {
    entries: BTreeMap<String, String>,
}

impl FsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Read a boolean key, accepting `true/false`, `yes/no`, `on/off`, `1/0`.
    pub fn get_bool(&self, key: &str, default: bool) -> FsResult<bool> {
        let Some(raw) = self.get(key) else {
            return Ok(default);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(FsError::InvalidParameter(format!(
                "config key '{key}' expects a boolean, got '{raw}'"
            ))),
        }
    }

    /// The backend type requested for a new filesystem, if any.
    pub fn fs_type(&self) -> Option<&str> {
        self.get(CONFIG_FS_TYPE)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a TOML document. Nested tables flatten into dotted keys, so
    ///
    /// ```toml
    /// fs-type = "flat"
    /// [flat]
    /// fsync = true
    /// ```
    ///
    /// yields `fs-type = flat` and `flat.fsync = true`.
    pub fn from_toml_str(text: &str) -> FsResult<Self> {
        let table: toml::Table =
            toml::from_str(text).map_err(|e| FsError::Serialization(e.to_string()))?;
        let mut config = Self::new();
        flatten_into(&mut config, "", &table)?;
        Ok(config)
    }
}

fn flatten_into(config: &mut FsConfig, prefix: &str, table: &toml::Table) -> FsResult<()> {
    for (key, value) in table {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::Table(inner) => flatten_into(config, &full_key, inner)?,
            toml::Value::String(s) => config.set(full_key, s.clone()),
            toml::Value::Integer(i) => config.set(full_key, i.to_string()),
            toml::Value::Float(f) => config.set(full_key, f.to_string()),
            toml::Value::Boolean(b) => config.set(full_key, b.to_string()),
            toml::Value::Datetime(d) => config.set(full_key, d.to_string()),
            toml::Value::Array(_) => {
                return Err(FsError::InvalidParameter(format!(
                    "config key '{full_key}' cannot be an array"
                )))
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_and_lookup() {
        let config = FsConfig::new().with(CONFIG_FS_TYPE, "flat");
        assert_eq!(config.fs_type(), Some("flat"));
        assert_eq!(config.get("missing"), None);
    }

    #[test]
    fn booleans() {
        let config = FsConfig::new()
            .with("a", "yes")
            .with("b", "0")
            .with("c", "maybe");
        assert!(config.get_bool("a", false).unwrap());
        assert!(!config.get_bool("b", true).unwrap());
        assert!(config.get_bool("missing", true).unwrap());
        assert!(config.get_bool("c", false).is_err());
    }

    #[test]
    fn toml_tables_flatten_to_dotted_keys() {
        let config = FsConfig::from_toml_str(
            r#"
            fs-type = "flat"

            [flat]
            fsync = true
            cache-size = 16
            "#,
        )
        .unwrap();
        assert_eq!(config.fs_type(), Some("flat"));
        assert_eq!(config.get("flat.fsync"), Some("true"));
        assert_eq!(config.get("flat.cache-size"), Some("16"));
    }

    #[test]
    fn toml_arrays_are_rejected() {
        assert!(FsConfig::from_toml_str("keys = [1, 2]").is_err());
    }

    #[test]
    fn malformed_toml_is_a_serialization_error() {
        assert!(matches!(
            FsConfig::from_toml_str("fs-type = "),
            Err(FsError::Serialization(_))
        ));
    }
}
