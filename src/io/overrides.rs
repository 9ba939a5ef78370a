//! Notification override text loaded from a flat TOML file
//!
//! Keys are the full lookup keys (`{prefix}.{region_id}`), quoted because
//! they contain dots:
//!
//! ```toml
//! "geofence.notification.message.home" = "Welcome home"
//! ```

use crate::services::composer::OverrideStore;
use anyhow::Context;
use rustc_hash::FxHashMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Read-only override store backed by a TOML file
#[derive(Debug, Default)]
pub struct TomlOverrideStore {
    entries: FxHashMap<String, String>,
}

impl TomlOverrideStore {
    /// Load overrides; non-string values are skipped with a warning
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read overrides file {}", path.display()))?;
        let table: toml::Table = toml::from_str(&content)
            .with_context(|| format!("Failed to parse overrides file {}", path.display()))?;

        let mut entries = FxHashMap::default();
        for (key, value) in table {
            match value {
                toml::Value::String(text) => {
                    entries.insert(key, text);
                }
                other => {
                    warn!(key = %key, kind = other.type_str(), "override_not_a_string");
                }
            }
        }

        info!(path = %path.display(), overrides = entries.len(), "overrides_loaded");
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl OverrideStore for TomlOverrideStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_string_overrides() {
        let file = write_file(
            r#"
            "geofence.notification.message.home" = "Welcome home"
            "geofence.notification.message.work" = "Back to work"
            "#,
        );

        let store = TomlOverrideStore::load(file.path()).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(
            store.get("geofence.notification.message.home").as_deref(),
            Some("Welcome home")
        );
        assert!(store.get("geofence.notification.message.gym").is_none());
    }

    #[test]
    fn test_non_string_values_are_skipped() {
        let file = write_file(
            r#"
            "a" = "text"
            "b" = 3
            "#,
        );

        let store = TomlOverrideStore::load(file.path()).unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.get("b").is_none());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = TomlOverrideStore::load("/nonexistent/overrides.toml");
        assert!(result.is_err());
    }
}
