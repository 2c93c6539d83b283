//! Engine configuration.
//!
//! An [`EngineConfig`] selects the storage backend and an optional key
//! prefix. It can be written in JSON, or in TOML with the `policy-config`
//! feature:
//!
//! ```toml
//! key_prefix = "myapp."
//!
//! [storage]
//! kind = "file"
//! path = "state.json"
//! ```
//!
//! Environment overrides (applied by
//! [`with_env_overrides`](EngineConfig::with_env_overrides)):
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `IMPERA_KEY_PREFIX` | replaces `key_prefix` |
//! | `IMPERA_STATE_PATH` | switches to file storage at that path |

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::error::{ConfigError, Result};
use crate::storage::{MemoryStorage, PrefixedStorage, StorageBackend};

/// Where variables are persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageConfig {
    #[default]
    Memory,
    /// JSON document at `path` (requires the `state-persistence` feature).
    File { path: PathBuf },
}

/// Engine construction parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Prepended to every storage key.
    pub key_prefix: Option<String>,
    pub storage: StorageConfig,
}

impl EngineConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    #[cfg(feature = "policy-config")]
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Load from a `.json` (or, with `policy-config`, `.toml`) file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| ConfigError::Read(err.to_string()))?;
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match ext.as_str() {
            "json" => Self::from_json_str(&text),
            #[cfg(feature = "policy-config")]
            "toml" => Self::from_toml_str(&text),
            other => Err(ConfigError::UnsupportedFormat(other.to_owned())),
        }
    }

    /// Apply `IMPERA_KEY_PREFIX` and `IMPERA_STATE_PATH`.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        let prefix = env::var("IMPERA_KEY_PREFIX").ok();
        let path = env::var("IMPERA_STATE_PATH").ok();
        self.apply_overrides(prefix.as_deref(), path.as_deref())
    }

    /// Apply explicit overrides; blank values are ignored.
    #[must_use]
    pub fn apply_overrides(mut self, prefix: Option<&str>, path: Option<&str>) -> Self {
        if let Some(prefix) = prefix.map(str::trim).filter(|p| !p.is_empty()) {
            self.key_prefix = Some(prefix.to_owned());
        }
        if let Some(path) = path.map(str::trim).filter(|p| !p.is_empty()) {
            self.storage = StorageConfig::File {
                path: PathBuf::from(path),
            };
        }
        self
    }

    /// Build an engine with the configured storage stack.
    pub fn build(&self) -> Result<Engine> {
        let base: Rc<dyn StorageBackend> = match &self.storage {
            StorageConfig::Memory => Rc::new(MemoryStorage::new()),
            #[cfg(feature = "state-persistence")]
            StorageConfig::File { path } => Rc::new(crate::storage::FileStorage::new(path)),
            #[cfg(not(feature = "state-persistence"))]
            StorageConfig::File { .. } => {
                return Err(ConfigError::FeatureDisabled("state-persistence".into()).into());
            }
        };
        let storage: Rc<dyn StorageBackend> = match self.key_prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => Rc::new(PrefixedStorage::new(prefix, base)),
            _ => base,
        };
        tracing::debug!(config = ?self, "engine configured");
        Ok(Engine::with_storage(storage))
    }
}

impl Engine {
    /// Shorthand for [`EngineConfig::build`].
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        config.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::StateVariable;

    #[test]
    fn default_is_memory_without_prefix() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.storage, StorageConfig::Memory);
    }

    #[test]
    fn parses_json() {
        let config = EngineConfig::from_json_str(
            r#"{"key_prefix": "app.", "storage": {"kind": "file", "path": "/tmp/s.json"}}"#,
        )
        .unwrap();
        assert_eq!(config.key_prefix.as_deref(), Some("app."));
        assert_eq!(
            config.storage,
            StorageConfig::File {
                path: PathBuf::from("/tmp/s.json")
            }
        );
    }

    #[test]
    fn rejects_unknown_storage_kind() {
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"storage": {"kind": "cloud"}}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn overrides_ignore_blank_values() {
        let config = EngineConfig::default().apply_overrides(Some("  "), None);
        assert_eq!(config, EngineConfig::default());
        let config = EngineConfig::default().apply_overrides(Some("x."), Some("state.json"));
        assert_eq!(config.key_prefix.as_deref(), Some("x."));
        assert_eq!(
            config.storage,
            StorageConfig::File {
                path: PathBuf::from("state.json")
            }
        );
    }

    #[test]
    fn unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.yaml");
        fs::write(&path, "key_prefix: x").unwrap();
        assert_eq!(
            EngineConfig::load(&path),
            Err(ConfigError::UnsupportedFormat("yaml".into()))
        );
    }

    #[test]
    fn loads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        fs::write(&path, r#"{"key_prefix": "p."}"#).unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.key_prefix.as_deref(), Some("p."));
    }

    #[test]
    fn built_engine_uses_prefix() {
        let config = EngineConfig {
            key_prefix: Some("app.".into()),
            storage: StorageConfig::Memory,
        };
        let engine = Engine::from_config(&config).unwrap();
        StateVariable::new(&engine, "count", 1).unwrap();
        assert_eq!(engine.storage().load("app.count").unwrap(), None);
        // The prefixed view is what the engine sees.
        assert_eq!(engine.storage().load("count").unwrap().as_deref(), Some("1"));
    }

    #[cfg(feature = "policy-config")]
    #[test]
    fn parses_toml() {
        let config = EngineConfig::from_toml_str(
            "key_prefix = \"t.\"\n[storage]\nkind = \"file\"\npath = \"s.json\"\n",
        )
        .unwrap();
        assert_eq!(config.key_prefix.as_deref(), Some("t."));
    }

    #[cfg(feature = "state-persistence")]
    #[test]
    fn file_config_persists_across_engines() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::default()
            .apply_overrides(None, dir.path().join("state.json").to_str());
        {
            let engine = config.build().unwrap();
            let count = StateVariable::new(&engine, "count", 7).unwrap();
            count.set(9).unwrap();
        }
        let engine = config.build().unwrap();
        let count = StateVariable::new(&engine, "count", 7).unwrap();
        assert_eq!(count.get(), serde_json::json!(9));
    }

    #[cfg(not(feature = "state-persistence"))]
    #[test]
    fn file_config_needs_feature() {
        let config = EngineConfig::default().apply_overrides(None, Some("s.json"));
        assert!(config.build().is_err());
    }
}
