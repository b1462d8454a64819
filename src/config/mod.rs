//! Configuration management.
//!
//! recopy configuration can come from:
//! - Config file (~/.config/recopy/config.toml)
//! - Environment variables (RECOPY_*), which win over the file

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// recopy configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Collection schema configuration
    #[serde(default)]
    pub collections: CollectionsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database holding collections and jobs
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

/// Collection schema configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionsConfig {
    /// YAML file with a `collections:` list
    #[serde(default)]
    pub schema_path: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from default locations.
    pub fn load() -> Self {
        let mut config = Self::default();

        let primary_path = Self::config_dir().join("config.toml");
        if let Ok(partial) = Self::load_partial_from_path(&primary_path) {
            config.apply_partial(partial);
        }

        config.apply_env_overrides();
        config
    }

    /// Load configuration from an explicit file, then apply env overrides.
    ///
    /// Unlike [`Config::load`], a missing or malformed file is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let partial: PartialConfig = toml::from_str(&content)
            .map_err(|e| Error::Parse(format!("Invalid config {}: {}", path.display(), e)))?;

        let mut config = Self::default();
        config.apply_partial(partial);
        config.apply_env_overrides();
        Ok(config)
    }

    /// Get the data directory.
    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .map(|d| d.join("recopy"))
            .unwrap_or_else(|| PathBuf::from(".recopy"))
    }

    /// Get the config directory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("recopy"))
            .unwrap_or_else(|| PathBuf::from(".recopy"))
    }

    /// Database path, defaulting to the data directory.
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("recopy.db"))
    }

    /// Schema path, defaulting to the config directory.
    pub fn schema_path(&self) -> PathBuf {
        self.collections
            .schema_path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("collections.yaml"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("RECOPY_DATABASE_PATH") {
            self.storage.database_path = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("RECOPY_SCHEMA_PATH") {
            self.collections.schema_path = Some(PathBuf::from(path));
        }
        if let Ok(level) = std::env::var("RECOPY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(json) = std::env::var("RECOPY_LOG_JSON") {
            self.logging.json = matches!(json.to_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    fn load_partial_from_path(path: &Path) -> std::result::Result<PartialConfig, ()> {
        let content = std::fs::read_to_string(path).map_err(|_| ())?;
        toml::from_str(&content).map_err(|_| ())
    }

    fn apply_partial(&mut self, partial: PartialConfig) {
        if let Some(storage) = partial.storage {
            self.storage = storage;
        }
        if let Some(collections) = partial.collections {
            self.collections = collections;
        }
        if let Some(logging) = partial.logging {
            self.logging = logging;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    storage: Option<StorageConfig>,
    collections: Option<CollectionsConfig>,
    logging: Option<LoggingConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert!(config.database_path().ends_with("recopy.db"));
        assert!(config.schema_path().ends_with("collections.yaml"));
    }

    #[test]
    fn test_partial_keeps_other_sections() {
        let partial: PartialConfig = toml::from_str(
            r#"
[storage]
database_path = "/tmp/dup.db"
"#,
        )
        .unwrap();

        let mut config = Config::default();
        config.apply_partial(partial);
        assert_eq!(config.database_path(), PathBuf::from("/tmp/dup.db"));
        assert_eq!(config.logging.level, "info");
        assert!(config.collections.schema_path.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[collections]
schema_path = "schemas/collections.yaml"

[logging]
level = "debug"
json = true
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(
            config.schema_path(),
            PathBuf::from("schemas/collections.yaml")
        );
        assert!(config.logging.json);
    }

    #[test]
    fn test_load_from_rejects_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[storage\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert_eq!(err.code(), "PARSE_ERROR");
        assert!(Config::load_from(&dir.path().join("missing.toml")).is_err());
    }
}
