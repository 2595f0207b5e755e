//! Configuration loading and database path resolution
//!
//! Database path priority:
//! 1. Command-line argument (highest priority)
//! 2. `JCAT_DATABASE` environment variable
//! 3. TOML config file (`database` key)
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or malformed config file is never fatal: a warning is logged and
//! compiled defaults apply.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the database file
pub const DATABASE_ENV_VAR: &str = "JCAT_DATABASE";

/// File name of the default database inside the data directory
pub const DATABASE_FILE_NAME: &str = "jcat.db";

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Path to the catalog database
    pub database: Option<PathBuf>,

    #[serde(default)]
    pub integrity: IntegrityConfig,
}

/// `[integrity]` table
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct IntegrityConfig {
    /// Relationship types audited (and fix groups repaired) at once
    pub concurrency: usize,
    /// Minimum metadata-lookup confidence before a cleanup links an artist
    pub lookup_confidence_threshold: f64,
    /// Catalog event bus capacity
    pub event_capacity: usize,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            lookup_confidence_threshold: 0.8,
            event_capacity: 1000,
        }
    }
}

impl TomlConfig {
    /// Parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Parse a config file, falling back to defaults with a warning
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

/// Locate the config file: `~/.config/jcat/config.toml`, then
/// `/etc/jcat/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("jcat").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/jcat/config.toml");
    if system_config.exists() {
        return Some(system_config);
    }

    None
}

/// OS-dependent default database location
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("jcat"))
        .unwrap_or_else(|| PathBuf::from("./jcat_data"))
        .join(DATABASE_FILE_NAME)
}

/// Resolved runtime settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub database: PathBuf,
    pub integrity: IntegrityConfig,
}

/// Database path resolver
#[derive(Debug, Clone)]
pub struct DatabaseResolver {
    env_var_name: String,
    config_path: Option<PathBuf>,
}

impl DatabaseResolver {
    /// Resolver using `JCAT_DATABASE` and the standard config file locations
    pub fn new() -> Self {
        Self {
            env_var_name: DATABASE_ENV_VAR.to_string(),
            config_path: config_file_path(),
        }
    }

    /// Read the database path from a different environment variable
    pub fn with_env_var(mut self, name: &str) -> Self {
        self.env_var_name = name.to_string();
        self
    }

    /// Use an explicit config file instead of the standard locations
    pub fn with_config_file(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    /// Resolve the database path following the priority order
    pub fn resolve(&self, cli_arg: Option<&Path>) -> PathBuf {
        self.resolve_with(cli_arg, &self.load_config())
    }

    /// Resolve the database path and the `[integrity]` settings together
    pub fn settings(&self, cli_arg: Option<&Path>) -> Settings {
        let config = self.load_config();
        Settings {
            database: self.resolve_with(cli_arg, &config),
            integrity: config.integrity,
        }
    }

    fn load_config(&self) -> TomlConfig {
        TomlConfig::load_or_default(self.config_path.as_deref())
    }

    fn resolve_with(&self, cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
        if let Some(path) = cli_arg {
            info!("Database from command line: {}", path.display());
            return path.to_path_buf();
        }

        if let Ok(path) = std::env::var(&self.env_var_name) {
            if !path.is_empty() {
                info!("Database from {}: {}", self.env_var_name, path);
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &config.database {
            info!("Database from config file: {}", path.display());
            return path.clone();
        }

        let path = default_database_path();
        info!("Database from compiled default: {}", path.display());
        path
    }
}

impl Default for DatabaseResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_database_file_name() {
        let path = default_database_path();
        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some(DATABASE_FILE_NAME));
    }

    #[test]
    fn test_integrity_defaults_apply_to_missing_keys() {
        let config: TomlConfig = toml::from_str("[integrity]\nconcurrency = 2\n").unwrap();
        assert_eq!(config.integrity.concurrency, 2);
        assert_eq!(config.integrity.lookup_confidence_threshold, 0.8);
        assert_eq!(config.integrity.event_capacity, 1000);
        assert!(config.database.is_none());
    }

    #[test]
    fn test_missing_config_file_falls_back() {
        let config = TomlConfig::load_or_default(Some(Path::new("/nonexistent/jcat/config.toml")));
        assert_eq!(config.integrity, IntegrityConfig::default());
    }
}
