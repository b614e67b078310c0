//! Configuration management for docsnap
//!
//! This module handles loading, parsing, and managing configuration from various sources:
//! - Configuration files (TOML format)
//! - Environment variables
//! - Command-line arguments
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Environment variable overriding `store.uri`.
pub const ENV_URI: &str = "DOCSNAP_URI";
/// Environment variable overriding `store.database`.
pub const ENV_DATABASE: &str = "DOCSNAP_DATABASE";
/// Environment variable overriding `export.max_concurrency`.
pub const ENV_MAX_CONCURRENCY: &str = "DOCSNAP_MAX_CONCURRENCY";
/// Environment variable overriding `logging.level`.
pub const ENV_LOG_LEVEL: &str = "DOCSNAP_LOG_LEVEL";

/// Largest accepted indentation width.
const MAX_INDENT: usize = 16;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Store connection configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Traversal and output configuration
    #[serde(default)]
    pub export: ExportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Store connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// MongoDB connection URI
    #[serde(default = "default_uri")]
    pub uri: String,

    /// Database holding the collection tree
    #[serde(default = "default_database")]
    pub database: String,

    /// Connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

/// Traversal and output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Maximum number of export tasks working against the store at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Indent the JSON snapshot
    #[serde(default = "default_pretty")]
    pub pretty: bool,

    /// Spaces per indentation level
    #[serde(default = "default_indent")]
    pub indent: usize,

    /// Show a progress spinner on stderr
    #[serde(default)]
    pub progress: bool,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_database() -> String {
    "test".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_concurrency() -> usize {
    1000
}

fn default_pretty() -> bool {
    true
}

fn default_indent() -> usize {
    2
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            database: default_database(),
            timeout: default_timeout(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            pretty: default_pretty(),
            indent: default_indent(),
            progress: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Load configuration from file and environment
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |name| std::env::var(name).ok())
    }

    /// [`Config::load`] with environment variables read through `lookup`
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_from(lookup)?;
        Ok(config)
    }

    /// Apply `DOCSNAP_*` environment variables on top of this configuration
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides read through `lookup`, which maps a variable name to
    /// its value.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(uri) = lookup(ENV_URI) {
            self.store.uri = uri;
        }
        if let Some(database) = lookup(ENV_DATABASE) {
            self.store.database = database;
        }
        if let Some(value) = lookup(ENV_MAX_CONCURRENCY) {
            self.export.max_concurrency =
                value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    field: ENV_MAX_CONCURRENCY.to_string(),
                    value: value.clone(),
                })?;
        }
        if let Some(value) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = value.parse()?;
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".docsnap")
            .join("config.toml")
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Generic(e.to_string()).into())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.export.max_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "export.max_concurrency".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        if self.export.indent > MAX_INDENT {
            return Err(ConfigError::InvalidValue {
                field: "export.indent".to_string(),
                value: self.export.indent.to_string(),
            }
            .into());
        }
        if self.store.database.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "store.database".to_string(),
                value: self.store.database.clone(),
            }
            .into());
        }
        self.store.validate_uri()
    }
}

impl StoreConfig {
    /// Connect and server selection timeout
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Check the URI scheme
    pub fn validate_uri(&self) -> Result<()> {
        if self.uri.starts_with("mongodb://") || self.uri.starts_with("mongodb+srv://") {
            Ok(())
        } else {
            Err(ConfigError::InvalidValue {
                field: "store.uri".to_string(),
                value: self.uri.clone(),
            }
            .into())
        }
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(ConfigError::InvalidValue {
                field: "logging.level".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.store.uri, "mongodb://localhost:27017");
        assert_eq!(config.store.database, "test");
        assert_eq!(config.export.max_concurrency, 1000);
        assert!(config.export.pretty);
        assert_eq!(config.logging.level, LogLevel::Warn);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [export]
            max_concurrency = 8

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.export.max_concurrency, 8);
        assert_eq!(config.export.indent, 2);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.store, StoreConfig::default());
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let err = Config::from_toml("[export]\nmax_concurrency = \"many\"").unwrap_err();
        assert!(err.to_string().starts_with("Configuration error: Invalid config format"));
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = Config::default();
        config.store.database = "shop".to_string();
        let parsed = Config::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_env_overrides() {
        let env = HashMap::from([
            (ENV_URI, "mongodb+srv://cluster.example.net"),
            (ENV_DATABASE, "shop"),
            (ENV_MAX_CONCURRENCY, " 64 "),
            (ENV_LOG_LEVEL, "INFO"),
        ]);

        let mut config = Config::default();
        config
            .apply_env_from(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.store.uri, "mongodb+srv://cluster.example.net");
        assert_eq!(config.store.database, "shop");
        assert_eq!(config.export.max_concurrency, 64);
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_env_rejects_bad_numbers() {
        let mut config = Config::default();
        let result = config.apply_env_from(|name| {
            (name == ENV_MAX_CONCURRENCY).then(|| "lots".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.export.max_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.export.indent = 17;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.store.database = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.store.uri = "http://localhost".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = Config::load(Some(Path::new("/nonexistent/docsnap.toml"))).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_connection_timeout() {
        let config = Config::default();
        assert_eq!(config.store.connection_timeout(), Duration::from_secs(30));
    }
}
