//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::query::{QueryTarget, TemplateVariable, TemplateVariables};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub target: QueryTarget,

    /// Dashboard variables available to every query
    #[serde(default)]
    pub variables: Vec<TemplateVariable>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("tsquery").join("config.toml")),
            Some(PathBuf::from("/etc/tsquery/config.toml")),
            Some(PathBuf::from("./tsquery.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Template variables declared in the config
    pub fn template_variables(&self) -> TemplateVariables {
        self.variables.iter().cloned().collect()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // Target overrides
        if let Ok(database) = std::env::var("TSQUERY_DATABASE") {
            self.target.database = database;
        }
        if let Ok(table) = std::env::var("TSQUERY_TABLE") {
            self.target.table = table;
        }
        if let Ok(date_col) = std::env::var("TSQUERY_DATE_COL") {
            self.target.date_col = date_col;
        }
        if let Ok(date_time_col) = std::env::var("TSQUERY_DATE_TIME_COL") {
            self.target.date_time_col = date_time_col;
        }
        if let Ok(interval) = std::env::var("TSQUERY_INTERVAL") {
            self.target.interval = Some(interval);
        }

        // Logging overrides
        if let Ok(level) = std::env::var("TSQUERY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("TSQUERY_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# tsquery Configuration
#
# Environment variables override these settings:
# - TSQUERY_DATABASE
# - TSQUERY_TABLE
# - TSQUERY_DATE_COL
# - TSQUERY_DATE_TIME_COL
# - TSQUERY_INTERVAL
# - TSQUERY_LOG_LEVEL
# - TSQUERY_LOG_FORMAT

[target]
# Database and table behind $table
database = "default"
table = "requests"

# Column behind $timeCol (Date)
date_col = "EventDate"

# Column behind $dateTimeCol (DateTime)
date_time_col = "EventTime"

# Bucket interval; the request's automatic interval is used when unset
# interval = "1m"

# Multiplier applied to the bucket interval
interval_factor = 1

# Round the range start down to a multiple of this duration
# round = "1m"

# Example template variable
# [[variables]]
# name = "host"
# multi = true
# include_all = true
# options = [{ value = "$__all" }, { value = "web-1" }, { value = "web-2" }]
# current = ["web-1", "web-2"]

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::VariableValue;
    use std::io::Write;

    #[test]
    fn test_default_config_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.target.database, "default");
        assert_eq!(config.target.table, "requests");
        assert_eq!(config.target.date_col, "EventDate");
        assert_eq!(config.target.interval_factor, 1);
        assert!(config.target.interval.is_none());
        assert!(config.variables.is_empty());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[target]
database = "metrics"
table = "events"
interval = "5m"
round = "1m"

[[variables]]
name = "host"
multi = true
options = [{{ value = "a" }}, {{ value = "b" }}]
current = ["a", "b"]

[[variables]]
name = "event"
current = "login"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.target.qualified_table(), "metrics.events");
        assert_eq!(config.target.interval.as_deref(), Some("5m"));
        assert_eq!(config.target.round.as_deref(), Some("1m"));
        assert_eq!(config.target.date_time_col, "EventTime");
        assert_eq!(config.logging.format, "pretty");

        let variables = config.template_variables();
        assert_eq!(variables.len(), 2);
        let host = variables.get("host").unwrap();
        assert!(host.multi);
        assert_eq!(
            host.current,
            VariableValue::Multi(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(
            variables.get("event").unwrap().current,
            VariableValue::Single("login".to_string())
        );
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/tsquery.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_load_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[target\ntable = ").unwrap();
        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
