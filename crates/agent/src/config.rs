//! Configuration management for the AgentWire agent.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/agentwire/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("ping_timeout must be between 1 and 3600 seconds, got {0}")]
    InvalidPingTimeout(u64),

    #[error("sweep_interval must be between 1 and 3600 seconds, got {0}")]
    InvalidSweepInterval(u64),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General agent configuration.
    pub agent: AgentConfig,

    /// Trust-ping behavior.
    pub ping: PingConfig,
}

/// General agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Directory for storing agent data (keys, peer directory).
    pub data_dir: PathBuf,

    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// Trust-ping configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PingConfig {
    /// Default timeout in seconds for pending pings.
    pub ping_timeout: u64,

    /// Interval in seconds between expiry sweeps of the pending table.
    pub sweep_interval: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            ping_timeout: 30,
            sweep_interval: 5,
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agentwire")
        .join("config.toml")
}

/// Returns the default data directory path.
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agentwire")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - AGENTWIRE_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("AGENTWIRE_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.agent.log_level = level;
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate ping_timeout: 1-3600
        if self.ping.ping_timeout < 1 || self.ping.ping_timeout > 3600 {
            return Err(ConfigError::InvalidPingTimeout(self.ping.ping_timeout));
        }

        // Validate sweep_interval: 1-3600
        if self.ping.sweep_interval < 1 || self.ping.sweep_interval > 3600 {
            return Err(ConfigError::InvalidSweepInterval(self.ping.sweep_interval));
        }

        // Validate log_level is a known value
        let level = self.agent.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.agent.log_level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    ///
    /// The default path is `~/.config/agentwire/config.toml`.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }

    /// Default ping timeout as a [`std::time::Duration`].
    pub fn ping_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.ping.ping_timeout)
    }

    /// Sweep interval as a [`std::time::Duration`].
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.ping.sweep_interval)
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.agent.log_level, "info");
        assert_eq!(config.ping.ping_timeout, 30);
        assert_eq!(config.ping.sweep_interval, 5);
        assert!(config
            .agent
            .data_dir
            .to_string_lossy()
            .contains("agentwire"));
    }

    #[test]
    fn test_from_toml_empty() {
        // Empty TOML should use all defaults
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[agent]
log_level = "debug"

[ping]
ping_timeout = 5
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.agent.log_level, "debug");
        assert_eq!(config.ping.ping_timeout, 5);
        // Other values should be defaults
        assert_eq!(config.ping.sweep_interval, 5);
    }

    #[test]
    fn test_from_toml_full() {
        let toml = r#"
[agent]
data_dir = "/custom/data"
log_level = "trace"

[ping]
ping_timeout = 120
sweep_interval = 10
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.agent.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.agent.log_level, "trace");
        assert_eq!(config.ping.ping_timeout, 120);
        assert_eq!(config.ping.sweep_interval, 10);
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let toml = r#"
[agent
log_level = "debug"
"#;
        let result = Config::from_toml(toml);
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Invalid TOML"));
    }

    #[test]
    fn test_from_toml_wrong_type() {
        let toml = r#"
[ping]
ping_timeout = "not a number"
"#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_roundtrip() {
        let mut original = Config::default();
        original.agent.log_level = "warn".to_string();
        original.ping.ping_timeout = 42;

        let toml = original.to_toml().unwrap();
        let loaded = Config::from_toml(&toml).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_missing_file() {
        let config = Config::load("/nonexistent/path/config.toml").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let mut original = Config::default();
        original.agent.log_level = "debug".to_string();
        original.ping.ping_timeout = 15;

        original.save(&config_path).unwrap();
        let loaded = Config::load(&config_path).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_save_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir
            .path()
            .join("nested")
            .join("dirs")
            .join("config.toml");

        Config::default().save(&config_path).unwrap();
        assert!(config_path.exists());
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        fs::write(&config_path, "invalid [ toml").unwrap();

        let result = Config::load(&config_path);
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Failed to parse config file"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.to_string_lossy().contains("agentwire"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_validate_default_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_ping_timeout_zero() {
        let mut config = Config::default();
        config.ping.ping_timeout = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidPingTimeout(0)));
    }

    #[test]
    fn test_validate_ping_timeout_too_high() {
        let mut config = Config::default();
        config.ping.ping_timeout = 3601;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidPingTimeout(3601))
        );
    }

    #[test]
    fn test_validate_sweep_interval_zero() {
        let mut config = Config::default();
        config.ping.sweep_interval = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidSweepInterval(0))
        );
    }

    #[test]
    fn test_validate_boundary_values() {
        let mut config = Config::default();

        config.ping.ping_timeout = 1;
        assert!(config.validate().is_ok());

        config.ping.ping_timeout = 3600;
        assert!(config.validate().is_ok());

        config.ping.sweep_interval = 3600;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_log_level_values() {
        let mut config = Config::default();
        for level in ["trace", "debug", "info", "warn", "error", "DEBUG", "Info"] {
            config.agent.log_level = level.to_string();
            assert!(config.validate().is_ok(), "level {level} should validate");
        }
    }

    #[test]
    fn test_validate_log_level_invalid() {
        let mut config = Config::default();
        config.agent.log_level = "verbose".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("verbose".to_string()))
        );
    }

    #[test]
    fn test_duration_accessors() {
        let config = Config::default();
        assert_eq!(config.ping_timeout(), std::time::Duration::from_secs(30));
        assert_eq!(config.sweep_interval(), std::time::Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn test_env_override_log_level() {
        std::env::set_var("AGENTWIRE_LOG_LEVEL", "debug");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.agent.log_level, "debug");

        std::env::remove_var("AGENTWIRE_LOG_LEVEL");
    }

    #[test]
    #[serial]
    fn test_env_override_empty_does_not_override() {
        std::env::set_var("AGENTWIRE_LOG_LEVEL", "");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.agent.log_level, "info");

        std::env::remove_var("AGENTWIRE_LOG_LEVEL");
    }

    #[test]
    #[serial]
    fn test_env_override_unset_does_not_override() {
        std::env::remove_var("AGENTWIRE_LOG_LEVEL");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.agent.log_level, "info");
    }
}
