//! Application configuration.
//!
//! An [`AppConfig`] can be built in code, read from a JSON file, and adjusted by `QUILL_*`
//! environment variables:
//!
//! | variable               | field           |
//! |------------------------|-----------------|
//! | `QUILL_ADDRESS`        | `address`       |
//! | `QUILL_MAX_BODY_SIZE`  | `max_body_size` |
//! | `QUILL_LOG_LEVEL`      | `log_level`     |

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::{fs, io};
use thiserror::Error;
use tracing::Level;

pub const ENV_ADDRESS: &str = "QUILL_ADDRESS";
pub const ENV_MAX_BODY_SIZE: &str = "QUILL_MAX_BODY_SIZE";
pub const ENV_LOG_LEVEL: &str = "QUILL_LOG_LEVEL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("read config file error: {0}")]
    Io(#[from] io::Error),

    #[error("parse config error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid max_body_size `{value}`, expected a positive number of bytes")]
    InvalidMaxBodySize { value: String },

    #[error("invalid log_level `{value}`: {source}")]
    InvalidLogLevel {
        value: String,
        #[source]
        source: <Level as FromStr>::Err,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// the address `listen_configured` binds to
    pub address: String,
    /// the largest request body accepted, in bytes
    pub max_body_size: usize,
    /// one of `trace`, `debug`, `info`, `warn`, `error`
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3030".to_owned(),
            max_body_size: quill_web::DEFAULT_MAX_BODY_SIZE,
            log_level: "info".to_owned(),
        }
    }
}

impl AppConfig {
    /// Parses a JSON document, missing fields keep their default
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    /// Applies the `QUILL_*` environment variables that are set
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides looked up by environment variable name
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(address) = lookup(ENV_ADDRESS) {
            self.address = address;
        }
        if let Some(max_body_size) = lookup(ENV_MAX_BODY_SIZE) {
            self.max_body_size = max_body_size
                .trim()
                .parse()
                .ok()
                .ok_or(ConfigError::InvalidMaxBodySize { value: max_body_size })?;
        }
        if let Some(log_level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = log_level;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn log_level(&self) -> Result<Level, ConfigError> {
        self.log_level
            .parse()
            .map_err(|source| ConfigError::InvalidLogLevel { value: self.log_level.clone(), source })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.log_level()?;
        if self.max_body_size == 0 {
            return Err(ConfigError::InvalidMaxBodySize { value: self.max_body_size.to_string() });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{AppConfig, ConfigError, ENV_LOG_LEVEL, ENV_MAX_BODY_SIZE};
    use std::collections::HashMap;
    use tracing::Level;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.address, "127.0.0.1:3030");
        assert_eq!(config.max_body_size, 2 * 1024 * 1024);
        assert_eq!(config.log_level().unwrap(), Level::INFO);
    }

    #[test]
    fn test_partial_json() {
        let config = AppConfig::from_json_str(r#"{"address": "0.0.0.0:8080"}"#).unwrap();

        assert_eq!(config.address, "0.0.0.0:8080");
        assert_eq!(config.max_body_size, AppConfig::default().max_body_size);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        assert!(matches!(AppConfig::from_json_str(r#"{"adress": "x"}"#), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env = HashMap::from([(ENV_MAX_BODY_SIZE, "1024"), (ENV_LOG_LEVEL, "debug")]);
        let config = AppConfig::default().apply_overrides(|key| env.get(key).map(|v| (*v).to_owned())).unwrap();

        assert_eq!(config.max_body_size, 1024);
        assert_eq!(config.log_level().unwrap(), Level::DEBUG);
        assert_eq!(config.address, "127.0.0.1:3030");
    }

    #[test]
    fn test_invalid_override() {
        let result = AppConfig::default().apply_overrides(|key| (key == ENV_MAX_BODY_SIZE).then(|| "lots".to_owned()));

        assert!(matches!(result, Err(ConfigError::InvalidMaxBodySize { value }) if value == "lots"));
    }

    #[test]
    fn test_zero_body_size() {
        assert!(matches!(
            AppConfig::from_json_str(r#"{"max_body_size": 0}"#),
            Err(ConfigError::InvalidMaxBodySize { .. })
        ));
    }

    #[test]
    fn test_invalid_log_level() {
        assert!(matches!(
            AppConfig::from_json_str(r#"{"log_level": "loud"}"#),
            Err(ConfigError::InvalidLogLevel { .. })
        ));
    }
}
