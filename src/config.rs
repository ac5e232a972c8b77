//! Configuration using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (base configuration)
//! 2. environment variables prefixed with `LAB_LOGGER_`, sections separated by
//!    `__` (e.g. `LAB_LOGGER_POLLING__INTERVAL=30s`)
//!
//! ```toml
//! [logging]
//! level = "info"
//! format = "compact"
//!
//! [storage]
//! log_dir = "/var/lib/lab-logger"
//! db_timeout = "10s"
//!
//! [polling]
//! interval = "60s"
//!
//! [[validators]]
//! name = "ithx-with-reset"
//! reset_criterion = 3
//! tmax = "40"
//!
//! [[equipment]]
//! manufacturer = "OMEGA"
//! model = "iTHX-W3"
//! serial = "12345"
//! alias = "Lab 2"
//! connection = { backend = "tcp", address = "192.168.1.100:2000" }
//! ```

use crate::error::{AppResult, LoggerError};
use crate::identity::EquipmentRecord;
use crate::params::Params;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "LAB_LOGGER_";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Where readings are stored
    pub storage: StorageConfig,
    /// Polling cadence
    #[serde(default)]
    pub polling: PollingConfig,
    /// Validators applied in order to every reading
    #[serde(default)]
    pub validators: Vec<ValidatorDeclaration>,
    /// Mail relay for alerting validators; alerts are dropped when absent
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
    /// Equipment register
    #[serde(default)]
    pub equipment: Vec<EquipmentRecord>,
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

/// Log line format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, coloured
    Pretty,
    /// Single line, no colour
    #[default]
    Compact,
    /// One JSON object per line
    Json,
}

/// Store settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one store per instrument serial
    pub log_dir: PathBuf,
    /// How long a write waits for a locked store
    #[serde(default = "default_db_timeout", with = "humantime_serde")]
    pub db_timeout: Duration,
}

/// Polling settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Target period of one acquisition cycle
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,
}

/// One `[[validators]]` entry: a registered name plus free-form parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorDeclaration {
    /// Registered validator name, e.g. "ithx-range-checker"
    pub name: String,
    /// Everything else in the entry
    #[serde(flatten)]
    pub params: Params,
}

/// SMTP relay settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Relay host name
    pub host: String,
    /// Relay port; the TLS default when absent
    #[serde(default)]
    pub port: Option<u16>,
    /// Use TLS to reach the relay
    #[serde(default = "default_tls")]
    pub tls: bool,
    /// Sender address
    pub from: String,
    /// Recipient addresses
    pub recipients: Vec<String>,
    /// Login name, if the relay requires authentication
    #[serde(default)]
    pub username: Option<String>,
    /// Login password
    #[serde(default)]
    pub password: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_db_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_tls() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
        }
    }
}

/// Valid values of `logging.level`
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl LoggerConfig {
    /// Load configuration from `path` merged with `LAB_LOGGER_` environment variables
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(LoggerError::Configuration(format!(
                "configuration file {} does not exist",
                path.display()
            )));
        }
        Self::figment(Toml::file(path)).extract().map_err(LoggerError::from)
    }

    /// Parse configuration from TOML text merged with the environment
    pub fn from_toml_str(text: &str) -> AppResult<Self> {
        Self::figment(Toml::string(text)).extract().map_err(LoggerError::from)
    }

    fn figment(base: figment::providers::Data<Toml>) -> Figment {
        Figment::new()
            .merge(base)
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let level = self.logging.level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(LoggerError::Configuration(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }

        if self.polling.interval.is_zero() {
            return Err(LoggerError::Configuration(
                "polling.interval must be greater than zero".to_string(),
            ));
        }

        for (i, declaration) in self.validators.iter().enumerate() {
            if declaration.name.trim().is_empty() {
                return Err(LoggerError::Configuration(format!(
                    "validator #{} has an empty name",
                    i + 1
                )));
            }
        }

        let mut serials = HashSet::new();
        for record in &self.equipment {
            if !serials.insert(record.serial.as_str()) {
                return Err(LoggerError::Configuration(format!(
                    "Duplicate equipment serial: {}",
                    record.serial
                )));
            }
        }

        Ok(())
    }

    /// Equipment record with the given serial number
    ///
    /// # Errors
    /// `NoMatch` if the register has no such serial
    pub fn record(&self, serial: &str) -> AppResult<&EquipmentRecord> {
        self.equipment
            .iter()
            .find(|r| r.serial == serial)
            .ok_or_else(|| LoggerError::NoMatch {
                kind: "equipment record",
                query: format!("serial {serial:?}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Backend;

    const SAMPLE: &str = r#"
        [storage]
        log_dir = "data"

        [[validators]]
        name = "ithx-with-reset"
        reset_criterion = 3
        tmax = "40"

        [[validators]]
        name = "send-email"

        [[equipment]]
        manufacturer = "OMEGA"
        model = "iTHX-W3"
        serial = "12345"
        alias = "Lab 2"
        connection = { backend = "tcp", address = "192.168.1.100:2000", timeout = "5s", properties = { nprobes = 2 } }
    "#;

    #[test]
    fn defaults_are_applied() {
        let config = LoggerConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.polling.interval, Duration::from_secs(60));
        assert_eq!(config.storage.db_timeout, Duration::from_secs(10));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert!(config.smtp.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validator_parameters_are_collected() {
        let config = LoggerConfig::from_toml_str(SAMPLE).unwrap();
        let names: Vec<_> = config.validators.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["ithx-with-reset", "send-email"]);

        let params = &config.validators[0].params;
        assert_eq!(params.u32_or("reset_criterion", 5).unwrap(), 3);
        assert_eq!(params.f64_or("tmax", 30.0).unwrap(), 40.0);
        assert!(!params.contains("name"));
    }

    #[test]
    fn record_lookup_by_serial() {
        let config = LoggerConfig::from_toml_str(SAMPLE).unwrap();
        let record = config.record("12345").unwrap();
        assert_eq!(record.connection.backend, Backend::Tcp);
        assert_eq!(record.connection.timeout, Duration::from_secs(5));
        assert_eq!(record.connection.properties.u32_or("nprobes", 1).unwrap(), 2);

        let err = config.record("99999").unwrap_err();
        assert!(matches!(err, LoggerError::NoMatch { .. }));
    }

    #[test]
    fn invalid_log_level() {
        let mut config = LoggerConfig::from_toml_str(SAMPLE).unwrap();
        config.logging.level = "verbose".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut config = LoggerConfig::from_toml_str(SAMPLE).unwrap();
        config.polling.interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_serials_are_rejected() {
        let mut config = LoggerConfig::from_toml_str(SAMPLE).unwrap();
        let twin = config.equipment[0].clone();
        config.equipment.push(twin);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate equipment serial: 12345"));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = LoggerConfig::load_from("/nonexistent/lab-logger.toml").unwrap_err();
        assert!(matches!(err, LoggerError::Configuration(_)));
    }
}
