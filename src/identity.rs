//! Instrument identity: the equipment record a sensor is bound to.

use crate::params::Params;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::Duration;

/// Transport used to reach an instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Raw TCP socket (Omega iServer, terminal servers)
    Tcp,
    /// RS-232 / USB-serial port
    Serial,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Tcp => write!(f, "tcp"),
            Backend::Serial => write!(f, "serial"),
        }
    }
}

/// How to reach an instrument, plus its instrument-specific properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSpec {
    /// Transport backend
    pub backend: Backend,
    /// `host:port` for TCP, device path for serial (e.g. "/dev/ttyUSB0")
    pub address: String,
    /// Serial baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Per-query timeout
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Appended to every command
    #[serde(default = "default_write_termination")]
    pub write_termination: String,
    /// Marks the end of every response; must be ASCII
    #[serde(default = "default_read_termination", deserialize_with = "ascii_char")]
    pub read_termination: char,
    /// Instrument-specific properties (`nprobes`, `celsius`, `channels`, ...)
    #[serde(default)]
    pub properties: Params,
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_write_termination() -> String {
    "\r".to_string()
}

fn default_read_termination() -> char {
    '\r'
}

fn ascii_char<'de, D>(deserializer: D) -> Result<char, D::Error>
where
    D: Deserializer<'de>,
{
    let c = char::deserialize(deserializer)?;
    if c.is_ascii() {
        Ok(c)
    } else {
        Err(serde::de::Error::custom(format!(
            "read_termination must be an ASCII character, got {c:?}"
        )))
    }
}

impl ConnectionSpec {
    /// TCP connection with default timeout and `\r` termination
    pub fn tcp(address: impl Into<String>) -> Self {
        Self {
            backend: Backend::Tcp,
            address: address.into(),
            baud_rate: default_baud_rate(),
            timeout: default_timeout(),
            write_termination: default_write_termination(),
            read_termination: default_read_termination(),
            properties: Params::new(),
        }
    }

    /// Replace the instrument properties
    pub fn with_properties(mut self, properties: Params) -> Self {
        self.properties = properties;
        self
    }

    /// Host part of a TCP `host:port` address
    pub fn host(&self) -> &str {
        self.address
            .rsplit_once(':')
            .map_or(self.address.as_str(), |(host, _)| host)
    }
}

/// Identity of one instrument as recorded in the equipment register
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentRecord {
    /// Manufacturer name, e.g. "OMEGA"
    pub manufacturer: String,
    /// Model number, e.g. "iTHX-W3"
    pub model: String,
    /// Serial number; also names the instrument's store
    pub serial: String,
    /// Human-friendly name used in diagnostics
    #[serde(default)]
    pub alias: String,
    /// How to reach the instrument
    pub connection: ConnectionSpec,
}

impl EquipmentRecord {
    /// Name used in log lines and alert messages
    pub fn display_name(&self) -> &str {
        if self.alias.is_empty() {
            &self.serial
        } else {
            &self.alias
        }
    }

    /// Descriptive `(field, value)` pairs recorded once in the store's metadata table
    pub fn metadata(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("manufacturer".to_string(), self.manufacturer.clone()),
            ("model".to_string(), self.model.clone()),
            ("serial".to_string(), self.serial.clone()),
            ("alias".to_string(), self.alias.clone()),
            ("connection.backend".to_string(), self.connection.backend.to_string()),
            ("connection.address".to_string(), self.connection.address.clone()),
        ];
        for (key, value) in self.connection.properties.iter() {
            let value = match value {
                toml::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            pairs.push((format!("connection.properties.{key}"), value));
        }
        pairs
    }
}

impl fmt::Display for EquipmentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "manufacturer={:?}, model={:?}, serial={:?}",
            self.manufacturer, self.model, self.serial
        )
    }
}
