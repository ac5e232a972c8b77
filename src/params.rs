//! Free-form key/value parameters.
//!
//! Validator declarations and instrument connection properties both carry an open
//! set of attributes. Values may arrive as TOML numbers or as strings (`tmax = "40"`),
//! so every typed accessor accepts both. A value that is present but cannot be
//! interpreted is a configuration error; a missing key yields the documented default.

use crate::error::{AppResult, LoggerError};
use serde::{Deserialize, Serialize};
use toml::Value;

/// A bag of named parameters with typed, defaulting accessors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(toml::Table);

impl Params {
    /// Create an empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly useful in tests
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Raw access to a value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether `key` is present
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Iterate over all entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Floating point value, or `default` when absent
    pub fn f64_or(&self, key: &str, default: f64) -> AppResult<f64> {
        match self.0.get(key) {
            None => Ok(default),
            Some(Value::Float(v)) => Ok(*v),
            Some(Value::Integer(v)) => Ok(*v as f64),
            Some(Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| invalid(key, "a number", &Value::String(s.clone()))),
            Some(other) => Err(invalid(key, "a number", other)),
        }
    }

    /// Non-negative integer value, or `default` when absent
    pub fn u32_or(&self, key: &str, default: u32) -> AppResult<u32> {
        match self.0.get(key) {
            None => Ok(default),
            Some(Value::Integer(v)) => {
                u32::try_from(*v).map_err(|_| invalid(key, "a non-negative integer", &Value::Integer(*v)))
            }
            Some(Value::String(s)) => s
                .trim()
                .parse::<u32>()
                .map_err(|_| invalid(key, "a non-negative integer", &Value::String(s.clone()))),
            Some(other) => Err(invalid(key, "a non-negative integer", other)),
        }
    }

    /// Boolean value, or `default` when absent
    pub fn bool_or(&self, key: &str, default: bool) -> AppResult<bool> {
        match self.0.get(key) {
            None => Ok(default),
            Some(Value::Boolean(b)) => Ok(*b),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(true),
                "false" | "no" | "0" => Ok(false),
                _ => Err(invalid(key, "a boolean", &Value::String(s.clone()))),
            },
            Some(other) => Err(invalid(key, "a boolean", other)),
        }
    }

    /// List of strings; a single string is treated as a one-element list
    pub fn str_list(&self, key: &str) -> AppResult<Option<Vec<String>>> {
        match self.0.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(vec![s.clone()])),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(invalid(key, "a list of strings", other)),
                })
                .collect::<AppResult<Vec<_>>>()
                .map(Some),
            Some(other) => Err(invalid(key, "a list of strings", other)),
        }
    }

    /// List of numbers; a single number is a one-element list
    pub fn f64_list(&self, key: &str) -> AppResult<Option<Vec<f64>>> {
        let items = match self.0.get(key) {
            None => return Ok(None),
            Some(Value::Array(items)) => items.clone(),
            Some(single) => vec![single.clone()],
        };
        items
            .iter()
            .map(|item| match item {
                Value::Float(v) => Ok(*v),
                Value::Integer(v) => Ok(*v as f64),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| invalid(key, "a list of numbers", item)),
                other => Err(invalid(key, "a list of numbers", other)),
            })
            .collect::<AppResult<Vec<_>>>()
            .map(Some)
    }

    /// List of non-negative integers; a single integer is a one-element list
    pub fn u32_list(&self, key: &str) -> AppResult<Option<Vec<u32>>> {
        let items = match self.0.get(key) {
            None => return Ok(None),
            Some(Value::Array(items)) => items.clone(),
            Some(single) => vec![single.clone()],
        };
        items
            .iter()
            .map(|item| match item {
                Value::Integer(v) => {
                    u32::try_from(*v).map_err(|_| invalid(key, "a list of channel numbers", item))
                }
                Value::String(s) => s
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| invalid(key, "a list of channel numbers", item)),
                other => Err(invalid(key, "a list of channel numbers", other)),
            })
            .collect::<AppResult<Vec<_>>>()
            .map(Some)
    }
}

impl From<toml::Table> for Params {
    fn from(table: toml::Table) -> Self {
        Self(table)
    }
}

fn invalid(key: &str, expected: &str, value: &Value) -> LoggerError {
    LoggerError::Configuration(format!("parameter '{key}' must be {expected}, got {value}"))
}
