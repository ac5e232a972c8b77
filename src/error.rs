//! Custom error types for the logger.
//!
//! This module defines the primary error type, `LoggerError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the different kinds of failures the polling loop can meet.
//!
//! ## Error Taxonomy
//!
//! `LoggerError` separates errors into two families:
//!
//! - **Transient instrument trouble** (`Connection`, `Timeout`, `MalformedResponse`):
//!   the instrument dropped the link or answered garbage. The controller retries these
//!   forever and never lets them terminate the process. See [`LoggerError::is_transient`].
//! - **Everything else**: contract violations (a reading with the wrong number of fields,
//!   an identity no driver matches, a malformed configuration value) and storage failures.
//!   These cross the outer fault boundary and stop the loop.
//!
//! Validation rejections are not errors at all; validators return `Ok(false)`.
//! Alert delivery failures (`Alert`) are produced by notifiers but always swallowed
//! by the validators that call them.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, LoggerError>;

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("No {kind} matching {query}")]
    NoMatch { kind: &'static str, query: String },

    #[error("Contract violation: {0}")]
    Contract(String),

    #[error("Instrument connection error: {0}")]
    Connection(String),

    #[error("Instrument did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Malformed instrument response: {0}")]
    MalformedResponse(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Cannot find store {}", .0.display())]
    StoreNotFound(PathBuf),

    #[error("Unknown column '{0}'")]
    UnknownColumn(String),

    #[error("Alert delivery failed: {0}")]
    Alert(String),

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl From<figment::Error> for LoggerError {
    fn from(err: figment::Error) -> Self {
        LoggerError::Config(Box::new(err))
    }
}

impl LoggerError {
    /// Whether the error is expected instrument trouble that the polling loop
    /// retries indefinitely.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LoggerError::Connection(_) | LoggerError::Timeout(_) | LoggerError::MalformedResponse(_)
        )
    }

    pub(crate) fn connection(context: &str, err: std::io::Error) -> Self {
        LoggerError::Connection(format!("{context}: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instrument_errors_are_transient() {
        assert!(LoggerError::Connection("reset by peer".into()).is_transient());
        assert!(LoggerError::Timeout(Duration::from_secs(5)).is_transient());
        assert!(LoggerError::MalformedResponse("?".into()).is_transient());
    }

    #[test]
    fn contract_and_storage_errors_are_fatal() {
        assert!(!LoggerError::Contract("3 != 6".into()).is_transient());
        assert!(!LoggerError::NoMatch {
            kind: "sensor",
            query: "ACME X1".into()
        }
        .is_transient());
        assert!(!LoggerError::StoreNotFound(PathBuf::from("missing.sqlite3")).is_transient());
        let sql = rusqlite::Error::InvalidQuery;
        assert!(!LoggerError::from(sql).is_transient());
    }

    #[test]
    fn no_match_names_the_query() {
        let err = LoggerError::NoMatch {
            kind: "validator",
            query: "'range-chequer'".into(),
        };
        assert_eq!(err.to_string(), "No validator matching 'range-chequer'");
    }
}
