//! # Lab Logger Core Library
//!
//! Unattended logging of laboratory instruments: poll one instrument, check each
//! reading against acceptance policies and append the accepted readings to a
//! per-instrument SQLite store.
//!
//! ## Crate Structure
//!
//! - **`registry`**: ordered pattern → constructor tables used to pick a sensor driver
//!   for an equipment record and validators by name.
//! - **`sensors`**: the `Sensor` trait and the built-in drivers (OMEGA iTHX, Vaisala
//!   PTU300, IsoTech milliK, a scripted mock).
//! - **`validators`**: the `Validator` trait, range policies and the escalating
//!   (reset, email) wrappers.
//! - **`controller`**: the acquire → validate → persist → sleep loop.
//! - **`storage`**: the append-only store and its stateless read path.
//! - **`transport`**: line-oriented TCP/serial connections used by the drivers.
//! - **`alert`**: operator notification (SMTP behind the `email` feature).
//! - **`config`**, **`logging`**, **`error`**, **`params`**, **`identity`**: the ambient
//!   configuration, tracing setup, error type and shared data types.
//! - **`app`**: startup wiring from configuration to a running controller.

pub mod alert;
pub mod app;
pub mod config;
pub mod controller;
pub mod error;
pub mod identity;
pub mod logging;
pub mod params;
pub mod registry;
pub mod sensors;
pub mod storage;
pub mod transport;
pub mod validators;

pub use error::{AppResult, LoggerError};
