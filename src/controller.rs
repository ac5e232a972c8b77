//! Polling controller
//!
//! Drives one instrument through the cycle
//!
//! ```text
//! ACQUIRING ──> VALIDATING ──> PERSISTING ──> SLEEPING ──> ACQUIRING ...
//!     ^  │              │                        ^
//!     └──┘ transient    └── rejected ────────────┘
//! ```
//!
//! - Transient acquisition errors are logged, followed by a reconnect, and the
//!   read is retried immediately. The loop never gives up on a flaky instrument.
//! - The timestamp is taken once a reading is in hand.
//! - Validators run in order; the first rejection skips persistence.
//! - The sleep compensates for the time the cycle took, so the period stays
//!   close to the configured interval.
//!
//! Anything else (contract violations, storage failures) ends [`Controller::run`].

use crate::error::{AppResult, LoggerError};
use crate::sensors::{Reading, Sensor};
use crate::storage::{self, Storage};
use crate::validators::Validator;
use chrono::NaiveDateTime;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Result of one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every validator accepted and the reading was written
    Stored {
        /// Time the reading was taken
        timestamp: NaiveDateTime,
    },
    /// A validator rejected the reading; nothing was written
    Rejected {
        /// Name of the rejecting validator
        validator: String,
    },
}

/// Counters since the controller was built
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Completed cycles
    pub cycles: u64,
    /// Readings written
    pub stored: u64,
    /// Readings discarded by a validator
    pub rejected: u64,
    /// Transient acquisition failures that were retried
    pub acquisition_failures: u64,
}

/// Time left to sleep so that a cycle lasts `interval`; zero if the cycle overran
pub fn sleep_duration(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

/// Acquire / validate / persist loop for one instrument
pub struct Controller {
    sensor: Box<dyn Sensor>,
    validators: Vec<Box<dyn Validator>>,
    storage: Storage,
    interval: Duration,
    stats: CycleStats,
}

impl Controller {
    /// Assemble a controller. `storage` must have been opened for `sensor`'s fields.
    pub fn new(
        sensor: Box<dyn Sensor>,
        validators: Vec<Box<dyn Validator>>,
        storage: Storage,
        interval: Duration,
    ) -> AppResult<Self> {
        if storage.fields() != sensor.fields() {
            return Err(LoggerError::Contract(format!(
                "store {} was opened for different fields than {} produces",
                storage.path().display(),
                sensor.record().display_name()
            )));
        }
        Ok(Self {
            sensor,
            validators,
            storage,
            interval,
            stats: CycleStats::default(),
        })
    }

    /// Counters so far
    pub fn stats(&self) -> CycleStats {
        self.stats
    }

    /// The store readings are written to
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Read until the sensor produces a reading, reconnecting after transient failures
    async fn acquire(&mut self) -> AppResult<Reading> {
        let instrument = self.sensor.record().display_name().to_string();
        loop {
            match self.sensor.acquire().await {
                Ok(reading) => {
                    let expected = self.sensor.fields().len();
                    if reading.len() != expected {
                        return Err(LoggerError::Contract(format!(
                            "{instrument} returned {} values for {expected} fields",
                            reading.len()
                        )));
                    }
                    return Ok(reading);
                }
                Err(e) if e.is_transient() => {
                    self.stats.acquisition_failures += 1;
                    warn!(instrument = %instrument, error = %e, "Acquisition failed, reconnecting");
                    match self.sensor.reconnect().await {
                        Ok(()) => debug!(instrument = %instrument, "reconnected"),
                        Err(e) if e.is_transient() => {
                            warn!(instrument = %instrument, error = %e, "Reconnect failed")
                        }
                        Err(e) => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run one acquire → validate → persist step, without the trailing sleep
    pub async fn cycle(&mut self) -> AppResult<CycleOutcome> {
        let reading = self.acquire().await?;
        let timestamp = storage::now();
        self.stats.cycles += 1;

        for validator in &mut self.validators {
            if !validator.validate(&reading, self.sensor.as_mut()).await? {
                self.stats.rejected += 1;
                debug!(validator = validator.name(), %reading, "reading rejected");
                return Ok(CycleOutcome::Rejected {
                    validator: validator.name().to_string(),
                });
            }
        }

        self.storage.write(&timestamp, &reading)?;
        self.stats.stored += 1;
        debug!(%reading, timestamp = %storage::format_timestamp(&timestamp), "reading stored");
        Ok(CycleOutcome::Stored { timestamp })
    }

    /// Poll until a non-transient error occurs
    pub async fn run(&mut self) -> AppResult<()> {
        info!(
            instrument = %self.sensor.record().display_name(),
            interval = ?self.interval,
            validators = self.validators.len(),
            "polling started"
        );
        loop {
            let started = Instant::now();
            if let Err(e) = self.cycle().await {
                let stats = self.stats;
                info!(
                    cycles = stats.cycles,
                    stored = stats.stored,
                    rejected = stats.rejected,
                    acquisition_failures = stats.acquisition_failures,
                    "polling stopped"
                );
                return Err(e);
            }
            tokio::time::sleep(sleep_duration(self.interval, started.elapsed())).await;
        }
    }
}
