//! Mock Sensor
//!
//! Simulated instrument for dry runs and tests. No I/O is performed.
//!
//! Configured from an equipment record (`manufacturer = "Mock"`), it returns the
//! same reading every cycle:
//!
//! ```toml
//! [[equipment]]
//! manufacturer = "Mock"
//! model = "bench"
//! serial = "MOCK-1"
//! connection = { backend = "tcp", address = "localhost:0", properties = { fields = ["temperature", "humidity"], values = [21.0, 45.0] } }
//! ```
//!
//! Tests build it with [`MockSensor::scripted`] to replay a sequence of readings
//! and failures, and observe acquisitions, reconnects and resets through a
//! [`MockHandle`].

use super::{FieldSet, Reading, ResetOptions, Sensor};
use crate::error::{AppResult, LoggerError};
use crate::identity::EquipmentRecord;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One scripted acquisition outcome
#[derive(Debug)]
pub enum Step {
    /// Return these values
    Reading(Vec<f64>),
    /// Fail with this error
    Fail(LoggerError),
}

#[derive(Debug, Default)]
struct Counters {
    acquisitions: AtomicUsize,
    reconnects: AtomicUsize,
    resets: AtomicUsize,
    last_reset: Mutex<Option<ResetOptions>>,
}

/// Observes a [`MockSensor`] after it has been moved into a controller
#[derive(Debug, Clone, Default)]
pub struct MockHandle(Arc<Counters>);

impl MockHandle {
    /// Completed `acquire` calls, successful or not
    pub fn acquisitions(&self) -> usize {
        self.0.acquisitions.load(Ordering::SeqCst)
    }

    /// `reconnect` calls
    pub fn reconnects(&self) -> usize {
        self.0.reconnects.load(Ordering::SeqCst)
    }

    /// `reset` calls
    pub fn resets(&self) -> usize {
        self.0.resets.load(Ordering::SeqCst)
    }

    /// Options passed to the most recent `reset`
    pub fn last_reset(&self) -> Option<ResetOptions> {
        self.0.last_reset.lock().ok().and_then(|guard| guard.clone())
    }
}

/// Simulated sensor
pub struct MockSensor {
    record: EquipmentRecord,
    fields: FieldSet,
    script: VecDeque<Step>,
    steady: Option<Vec<f64>>,
    fail_resets: bool,
    handle: MockHandle,
}

impl MockSensor {
    /// Steady-state sensor from the record's `fields` and `values` properties.
    ///
    /// `fields` defaults to a single `value` field and `values` to zeros.
    pub fn from_record(record: EquipmentRecord) -> AppResult<Self> {
        let props = &record.connection.properties;
        let names = props
            .str_list("fields")?
            .unwrap_or_else(|| vec!["value".to_string()]);
        let values = props
            .f64_list("values")?
            .unwrap_or_else(|| vec![0.0; names.len()]);
        if values.len() != names.len() {
            return Err(LoggerError::Configuration(format!(
                "mock sensor {} declares {} fields but {} values",
                record.serial,
                names.len(),
                values.len()
            )));
        }

        Ok(Self {
            record,
            fields: FieldSet::floats(names),
            script: VecDeque::new(),
            steady: Some(values),
            fail_resets: false,
            handle: MockHandle::default(),
        })
    }

    /// Sensor that replays `steps` in order.
    ///
    /// Once the script is exhausted every `acquire` fails with a non-transient
    /// error, which stops a polling loop.
    pub fn scripted(
        record: EquipmentRecord,
        fields: FieldSet,
        steps: impl IntoIterator<Item = Step>,
    ) -> Self {
        Self {
            record,
            fields,
            script: steps.into_iter().collect(),
            steady: None,
            fail_resets: false,
            handle: MockHandle::default(),
        }
    }

    /// Make every `reset` fail with a connection error
    pub fn with_failing_reset(mut self) -> Self {
        self.fail_resets = true;
        self
    }

    /// Counter handle shared with this sensor
    pub fn handle(&self) -> MockHandle {
        self.handle.clone()
    }
}

#[async_trait]
impl Sensor for MockSensor {
    fn record(&self) -> &EquipmentRecord {
        &self.record
    }

    fn fields(&self) -> &FieldSet {
        &self.fields
    }

    async fn acquire(&mut self) -> AppResult<Reading> {
        self.handle.0.acquisitions.fetch_add(1, Ordering::SeqCst);
        match self.script.pop_front() {
            Some(Step::Reading(values)) => Ok(Reading::new(values)),
            Some(Step::Fail(err)) => Err(err),
            None => match &self.steady {
                Some(values) => Ok(Reading::new(values.clone())),
                None => Err(LoggerError::Unsupported("mock script exhausted".to_string())),
            },
        }
    }

    async fn reconnect(&mut self) -> AppResult<()> {
        self.handle.0.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reset(&mut self, options: &ResetOptions) -> AppResult<()> {
        self.handle.0.resets.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.handle.0.last_reset.lock() {
            *last = Some(options.clone());
        }
        if self.fail_resets {
            return Err(LoggerError::Connection("mock control port refused".to_string()));
        }
        Ok(())
    }
}
