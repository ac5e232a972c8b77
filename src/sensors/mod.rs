//! Sensor abstraction and the built-in instrument drivers.
//!
//! A [`Sensor`] is bound to one [`EquipmentRecord`] for the lifetime of the process.
//! It declares an ordered [`FieldSet`] derived from its configuration and produces
//! [`Reading`]s whose values line up 1:1 with those fields.
//!
//! # Contract
//!
//! - `acquire` performs one instrument read. Connection loss, timeouts and garbled
//!   replies are reported as transient errors; the controller retries them.
//! - `fields` is pure and never changes after construction.
//! - `reconnect` re-establishes the transport. Identity is never rebuilt.
//! - `reset` issues an instrument reset. Callers rate-limit it; drivers don't.
//!
//! Constructors perform no I/O. Drivers connect lazily on the first `acquire`,
//! so building the sensor at startup cannot fail because an instrument is offline.
//!
//! # Registered drivers
//!
//! | Manufacturer | Model | Driver |
//! |---|---|---|
//! | `OMEGA` | `iTHX-[2DMSW][3D]?` | [`ithx::Ithx`] |
//! | `Vaisala` | `PTU300` | [`ptu300::Ptu300`] |
//! | `IsoTech` | `milliK` | [`millik::MilliK`] |
//! | `Mock` | any | [`mock::MockSensor`] |

pub mod ithx;
pub mod millik;
pub mod mock;
pub mod ptu300;

use crate::error::{AppResult, LoggerError};
use crate::identity::EquipmentRecord;
use crate::registry::{IdentityPattern, Registry};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// Semantic value type of a field; decides the storage column type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// 64-bit floating point
    Float,
}

impl FieldType {
    /// SQL column type
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldType::Float => "REAL",
        }
    }
}

/// One named field of a sensor's output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Column name
    pub name: String,
    /// Value type
    pub kind: FieldType,
}

/// Ordered, fixed set of fields a sensor produces
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet(Vec<Field>);

impl FieldSet {
    /// Float fields with the given names, in order
    pub fn floats<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            names
                .into_iter()
                .map(|name| Field {
                    name: name.into(),
                    kind: FieldType::Float,
                })
                .collect(),
        )
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fields in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.0.iter()
    }

    /// Field names in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|f| f.name.as_str())
    }
}

/// One acquisition: values in the sensor's field order
#[derive(Debug, Clone, PartialEq)]
pub struct Reading(Vec<f64>);

impl Reading {
    /// Wrap acquired values
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    /// Values in field order
    pub fn values(&self) -> &[f64] {
        &self.0
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the reading holds no values
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<f64>> for Reading {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, ")")
    }
}

/// Parameters of an instrument reset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetOptions {
    /// Block until the instrument answers again
    pub wait: bool,
    /// Control-port password, if the instrument requires one
    pub password: Option<String>,
    /// Control port the reset command is sent to
    pub port: u16,
    /// Upper bound on the whole reset, including the wait
    pub timeout: Duration,
}

impl Default for ResetOptions {
    /// Omega iServer control port settings
    fn default() -> Self {
        Self {
            wait: true,
            password: None,
            port: 2002,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Capability contract every instrument driver satisfies
#[async_trait]
pub trait Sensor: Send {
    /// The instrument this sensor is bound to
    fn record(&self) -> &EquipmentRecord;

    /// Ordered output fields; stable for the process lifetime
    fn fields(&self) -> &FieldSet;

    /// Perform one read
    async fn acquire(&mut self) -> AppResult<Reading>;

    /// Drop and re-establish the transport connection
    async fn reconnect(&mut self) -> AppResult<()>;

    /// Reset the instrument
    ///
    /// # Default Implementation
    /// Returns `Unsupported`.
    async fn reset(&mut self, _options: &ResetOptions) -> AppResult<()> {
        Err(LoggerError::Unsupported(format!(
            "{} {} cannot be reset",
            self.record().manufacturer,
            self.record().model
        )))
    }
}

/// Registry of sensor drivers keyed on manufacturer/model
pub type SensorRegistry = Registry<EquipmentRecord, (), Box<dyn Sensor>>;

/// Build the registry of built-in drivers, in precedence order
pub fn builtin_registry() -> AppResult<SensorRegistry> {
    let mut registry = SensorRegistry::new("sensor");

    registry.register(
        IdentityPattern::builder()
            .manufacturer("OMEGA")
            .model(r"iTHX-[2DMSW][3D]?")
            .build()?,
        |record, _| Ok(Box::new(ithx::Ithx::new(record.clone())?) as Box<dyn Sensor>),
    );

    registry.register(
        IdentityPattern::builder()
            .manufacturer("Vaisala")
            .model("PTU300")
            .build()?,
        |record, _| Ok(Box::new(ptu300::Ptu300::new(record.clone())?) as Box<dyn Sensor>),
    );

    registry.register(
        IdentityPattern::builder()
            .manufacturer("IsoTech")
            .model("milliK")
            .build()?,
        |record, _| Ok(Box::new(millik::MilliK::new(record.clone())?) as Box<dyn Sensor>),
    );

    registry.register(
        IdentityPattern::builder().manufacturer("^Mock$").build()?,
        |record, _| Ok(Box::new(mock::MockSensor::from_record(record.clone())?) as Box<dyn Sensor>),
    );

    Ok(registry)
}

/// Parse a numeric instrument reply
pub(crate) fn parse_value(response: &str, what: &str) -> AppResult<f64> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Err(LoggerError::MalformedResponse(format!("empty {what} response")));
    }
    trimmed
        .parse::<f64>()
        .map_err(|_| LoggerError::MalformedResponse(format!("{what}: '{trimmed}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ConnectionSpec;
    use crate::params::Params;

    fn record(manufacturer: &str, model: &str, properties: Params) -> EquipmentRecord {
        EquipmentRecord {
            manufacturer: manufacturer.into(),
            model: model.into(),
            serial: "SN1".into(),
            alias: String::new(),
            connection: ConnectionSpec::tcp("127.0.0.1:2000").with_properties(properties),
        }
    }

    #[test]
    fn builtin_registry_selects_drivers_by_identity() {
        let registry = builtin_registry().unwrap();

        let ithx = registry
            .resolve(&record("OMEGA", "iTHX-W3", Params::new()), &())
            .unwrap();
        assert_eq!(
            ithx.fields().names().collect::<Vec<_>>(),
            ["temperature", "humidity", "dewpoint"]
        );

        let two_probe = registry
            .resolve(&record("omega", "iTHX-SD", Params::new().with("nprobes", 2_i64)), &())
            .unwrap();
        assert_eq!(two_probe.fields().len(), 6);

        let millik = registry
            .resolve(
                &record("IsoTech", "milliK", Params::new().with("channels", vec![1_i64, 3])),
                &(),
            )
            .unwrap();
        assert_eq!(
            millik.fields().names().collect::<Vec<_>>(),
            ["channel1", "channel3"]
        );
    }

    #[test]
    fn unknown_instrument_is_rejected() {
        let registry = builtin_registry().unwrap();
        let err = registry
            .resolve(&record("Fluke", "1524", Params::new()), &())
            .err()
            .unwrap();
        assert!(matches!(err, LoggerError::NoMatch { .. }));
    }

    #[test]
    fn reading_display_lists_values() {
        let reading = Reading::new(vec![21.0, 45.5, 9.0]);
        assert_eq!(reading.to_string(), "(21, 45.5, 9)");
    }

    #[test]
    fn parse_value_rejects_garbage() {
        assert_eq!(parse_value(" 21.4 ", "temperature").unwrap(), 21.4);
        assert!(matches!(
            parse_value("ERR", "temperature"),
            Err(LoggerError::MalformedResponse(_))
        ));
        assert!(parse_value("", "humidity").unwrap_err().is_transient());
    }
}
