//! Range policies

use super::Validator;
use crate::error::{AppResult, LoggerError};
use crate::params::Params;
use crate::sensors::{Reading, Sensor};
use async_trait::async_trait;
use std::fmt;
use tracing::warn;

/// Closed interval `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Smallest accepted value
    pub min: f64,
    /// Largest accepted value
    pub max: f64,
}

impl Bounds {
    /// Read `min_key`/`max_key` from `params`, falling back to the defaults
    pub fn from_params(
        params: &Params,
        (min_key, min_default): (&str, f64),
        (max_key, max_default): (&str, f64),
    ) -> AppResult<Self> {
        Ok(Self {
            min: params.f64_or(min_key, min_default)?,
            max: params.f64_or(max_key, max_default)?,
        })
    }

    /// Whether `value` lies inside the interval. NaN never does.
    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// One acceptance interval applied to every field.
///
/// Every field is checked and every out-of-range field is logged.
#[derive(Debug, Clone)]
pub struct SimpleRange {
    bounds: Bounds,
}

impl SimpleRange {
    /// Registration name
    pub const NAME: &'static str = "simple-range";

    /// Policy with explicit bounds
    pub fn new(bounds: Bounds) -> Self {
        Self { bounds }
    }

    /// `vmin` (default 10) and `vmax` (default 30)
    pub fn from_params(params: &Params) -> AppResult<Self> {
        Ok(Self::new(Bounds::from_params(
            params,
            ("vmin", 10.0),
            ("vmax", 30.0),
        )?))
    }

    /// Interval in use
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }
}

#[async_trait]
impl Validator for SimpleRange {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn validate(&mut self, reading: &Reading, sensor: &mut dyn Sensor) -> AppResult<bool> {
        let alias = sensor.record().display_name();
        let mut accepted = true;
        for (field, &value) in sensor.fields().names().zip(reading.values()) {
            if !self.bounds.contains(value) {
                warn!(
                    instrument = %alias,
                    field,
                    value,
                    reason = "out of range",
                    "{field} value of {value} is out of range {} for {alias}",
                    self.bounds
                );
                accepted = false;
            }
        }
        Ok(accepted)
    }
}

/// Separate temperature, humidity and dew point intervals for iTHX readings.
///
/// Accepts readings of 3 values (one probe) or 6 values (two probes, probe 1
/// first). Categories are checked in the order temperature, humidity, dew
/// point and checking stops at the first failing category.
#[derive(Debug, Clone)]
pub struct ProbeRange {
    temperature: Bounds,
    humidity: Bounds,
    dewpoint: Bounds,
}

impl ProbeRange {
    /// Registration name
    pub const NAME: &'static str = "ithx-range-checker";

    /// Policy with explicit bounds
    pub fn new(temperature: Bounds, humidity: Bounds, dewpoint: Bounds) -> Self {
        Self {
            temperature,
            humidity,
            dewpoint,
        }
    }

    /// `tmin=10, tmax=30, hmin=10, hmax=90, dmin=0, dmax=20` unless overridden
    pub fn from_params(params: &Params) -> AppResult<Self> {
        Ok(Self::new(
            Bounds::from_params(params, ("tmin", 10.0), ("tmax", 30.0))?,
            Bounds::from_params(params, ("hmin", 10.0), ("hmax", 90.0))?,
            Bounds::from_params(params, ("dmin", 0.0), ("dmax", 20.0))?,
        ))
    }
}

#[async_trait]
impl Validator for ProbeRange {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn validate(&mut self, reading: &Reading, sensor: &mut dyn Sensor) -> AppResult<bool> {
        let values = reading.values();
        if values.len() != 3 && values.len() != 6 {
            return Err(LoggerError::Contract(format!(
                "{} expects 3 or 6 values, got {}",
                Self::NAME,
                values.len()
            )));
        }

        let alias = sensor.record().display_name();
        let categories = [
            ("Temperature", 0, self.temperature),
            ("Humidity", 1, self.humidity),
            ("Dewpoint", 2, self.dewpoint),
        ];
        for (category, offset, bounds) in categories {
            for index in (offset..values.len()).step_by(3) {
                let value = values[index];
                if !bounds.contains(value) {
                    let field = sensor.fields().names().nth(index).unwrap_or(category);
                    warn!(
                        instrument = %alias,
                        field,
                        value,
                        reason = "out of range",
                        "{category} value of {value} ({field}) is out of range {bounds} for {alias}"
                    );
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{ConnectionSpec, EquipmentRecord};
    use crate::sensors::mock::MockSensor;
    use crate::sensors::FieldSet;
    use tracing_test::traced_test;

    fn sensor(fields: &[&str]) -> MockSensor {
        MockSensor::scripted(
            EquipmentRecord {
                manufacturer: "OMEGA".into(),
                model: "iTHX-W3".into(),
                serial: "12345".into(),
                alias: "Lab 2".into(),
                connection: ConnectionSpec::tcp("localhost:0"),
            },
            FieldSet::floats(fields.iter().copied()),
            [],
        )
    }

    #[tokio::test]
    #[traced_test]
    async fn simple_range_logs_every_failing_field() {
        let mut sensor = sensor(&["temperature", "humidity", "dewpoint"]);
        let mut policy = SimpleRange::from_params(&Params::new()).unwrap();

        assert!(policy
            .validate(&Reading::new(vec![20.0, 25.0, 15.0]), &mut sensor)
            .await
            .unwrap());

        assert!(!policy
            .validate(&Reading::new(vec![20.0, 45.0, 5.0]), &mut sensor)
            .await
            .unwrap());
        assert!(logs_contain("humidity value of 45 is out of range [10, 30] for Lab 2"));
        assert!(logs_contain("dewpoint value of 5 is out of range [10, 30] for Lab 2"));
        assert!(!logs_contain("temperature value"));
    }

    #[tokio::test]
    async fn simple_range_bounds_are_inclusive_and_configurable() {
        let mut sensor = sensor(&["value"]);
        let params = Params::new().with("vmin", "-5").with("vmax", 5_i64);
        let mut policy = SimpleRange::from_params(&params).unwrap();
        assert_eq!(policy.bounds(), Bounds { min: -5.0, max: 5.0 });

        for (value, expected) in [(-5.0, true), (5.0, true), (5.01, false), (f64::NAN, false)] {
            let accepted = policy
                .validate(&Reading::new(vec![value]), &mut sensor)
                .await
                .unwrap();
            assert_eq!(accepted, expected, "value {value}");
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn probe_range_defaults() {
        let mut sensor = sensor(&["temperature", "humidity", "dewpoint"]);
        let mut policy = ProbeRange::from_params(&Params::new()).unwrap();

        assert!(policy
            .validate(&Reading::new(vec![25.0, 50.0, 10.0]), &mut sensor)
            .await
            .unwrap());
        assert!(!policy
            .validate(&Reading::new(vec![35.0, 50.0, 10.0]), &mut sensor)
            .await
            .unwrap());
        assert!(logs_contain("Temperature value of 35 (temperature) is out of range [10, 30] for Lab 2"));
    }

    #[tokio::test]
    #[traced_test]
    async fn probe_range_stops_at_first_failing_category() {
        let mut sensor = sensor(&[
            "temperature1",
            "humidity1",
            "dewpoint1",
            "temperature2",
            "humidity2",
            "dewpoint2",
        ]);
        let mut policy = ProbeRange::from_params(&Params::new()).unwrap();

        // Probe 2 humidity and probe 1 dew point both fail; only humidity is reported
        let reading = Reading::new(vec![22.0, 50.0, 25.0, 23.0, 95.0, 10.0]);
        assert!(!policy.validate(&reading, &mut sensor).await.unwrap());
        assert!(logs_contain("Humidity value of 95 (humidity2)"));
        assert!(!logs_contain("Dewpoint value"));
    }

    #[tokio::test]
    async fn probe_range_rejects_wrong_width_as_contract_error() {
        let mut sensor = sensor(&["a", "b", "c", "d"]);
        let mut policy = ProbeRange::from_params(&Params::new()).unwrap();
        let err = policy
            .validate(&Reading::new(vec![20.0, 50.0, 10.0, 20.0]), &mut sensor)
            .await
            .unwrap_err();
        assert!(matches!(err, LoggerError::Contract(_)));
    }
}
