//! Vaisala PTU300 barometer/humidity transmitter
//!
//! The transmitter is polled with `SEND`, which returns one line of
//! whitespace-separated values in the configured output format. By default
//! that is pressure (hPa), temperature (°C) and relative humidity (%RH).
//! Instruments with a custom `FORM` string declare their field list with a
//! `fields` property, in output order.

use super::{parse_value, FieldSet, Reading, Sensor};
use crate::error::{AppResult, LoggerError};
use crate::identity::EquipmentRecord;
use crate::transport::{self, Connection};
use async_trait::async_trait;

const DEFAULT_FIELDS: [&str; 3] = ["pressure", "temperature", "humidity"];

/// Driver for the Vaisala PTU300 series
pub struct Ptu300 {
    record: EquipmentRecord,
    fields: FieldSet,
    connection: Option<Box<dyn Connection>>,
}

impl Ptu300 {
    /// Build the driver; the optional `fields` property overrides the default field list
    pub fn new(record: EquipmentRecord) -> AppResult<Self> {
        let fields = match record.connection.properties.str_list("fields")? {
            Some(names) if names.is_empty() => {
                return Err(LoggerError::Configuration(format!(
                    "PTU300 {} has an empty 'fields' list",
                    record.serial
                )))
            }
            Some(names) => FieldSet::floats(names),
            None => FieldSet::floats(DEFAULT_FIELDS),
        };
        Ok(Self {
            record,
            fields,
            connection: None,
        })
    }

    fn parse(&self, line: &str) -> AppResult<Reading> {
        let values = line
            .split_whitespace()
            .map(|token| parse_value(token, "PTU300 value"))
            .collect::<AppResult<Vec<_>>>()?;
        if values.len() != self.fields.len() {
            return Err(LoggerError::MalformedResponse(format!(
                "expected {} values from PTU300, got '{line}'",
                self.fields.len()
            )));
        }
        Ok(Reading::new(values))
    }
}

#[async_trait]
impl Sensor for Ptu300 {
    fn record(&self) -> &EquipmentRecord {
        &self.record
    }

    fn fields(&self) -> &FieldSet {
        &self.fields
    }

    async fn acquire(&mut self) -> AppResult<Reading> {
        let mut conn = match self.connection.take() {
            Some(conn) => conn,
            None => transport::open(&self.record.connection).await?,
        };
        let line = conn.query("SEND").await?;
        let reading = self.parse(&line)?;
        self.connection = Some(conn);
        Ok(reading)
    }

    async fn reconnect(&mut self) -> AppResult<()> {
        self.connection = None;
        self.connection = Some(transport::open(&self.record.connection).await?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ConnectionSpec;
    use crate::params::Params;

    fn sensor(properties: Params) -> AppResult<Ptu300> {
        Ptu300::new(EquipmentRecord {
            manufacturer: "Vaisala".into(),
            model: "PTU300".into(),
            serial: "P1234".into(),
            alias: String::new(),
            connection: ConnectionSpec::tcp("127.0.0.1:1").with_properties(properties),
        })
    }

    #[test]
    fn parses_default_output_format() {
        let sensor = sensor(Params::new()).unwrap();
        let reading = sensor.parse("1013.25   21.40  45.1").unwrap();
        assert_eq!(reading.values(), &[1013.25, 21.4, 45.1]);
    }

    #[test]
    fn custom_field_list_sets_expected_width() {
        let props = Params::new().with("fields", vec!["pressure", "dewpoint"]);
        let sensor = sensor(props).unwrap();
        assert_eq!(sensor.fields().names().collect::<Vec<_>>(), ["pressure", "dewpoint"]);

        let err = sensor.parse("1013.25 21.4 45.1").unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn empty_field_list_is_rejected() {
        let props = Params::new().with("fields", Vec::<String>::new());
        assert!(matches!(sensor(props), Err(LoggerError::Configuration(_))));
    }
}
