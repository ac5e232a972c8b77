//! IsoTech milliK precision thermometer
//!
//! Each configured channel is measured with `MEAS:REMOTE? <n>` and becomes a
//! `channel<n>` field. Channels come from the `channels` property (a list) or
//! the older single `channel` property; channel 1 is used when neither is set.

use super::{parse_value, FieldSet, Reading, Sensor};
use crate::error::{AppResult, LoggerError};
use crate::identity::EquipmentRecord;
use crate::transport::{self, Connection};
use async_trait::async_trait;

/// Driver for the IsoTech milliK and its millisKanner channel expanders
pub struct MilliK {
    record: EquipmentRecord,
    fields: FieldSet,
    channels: Vec<u32>,
    connection: Option<Box<dyn Connection>>,
}

impl MilliK {
    /// Build the driver from the configured channel list
    pub fn new(record: EquipmentRecord) -> AppResult<Self> {
        let props = &record.connection.properties;
        let channels = match props.u32_list("channels")? {
            Some(channels) => channels,
            None => vec![props.u32_or("channel", 1)?],
        };

        if channels.is_empty() {
            return Err(LoggerError::Configuration(format!(
                "milliK {} has no channels configured",
                record.serial
            )));
        }
        let mut seen = channels.clone();
        seen.sort_unstable();
        seen.dedup();
        if seen.len() != channels.len() {
            return Err(LoggerError::Configuration(format!(
                "milliK {} lists a channel more than once: {channels:?}",
                record.serial
            )));
        }

        let fields = FieldSet::floats(channels.iter().map(|c| format!("channel{c}")));
        Ok(Self {
            record,
            fields,
            channels,
            connection: None,
        })
    }
}

#[async_trait]
impl Sensor for MilliK {
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
        let mut values = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            let reply = conn.query(&format!("MEAS:REMOTE? {channel}")).await?;
            values.push(parse_value(&reply, &format!("channel {channel}"))?);
        }
        self.connection = Some(conn);
        Ok(Reading::new(values))
    }

    async fn reconnect(&mut self) -> AppResult<()> {
        self.connection = None;
        self.connection = Some(transport::open(&self.record.connection).await?);
        Ok(())
    }
}
