//! OMEGA iTHX iServer temperature/humidity driver
//!
//! The iServer answers ASCII queries on its data port (2000 by default):
//! - `*SRTC` / `*SRTF` → temperature in °C / °F
//! - `*SRH` → relative humidity in %
//! - `*SRDC` / `*SRDF` → dew point in °C / °F
//!
//! Dual-probe models append `2` to address the second probe (`*SRTC2`).
//! Responses are `\r` terminated.
//!
//! ## Configuration
//!
//! ```toml
//! [[equipment]]
//! manufacturer = "OMEGA"
//! model = "iTHX-W3"
//! serial = "12345"
//! connection = { backend = "tcp", address = "192.168.1.100:2000", properties = { nprobes = 1, celsius = true } }
//! ```
//!
//! ## Reset
//!
//! Firmware that understands `*SRYRST` is reset over the data port and answers
//! `Reset`. Any other reply, or a failed exchange, falls back to the control
//! port (2002 by default): the password line when one is configured, then
//! `RESET`. With `wait` set the driver then polls the data port until it
//! answers again.

use super::{parse_value, FieldSet, Reading, ResetOptions, Sensor};
use crate::error::{AppResult, LoggerError};
use crate::identity::{ConnectionSpec, EquipmentRecord};
use crate::transport::{self, Connection};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Delay between reconnection attempts while waiting for a reset to finish
const RESET_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Driver for OMEGA iTHX-W, -D, -M, -S, -2 and -SD iServers
pub struct Ithx {
    record: EquipmentRecord,
    fields: FieldSet,
    nprobes: u32,
    celsius: bool,
    connection: Option<Box<dyn Connection>>,
}

impl Ithx {
    /// Build the driver from the record's `nprobes` (1 or 2) and `celsius` properties.
    ///
    /// No connection is made until the first acquisition.
    pub fn new(record: EquipmentRecord) -> AppResult<Self> {
        let props = &record.connection.properties;
        let nprobes = props.u32_or("nprobes", 1)?;
        let celsius = props.bool_or("celsius", true)?;

        let fields = match nprobes {
            1 => FieldSet::floats(["temperature", "humidity", "dewpoint"]),
            2 => FieldSet::floats([
                "temperature1",
                "humidity1",
                "dewpoint1",
                "temperature2",
                "humidity2",
                "dewpoint2",
            ]),
            n => {
                return Err(LoggerError::Configuration(format!(
                    "iTHX supports 1 or 2 probes, {} is configured with nprobes = {n}",
                    record.serial
                )))
            }
        };

        Ok(Self {
            record,
            fields,
            nprobes,
            celsius,
            connection: None,
        })
    }

    /// Query temperature, humidity and dew point of one probe
    async fn read_probe(
        conn: &mut dyn Connection,
        probe: u32,
        celsius: bool,
    ) -> AppResult<[f64; 3]> {
        let suffix = if probe == 1 { String::new() } else { probe.to_string() };
        let unit = if celsius { 'C' } else { 'F' };

        let temperature = parse_value(&conn.query(&format!("*SRT{unit}{suffix}")).await?, "temperature")?;
        let humidity = parse_value(&conn.query(&format!("*SRH{suffix}")).await?, "humidity")?;
        let dewpoint = parse_value(&conn.query(&format!("*SRD{unit}{suffix}")).await?, "dewpoint")?;

        Ok([temperature, humidity, dewpoint])
    }

    async fn read_all(conn: &mut dyn Connection, nprobes: u32, celsius: bool) -> AppResult<Reading> {
        let mut values = Vec::with_capacity(3 * nprobes as usize);
        for probe in 1..=nprobes {
            values.extend(Self::read_probe(conn, probe, celsius).await?);
        }
        Ok(Reading::new(values))
    }

    /// Ask the data port to reset itself. `false` when the firmware does not know `*SRYRST`.
    async fn reset_over_data_port(spec: &ConnectionSpec) -> AppResult<bool> {
        let mut conn = transport::open(spec).await?;
        let reply = conn.query("*SRYRST").await?;
        Ok(reply.eq_ignore_ascii_case("reset"))
    }

    async fn reset_over_control_port(spec: &ConnectionSpec, options: &ResetOptions) -> AppResult<()> {
        let address = format!("{}:{}", spec.host(), options.port);
        let mut control = transport::connect_tcp(spec, &address).await?;
        if let Some(password) = &options.password {
            control.write(password).await?;
        }
        control.write("RESET").await
    }

    async fn send_reset(spec: &ConnectionSpec, options: &ResetOptions) -> AppResult<()> {
        match Self::reset_over_data_port(spec).await {
            Ok(true) => return Ok(()),
            Ok(false) => debug!("*SRYRST not supported, using the control port"),
            Err(e) => debug!(error = %e, "*SRYRST failed, using the control port"),
        }
        Self::reset_over_control_port(spec, options).await
    }

    async fn wait_until_online(&mut self) -> AppResult<()> {
        loop {
            match transport::open(&self.record.connection).await {
                Ok(mut conn) => {
                    if conn.query("*SRH").await.is_ok() {
                        self.connection = Some(conn);
                        return Ok(());
                    }
                }
                Err(e) => debug!(instrument = %self.record.display_name(), error = %e, "iServer not back yet"),
            }
            tokio::time::sleep(RESET_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl Sensor for Ithx {
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
        let reading = Self::read_all(conn.as_mut(), self.nprobes, self.celsius).await?;
        self.connection = Some(conn);
        Ok(reading)
    }

    async fn reconnect(&mut self) -> AppResult<()> {
        self.connection = None;
        self.connection = Some(transport::open(&self.record.connection).await?);
        Ok(())
    }

    #[instrument(skip_all, fields(instrument = %self.record.display_name(), port = options.port))]
    async fn reset(&mut self, options: &ResetOptions) -> AppResult<()> {
        self.connection = None;

        tokio::time::timeout(options.timeout, async {
            Self::send_reset(&self.record.connection, options).await?;
            info!("reset command sent");
            if options.wait {
                self.wait_until_online().await?;
                info!("iServer is back online");
            }
            Ok::<(), LoggerError>(())
        })
        .await
        .map_err(|_| LoggerError::Timeout(options.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ConnectionSpec;
    use crate::params::Params;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    fn record(address: &str, properties: Params) -> EquipmentRecord {
        EquipmentRecord {
            manufacturer: "OMEGA".into(),
            model: "iTHX-W3".into(),
            serial: "12345".into(),
            alias: "iServer".into(),
            connection: ConnectionSpec::tcp(address).with_properties(properties),
        }
    }

    /// Minimal iServer: answers every query from a fixed table
    async fn spawn_iserver(answers: &'static [(&'static str, &'static str)]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    let (read, mut write) = stream.into_split();
                    let mut lines = BufReader::new(read);
                    let mut command = Vec::new();
                    while lines.read_until(b'\r', &mut command).await.unwrap_or(0) > 0 {
                        let text = String::from_utf8_lossy(&command).trim().to_string();
                        command.clear();
                        let reply = answers
                            .iter()
                            .find(|(q, _)| *q == text)
                            .map_or("?", |(_, a)| *a);
                        if write.write_all(format!("{reply}\r").as_bytes()).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        address
    }

    #[test]
    fn field_layout_follows_probe_count() {
        let one = Ithx::new(record("x:1", Params::new())).unwrap();
        assert_eq!(
            one.fields().names().collect::<Vec<_>>(),
            ["temperature", "humidity", "dewpoint"]
        );

        let two = Ithx::new(record("x:1", Params::new().with("nprobes", "2"))).unwrap();
        assert_eq!(
            two.fields().names().collect::<Vec<_>>(),
            ["temperature1", "humidity1", "dewpoint1", "temperature2", "humidity2", "dewpoint2"]
        );

        let err = Ithx::new(record("x:1", Params::new().with("nprobes", 3_i64)))
            .err()
            .unwrap();
        assert!(matches!(err, LoggerError::Configuration(_)));
    }

    #[tokio::test]
    async fn acquires_single_probe_in_celsius() {
        let address = spawn_iserver(&[("*SRTC", "21.0"), ("*SRH", "45.0"), ("*SRDC", "9.0")]).await;
        let mut sensor = Ithx::new(record(&address, Params::new())).unwrap();
        let reading = sensor.acquire().await.unwrap();
        assert_eq!(reading.values(), &[21.0, 45.0, 9.0]);
    }

    #[tokio::test]
    async fn acquires_both_probes_in_fahrenheit() {
        let address = spawn_iserver(&[
            ("*SRTF", "70.1"),
            ("*SRH", "40.0"),
            ("*SRDF", "45.5"),
            ("*SRTF2", "71.3"),
            ("*SRH2", "41.5"),
            ("*SRDF2", "46.0"),
        ])
        .await;
        let props = Params::new().with("nprobes", 2_i64).with("celsius", false);
        let mut sensor = Ithx::new(record(&address, props)).unwrap();
        let reading = sensor.acquire().await.unwrap();
        assert_eq!(reading.values(), &[70.1, 40.0, 45.5, 71.3, 41.5, 46.0]);
    }

    #[tokio::test]
    async fn reset_over_data_port_skips_control_port() {
        let address = spawn_iserver(&[("*SRYRST", "Reset"), ("*SRH", "45.0")]).await;

        // Nothing listens on the control port, so a fallback would fail
        let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let control_port = closed.local_addr().unwrap().port();
        drop(closed);

        let mut sensor = Ithx::new(record(&address, Params::new())).unwrap();
        let options = ResetOptions {
            port: control_port,
            timeout: Duration::from_secs(5),
            ..ResetOptions::default()
        };
        sensor.reset(&options).await.unwrap();
    }

    #[tokio::test]
    async fn reset_falls_back_to_control_port() {
        let address = spawn_iserver(&[("*SRH", "45.0")]).await;
        let control = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let control_port = control.local_addr().unwrap().port();
        let received = tokio::spawn(async move {
            let (stream, _) = control.accept().await.unwrap();
            let mut reader = BufReader::new(stream);
            let mut line = Vec::new();
            reader.read_until(b'\r', &mut line).await.unwrap();
            String::from_utf8_lossy(&line).trim().to_string()
        });

        let mut sensor = Ithx::new(record(&address, Params::new())).unwrap();
        let options = ResetOptions {
            wait: false,
            port: control_port,
            ..ResetOptions::default()
        };
        sensor.reset(&options).await.unwrap();
        assert_eq!(received.await.unwrap(), "RESET");
    }

    #[tokio::test]
    async fn garbled_reply_is_transient() {
        let address = spawn_iserver(&[("*SRTC", "21.0"), ("*SRH", "--"), ("*SRDC", "9.0")]).await;
        let mut sensor = Ithx::new(record(&address, Params::new())).unwrap();
        let err = sensor.acquire().await.unwrap_err();
        assert!(matches!(err, LoggerError::MalformedResponse(_)));
        assert!(err.is_transient());
    }
}
