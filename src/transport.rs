//! Line-oriented instrument transports.
//!
//! Every supported instrument speaks a simple ASCII command/response protocol:
//! write a command plus a terminator, read one response up to a delimiter.
//! [`LineConnection`] implements that exchange over any tokio byte stream, so the
//! TCP and serial backends differ only in how the stream is opened.
//!
//! All I/O failures are reported as transient errors (`Connection`, `Timeout`)
//! so the polling loop can retry them.

use crate::error::{AppResult, LoggerError};
use crate::identity::{Backend, ConnectionSpec};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::trace;

/// Command/response link to an instrument
#[async_trait]
pub trait Connection: Send {
    /// Send a command and return the trimmed response
    async fn query(&mut self, command: &str) -> AppResult<String>;

    /// Send a command that produces no response
    async fn write(&mut self, command: &str) -> AppResult<()>;
}

/// Open the transport described by `spec`
pub async fn open(spec: &ConnectionSpec) -> AppResult<Box<dyn Connection>> {
    match spec.backend {
        Backend::Tcp => Ok(Box::new(connect_tcp(spec, &spec.address).await?)),
        Backend::Serial => open_serial(spec),
    }
}

/// Open a TCP line connection to `address`, using the framing and timeout of `spec`
pub async fn connect_tcp(
    spec: &ConnectionSpec,
    address: &str,
) -> AppResult<LineConnection<TcpStream>> {
    let stream = tokio::time::timeout(spec.timeout, TcpStream::connect(address))
        .await
        .map_err(|_| LoggerError::Timeout(spec.timeout))?
        .map_err(|e| LoggerError::connection(&format!("cannot connect to {address}"), e))?;
    trace!(address, "tcp connection established");
    LineConnection::new(stream, spec)
}

#[cfg(feature = "instrument_serial")]
fn open_serial(spec: &ConnectionSpec) -> AppResult<Box<dyn Connection>> {
    use tokio_serial::SerialPortBuilderExt;

    let port = tokio_serial::new(&spec.address, spec.baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .timeout(spec.timeout)
        .open_native_async()
        .map_err(|e| LoggerError::Connection(format!("cannot open {}: {e}", spec.address)))?;
    Ok(Box::new(LineConnection::new(port, spec)?))
}

#[cfg(not(feature = "instrument_serial"))]
fn open_serial(_spec: &ConnectionSpec) -> AppResult<Box<dyn Connection>> {
    Err(LoggerError::FeatureNotEnabled("instrument_serial".to_string()))
}

/// ASCII command/response exchange over a byte stream
pub struct LineConnection<S> {
    stream: BufReader<S>,
    write_termination: String,
    read_termination: u8,
    timeout: Duration,
}

impl<S> LineConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already-open stream
    ///
    /// # Errors
    /// Returns `Configuration` if the read terminator is not ASCII
    pub fn new(stream: S, spec: &ConnectionSpec) -> AppResult<Self> {
        let read_termination = u8::try_from(spec.read_termination)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                LoggerError::Configuration(format!(
                    "read terminator {:?} of {} is not ASCII",
                    spec.read_termination, spec.address
                ))
            })?;
        Ok(Self {
            stream: BufReader::new(stream),
            write_termination: spec.write_termination.clone(),
            read_termination,
            timeout: spec.timeout,
        })
    }

    async fn send(&mut self, command: &str) -> AppResult<()> {
        let framed = format!("{}{}", command, self.write_termination);
        trace!(command = %framed.escape_default(), "write");
        tokio::time::timeout(self.timeout, self.stream.get_mut().write_all(framed.as_bytes()))
            .await
            .map_err(|_| LoggerError::Timeout(self.timeout))?
            .map_err(|e| LoggerError::connection("write failed", e))
    }
}

#[async_trait]
impl<S> Connection for LineConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn query(&mut self, command: &str) -> AppResult<String> {
        self.send(command).await?;

        let mut raw = Vec::new();
        let n = tokio::time::timeout(
            self.timeout,
            self.stream.read_until(self.read_termination, &mut raw),
        )
        .await
        .map_err(|_| LoggerError::Timeout(self.timeout))?
        .map_err(|e| LoggerError::connection("read failed", e))?;

        if n == 0 {
            return Err(LoggerError::Connection(
                "connection closed by instrument".to_string(),
            ));
        }

        let response = String::from_utf8_lossy(&raw).trim().to_string();
        trace!(response = %response.escape_default(), "read");
        Ok(response)
    }

    async fn write(&mut self, command: &str) -> AppResult<()> {
        self.send(command).await
    }
}
