//! # Serial Communication Module
//!
//! Handles the serial link to the dryer controller.
//!
//! This module handles:
//! - Opening and configuring the port (baud rate, 8N1, DTR/RTS levels)
//! - Line reads with a bounded timeout so callers can poll cooperatively
//! - Frame writes serialized behind their own lock, independent of reads
//! - Tracking connection state (`Closed`, `Open`, `Faulted`)

pub mod port_trait;

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Mutex;
use tokio_serial::{SerialPort, SerialPortBuilderExt};
use tracing::{debug, info, warn};

use crate::config::SerialConfig;
use crate::error::TransportError;
use port_trait::{FrameSink, LineSource, SerialReader, SerialWriter};

/// Connectivity of the serial link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Open,
    Faulted,
}

impl ConnectionState {
    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Closed => 0,
            ConnectionState::Open => 1,
            ConnectionState::Faulted => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Open,
            2 => ConnectionState::Faulted,
            _ => ConnectionState::Closed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Closed => "closed",
            ConnectionState::Open => "open",
            ConnectionState::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

/// Dryer serial transport
///
/// Reads and writes go through separate locks, so a command write never
/// waits behind a pending line read. Shared between the ingest loop and the
/// command dispatcher through an `Arc`.
pub struct Transport {
    reader: Mutex<Option<Box<dyn LineSource>>>,
    writer: Mutex<Option<Outbound>>,
    state: AtomicU8,
    device_path: String,
    read_timeout: Duration,
    write_timeout: Duration,
}

/// Write half plus whether the last frame was cut off mid-write
struct Outbound {
    sink: Box<dyn FrameSink>,
    aborted: bool,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("device_path", &self.device_path)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Open and configure the serial port described by `config`
    ///
    /// Waits `settle_ms` after opening; the controller board resets when the
    /// port opens and ignores input until it has booted.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Unavailable` if the device is missing, not
    /// accessible, already in use or rejects the line settings.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dryer_link::config::Config;
    /// use dryer_link::serial::Transport;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let config = Config::default();
    ///     let transport = Transport::open(&config.serial).await?;
    ///     println!("Connected to {}", transport.device_path());
    ///     Ok(())
    /// }
    /// ```
    pub async fn open(config: &SerialConfig) -> Result<Self, TransportError> {
        debug!("Opening serial port {} at {} baud", config.port, config.baud_rate);

        let mut port = Self::open_port(config)?;

        port.write_data_terminal_ready(config.dtr)
            .and_then(|_| port.write_request_to_send(config.rts))
            .map_err(|e| TransportError::Unavailable {
                path: config.port.clone(),
                reason: format!("Failed to set handshake lines: {}", e),
            })?;

        if config.settle_ms > 0 {
            debug!("Waiting {}ms for the controller to boot", config.settle_ms);
            tokio::time::sleep(Duration::from_millis(config.settle_ms)).await;
        }

        let (read_half, write_half) = tokio::io::split(port);
        info!("Successfully opened dryer at {}", config.port);

        Ok(Self::from_parts(
            Box::new(SerialReader::new(read_half)),
            Box::new(SerialWriter::new(write_half)),
            config.port.clone(),
            Duration::from_millis(config.timeout_ms),
            Duration::from_millis(config.write_timeout_ms),
        ))
    }

    /// Open a specific serial port with the configured line settings
    fn open_port(config: &SerialConfig) -> Result<tokio_serial::SerialStream, TransportError> {
        tokio_serial::new(&config.port, config.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(Duration::from_millis(config.timeout_ms))
            .open_native_async()
            .map_err(|e| TransportError::Unavailable {
                path: config.port.clone(),
                reason: e.to_string(),
            })
    }

    /// Build an open transport from already-connected halves
    pub fn from_parts(
        reader: Box<dyn LineSource>,
        writer: Box<dyn FrameSink>,
        device_path: impl Into<String>,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Self {
        Self {
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(Outbound {
                sink: writer,
                aborted: false,
            })),
            state: AtomicU8::new(ConnectionState::Open.as_u8()),
            device_path: device_path.into(),
            read_timeout,
            write_timeout,
        }
    }

    /// Read the next line, waiting at most the configured read timeout
    ///
    /// # Returns
    ///
    /// * `Ok(Some(line))` - a complete line, terminator included
    /// * `Ok(None)` - no line arrived before the timeout
    ///
    /// # Errors
    ///
    /// - `IoFault` if the port failed (the state becomes `Faulted`)
    /// - `Closed` after [`Transport::close`]
    pub async fn read_line(&self) -> Result<Option<Bytes>, TransportError> {
        if self.state() == ConnectionState::Closed {
            return Err(TransportError::Closed);
        }

        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or(TransportError::Closed)?;

        match tokio::time::timeout(self.read_timeout, reader.read_line()).await {
            Err(_elapsed) => Ok(None),
            Ok(Ok(line)) => {
                self.recover();
                Ok(Some(line))
            }
            Ok(Err(e)) => Err(self.fault(format!("Failed to read line: {}", e))),
        }
    }

    /// Write one frame, appending `\n` if the payload lacks it
    ///
    /// Concurrent callers are serialized so frames never interleave. After a
    /// failed or timed-out write the next frame starts with `\n`, so a
    /// fragment left on the wire ends as its own line instead of prefixing
    /// the new frame. A successful write clears a `Faulted` state.
    ///
    /// # Errors
    ///
    /// - `IoFault` on write or flush failure, or if the write times out
    /// - `Closed` after [`Transport::close`]
    pub async fn write_line(&self, payload: &[u8]) -> Result<(), TransportError> {
        if self.state() == ConnectionState::Closed {
            return Err(TransportError::Closed);
        }

        let mut guard = self.writer.lock().await;
        let outbound = guard.as_mut().ok_or(TransportError::Closed)?;

        let mut frame = Vec::with_capacity(payload.len() + 2);
        if outbound.aborted {
            debug!("Terminating partial frame left by an aborted write");
            frame.push(b'\n');
        }
        frame.extend_from_slice(payload);
        if frame.last() != Some(&b'\n') {
            frame.push(b'\n');
        }

        let sink = &mut outbound.sink;
        let write = async {
            sink.write_all(&frame).await?;
            sink.flush().await
        };
        let result = tokio::time::timeout(self.write_timeout, write).await;
        outbound.aborted = !matches!(result, Ok(Ok(())));

        match result {
            Ok(Ok(())) => {
                debug!("Sent frame ({} bytes)", frame.len());
                self.recover();
                Ok(())
            }
            Ok(Err(e)) => Err(self.fault(format!("Failed to write frame: {}", e))),
            Err(_elapsed) => Err(self.fault(format!(
                "Write timed out after {}ms",
                self.write_timeout.as_millis()
            ))),
        }
    }

    /// Close the port
    ///
    /// Idempotent. Reads and writes fail with `Closed` afterwards.
    pub async fn close(&self) {
        let previous = self.state.swap(ConnectionState::Closed.as_u8(), Ordering::SeqCst);
        if ConnectionState::from_u8(previous) == ConnectionState::Closed {
            return;
        }

        self.writer.lock().await.take();
        self.reader.lock().await.take();
        info!("Closed serial port {}", self.device_path);
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Configured line read timeout
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    fn fault(&self, message: String) -> TransportError {
        let changed = self.state.compare_exchange(
            ConnectionState::Open.as_u8(),
            ConnectionState::Faulted.as_u8(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        if changed.is_ok() {
            warn!("Serial link {} faulted: {}", self.device_path, message);
        }
        TransportError::IoFault(message)
    }

    fn recover(&self) {
        let changed = self.state.compare_exchange(
            ConnectionState::Faulted.as_u8(),
            ConnectionState::Open.as_u8(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        if changed.is_ok() {
            info!("Serial link {} recovered", self.device_path);
        }
    }
}
