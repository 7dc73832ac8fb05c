//! # Ingest Loop
//!
//! Background task that turns serial lines into buffered telemetry samples.
//!
//! The only suspension point is the transport's timed read, raced against the
//! stop signal. Decode failures are discarded; I/O faults are logged and
//! retried after a backoff. The loop ends on the stop signal or when the
//! transport is closed underneath it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::buffer::TelemetryBuffer;
use crate::error::TransportError;
use crate::protocol::codec::decode_line;
use crate::protocol::types::TelemetrySample;
use crate::serial::Transport;

/// Running counters kept by the ingest loop
#[derive(Debug, Default)]
pub struct IngestStats {
    lines_read: AtomicU64,
    samples_appended: AtomicU64,
    lines_discarded: AtomicU64,
    io_faults: AtomicU64,
}

/// Copy of [`IngestStats`] at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestCounters {
    pub lines_read: u64,
    pub samples_appended: u64,
    pub lines_discarded: u64,
    pub io_faults: u64,
}

impl IngestStats {
    pub fn counters(&self) -> IngestCounters {
        IngestCounters {
            lines_read: self.lines_read.load(Ordering::Relaxed),
            samples_appended: self.samples_appended.load(Ordering::Relaxed),
            lines_discarded: self.lines_discarded.load(Ordering::Relaxed),
            io_faults: self.io_faults.load(Ordering::Relaxed),
        }
    }
}

/// Ingest loop wiring
pub struct IngestLoop {
    transport: Arc<Transport>,
    buffer: Arc<TelemetryBuffer>,
    stats: Arc<IngestStats>,
    fault_backoff: Duration,
}

/// Handle to a running ingest task
#[derive(Debug)]
pub struct IngestHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl IngestHandle {
    /// Raise the stop signal and wait for the task to finish
    pub async fn stop(self) {
        // Err means the task already exited and dropped its receiver
        let _ = self.stop.send(true);

        if let Err(e) = self.task.await {
            warn!("Ingest task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl IngestLoop {
    pub fn new(
        transport: Arc<Transport>,
        buffer: Arc<TelemetryBuffer>,
        stats: Arc<IngestStats>,
        fault_backoff: Duration,
    ) -> Self {
        Self {
            transport,
            buffer,
            stats,
            fault_backoff,
        }
    }

    /// Spawn the loop on the current tokio runtime
    pub fn spawn(self) -> IngestHandle {
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(stop_rx));
        IngestHandle { stop, task }
    }

    /// Run until `stop` becomes `true` (or its sender is dropped)
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        info!("Telemetry ingest started on {}", self.transport.device_path());
        let mut consecutive_faults: u64 = 0;

        loop {
            if *stop.borrow_and_update() {
                break;
            }

            let result = tokio::select! {
                biased;
                _ = stop.changed() => break,
                result = self.transport.read_line() => result,
            };

            match result {
                Ok(None) => continue,
                Ok(Some(line)) => {
                    consecutive_faults = 0;
                    self.stats.lines_read.fetch_add(1, Ordering::Relaxed);
                    self.ingest_line(&line);
                }
                Err(TransportError::Closed) => {
                    info!("Serial port closed, stopping telemetry ingest");
                    break;
                }
                Err(e) => {
                    consecutive_faults += 1;
                    self.stats.io_faults.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Telemetry read failed ({} in a row): {}; retrying in {}ms",
                        consecutive_faults,
                        e,
                        self.fault_backoff.as_millis()
                    );

                    tokio::select! {
                        biased;
                        _ = stop.changed() => break,
                        _ = tokio::time::sleep(self.fault_backoff) => {}
                    }
                }
            }
        }

        let counters = self.stats.counters();
        info!(
            "Telemetry ingest stopped: {} lines, {} samples, {} discarded, {} faults",
            counters.lines_read,
            counters.samples_appended,
            counters.lines_discarded,
            counters.io_faults
        );
    }

    fn ingest_line(&self, line: &[u8]) {
        match decode_line(line) {
            Ok(reading) => {
                let sample = TelemetrySample::from_reading(reading, Utc::now());
                debug!(
                    "Telemetry: air {:.1}°C, bed {:.1}°C, humidity {:.1} g/m³, {} {}",
                    sample.air_temp, sample.bed_temp, sample.humidity, sample.status, sample.preset
                );
                self.buffer.append(sample);
                self.stats.samples_appended.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.lines_discarded.fetch_add(1, Ordering::Relaxed);
                debug!("Discarding telemetry line: {} ({:?})", e, String::from_utf8_lossy(line).trim());
            }
        }
    }
}
