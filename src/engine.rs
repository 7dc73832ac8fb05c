//! # Dryer Engine
//!
//! Facade that owns the transport, telemetry window, ingest task and command
//! dispatcher, and exposes them to the operator interface.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::command::CommandDispatcher;
use crate::config::Config;
use crate::error::CommandError;
use crate::protocol::types::{CustomCommand, Preset, TelemetrySample};
use crate::serial::{ConnectionState, Transport};
use crate::telemetry::{IngestCounters, IngestHandle, IngestLoop, IngestStats, TelemetryBuffer};

/// Serial telemetry and command engine for one dryer
pub struct DryerEngine {
    transport: Arc<Transport>,
    buffer: Arc<TelemetryBuffer>,
    stats: Arc<IngestStats>,
    dispatcher: CommandDispatcher,
    ingest: Mutex<Option<IngestHandle>>,
    fault_backoff: Duration,
}

impl DryerEngine {
    /// Open the configured port and build an engine around it
    ///
    /// Ingest does not start until [`DryerEngine::start_ingest`].
    ///
    /// # Errors
    ///
    /// Returns `DryerLinkError::Transport` wrapping `TransportError::Unavailable`
    /// if the port cannot be opened.
    pub async fn connect(config: &Config) -> crate::error::Result<Self> {
        let transport = Transport::open(&config.serial).await?;
        Ok(Self::new(
            transport,
            config.telemetry.capacity,
            Duration::from_millis(config.serial.fault_backoff_ms),
        ))
    }

    /// Build an engine over an already-open transport
    pub fn new(transport: Transport, capacity: usize, fault_backoff: Duration) -> Self {
        let transport = Arc::new(transport);

        Self {
            dispatcher: CommandDispatcher::new(Arc::clone(&transport)),
            transport,
            buffer: Arc::new(TelemetryBuffer::new(capacity)),
            stats: Arc::new(IngestStats::default()),
            ingest: Mutex::new(None),
            fault_backoff,
        }
    }

    /// Start the background ingest task
    ///
    /// Returns `false` if it is already running or the transport is closed.
    /// Must be called from within a tokio runtime.
    pub fn start_ingest(&self) -> bool {
        if self.transport.state() == ConnectionState::Closed {
            return false;
        }

        let mut slot = self.ingest.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("Telemetry ingest already running");
            return false;
        }

        *slot = Some(
            IngestLoop::new(
                Arc::clone(&self.transport),
                Arc::clone(&self.buffer),
                Arc::clone(&self.stats),
                self.fault_backoff,
            )
            .spawn(),
        );
        true
    }

    /// Stop ingest and close the transport
    ///
    /// Buffered samples stay readable afterwards. Safe to call more than once.
    pub async fn stop(&self) {
        let handle = self
            .ingest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle {
            handle.stop().await;
        }

        self.transport.close().await;
        info!("Dryer engine stopped with {} samples buffered", self.buffer.len());
    }

    /// Copy of the current telemetry window, oldest first
    pub fn latest_snapshot(&self) -> Vec<TelemetrySample> {
        self.buffer.snapshot()
    }

    /// Newest telemetry sample
    pub fn latest(&self) -> Option<TelemetrySample> {
        self.buffer.latest()
    }

    /// Notified after every appended sample
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.buffer.subscribe()
    }

    /// Send a preset command
    ///
    /// A failed write leaves the link `Faulted` and later commands fail with
    /// `NotConnected` until a read succeeds. The ingest task does that on the
    /// next telemetry line, so without [`DryerEngine::start_ingest`] a faulted
    /// link stays faulted.
    pub async fn send_preset(&self, preset: Preset) -> Result<(), CommandError> {
        self.dispatcher.send_preset(preset).await
    }

    /// Validate and send custom values; faults behave as for `send_preset`
    pub async fn send_custom(&self, fields: &CustomCommand) -> Result<(), CommandError> {
        self.dispatcher.send_custom(fields).await
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub fn ingest_stats(&self) -> IngestCounters {
        self.stats.counters()
    }

    pub fn device_path(&self) -> &str {
        self.transport.device_path()
    }
}
