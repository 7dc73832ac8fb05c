//! # Telemetry Module
//!
//! Handles device telemetry between the serial port and its consumers.
//!
//! This module handles:
//! - Keeping a bounded, arrival-ordered window of samples
//! - Reading, decoding and appending samples in a background task
//! - Counting lines read, discarded and faulted

pub mod buffer;
pub mod ingest;

pub use buffer::TelemetryBuffer;
pub use ingest::{IngestCounters, IngestHandle, IngestLoop, IngestStats};
