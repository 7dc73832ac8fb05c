//! # Dryer Protocol Module
//!
//! Newline-delimited JSON spoken between the engine and the dryer firmware.
//!
//! This module handles:
//! - Preset and custom command types with typed field validation
//! - Telemetry frame types
//! - Encoding commands and decoding telemetry lines

pub mod types;
pub mod codec;
