//! # Dryer Link Library
//!
//! Monitor and command a filament dryer over a JSON serial link.
//!
//! This library provides the serial telemetry and command engine: it keeps a
//! rolling window of device telemetry and sends preset or custom control
//! commands back to the dryer without disturbing the inbound stream.

pub mod config;
pub mod error;
pub mod protocol;
pub mod serial;
pub mod telemetry;
pub mod command;
pub mod engine;
pub mod console;
