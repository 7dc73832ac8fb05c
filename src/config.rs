//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;

use crate::error::{DryerLinkError, Result};

/// Baud rates the dryer's USB-serial bridge is known to run at
pub const SUPPORTED_BAUD_RATES: &[u32] = &[
    9600, 19200, 38400, 57600, 115200, 230400, 250000, 500000, 1000000,
];

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Line read timeout; also the ingest loop's stop-signal latency
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Delay after opening while the controller reboots
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Pause between reads after an I/O fault
    #[serde(default = "default_fault_backoff_ms")]
    pub fault_backoff_ms: u64,

    /// DTR level after opening; asserting it resets most Arduino boards
    #[serde(default)]
    pub dtr: bool,

    #[serde(default)]
    pub rts: bool,
}

/// Telemetry window configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    /// Samples kept in the rolling window
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// How often the operator binary logs the latest sample
    #[serde(default = "default_report_interval_s")]
    pub report_interval_s: u64,
}

/// Log output configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Directory for daily log files; console only when unset
    #[serde(default)]
    pub directory: Option<String>,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { 115200 }
fn default_timeout_ms() -> u64 { 250 }
fn default_write_timeout_ms() -> u64 { 1000 }
fn default_settle_ms() -> u64 { 2000 }
fn default_fault_backoff_ms() -> u64 { 1000 }

fn default_capacity() -> usize { 3600 }
fn default_report_interval_s() -> u64 { 10 }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            settle_ms: default_settle_ms(),
            fault_backoff_ms: default_fault_backoff_ms(),
            dtr: false,
            rts: false,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            report_interval_s: default_report_interval_s(),
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> DryerLinkError {
    DryerLinkError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing sections and keys fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dryer_link::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if !SUPPORTED_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(invalid(format!(
                "baud_rate must be one of: {:?}",
                SUPPORTED_BAUD_RATES
            )));
        }

        if self.serial.timeout_ms == 0 || self.serial.timeout_ms > 10000 {
            return Err(invalid("timeout_ms must be between 1 and 10000"));
        }

        if self.serial.write_timeout_ms == 0 || self.serial.write_timeout_ms > 10000 {
            return Err(invalid("write_timeout_ms must be between 1 and 10000"));
        }

        if self.serial.settle_ms > 10000 {
            return Err(invalid("settle_ms must be at most 10000"));
        }

        if self.serial.fault_backoff_ms == 0 || self.serial.fault_backoff_ms > 60000 {
            return Err(invalid("fault_backoff_ms must be between 1 and 60000"));
        }

        if self.telemetry.capacity == 0 || self.telemetry.capacity > 1_000_000 {
            return Err(invalid("telemetry capacity must be between 1 and 1000000"));
        }

        if self.telemetry.report_interval_s == 0 {
            return Err(invalid("report_interval_s must be greater than 0"));
        }

        if let Some(dir) = &self.logging.directory {
            if dir.is_empty() {
                return Err(invalid("logging directory cannot be empty when set"));
            }
        }

        Ok(())
    }
}
