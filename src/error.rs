//! # Error Types
//!
//! Custom error types for Dryer Link using `thiserror`.
//!
//! Each layer has its own error so that recovery policy is decided by type:
//! - [`DecodeError`] - discard the line and keep ingesting
//! - [`TransportError`] - fatal at startup, transient once running
//! - [`CommandError`] - reported synchronously to whoever issued the command

use thiserror::Error;

use crate::protocol::types::CustomField;

/// Main error type for Dryer Link
#[derive(Debug, Error)]
pub enum DryerLinkError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Serial transport errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serial transport errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The serial device could not be opened
    #[error("Serial port {path} unavailable: {reason}")]
    Unavailable { path: String, reason: String },

    /// Read or write failure on an open port
    #[error("Serial I/O fault: {0}")]
    IoFault(String),

    /// Operation attempted after the transport was closed
    #[error("Serial port is closed")]
    Closed,
}

/// Telemetry line decode errors
///
/// Never propagated past the ingest loop.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty line")]
    Empty,

    #[error("line is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("line is not a JSON object")]
    NotObject,

    #[error("invalid telemetry frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// Command submission errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The transport is not in the `Open` state
    #[error("Device not connected")]
    NotConnected,

    /// A custom command with no enabled fields
    #[error("No values selected to send")]
    EmptySelection,

    /// A custom field value that does not fit the field's type
    #[error("Invalid value {value:?} for {field}")]
    InvalidValue { field: CustomField, value: String },

    /// The write itself failed
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Result type alias for Dryer Link
pub type Result<T> = std::result::Result<T, DryerLinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_message_names_wire_field() {
        let err = CommandError::InvalidValue {
            field: CustomField::DryTimer,
            value: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid value \"abc\" for dryTimer");
    }

    #[test]
    fn test_transport_error_converts_into_app_error() {
        let err: DryerLinkError = TransportError::Unavailable {
            path: "/dev/ttyUSB9".to_string(),
            reason: "No such file or directory".to_string(),
        }
        .into();

        match err {
            DryerLinkError::Transport(TransportError::Unavailable { path, .. }) => {
                assert_eq!(path, "/dev/ttyUSB9");
            }
            other => panic!("Expected Transport error, got: {:?}", other),
        }
    }

    #[test]
    fn test_decode_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: DecodeError = json_err.into();
        assert!(matches!(err, DecodeError::Json(_)));
    }
}
