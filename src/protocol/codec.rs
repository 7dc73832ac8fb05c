//! # Frame Codec
//!
//! Encodes commands into newline-terminated JSON frames and decodes device
//! telemetry lines.

use serde_json::{Map, Value};

use super::types::{Command, TelemetryReading};
use crate::error::DecodeError;

/// Frame terminator in both directions
pub const FRAME_TERMINATOR: u8 = b'\n';

/// Encode a command into a complete frame (JSON object + `\n`)
///
/// Keys are emitted in sorted order. The firmware looks fields up by name,
/// so order carries no meaning.
///
/// # Examples
///
/// ```
/// use dryer_link::protocol::codec::encode_command;
/// use dryer_link::protocol::types::{Command, Preset};
///
/// let frame = encode_command(&Command::Preset(Preset::Off));
/// assert_eq!(frame, b"{\"preset\":\"OFF\"}\n");
/// ```
pub fn encode_command(command: &Command) -> Vec<u8> {
    let mut object = Map::new();

    match command {
        Command::Preset(preset) => {
            object.insert("preset".to_string(), Value::from(preset.as_str()));
            if let Some(status) = preset.run_status() {
                object.insert("status".to_string(), Value::from(status));
            }
        }
        Command::Custom(fields) => {
            for (field, value) in fields.iter() {
                object.insert(field.wire_name().to_string(), Value::from(value));
            }
        }
    }

    let mut frame = Value::Object(object).to_string().into_bytes();
    frame.push(FRAME_TERMINATOR);
    frame
}

/// Decode one telemetry line
///
/// Accepts `\n`, `\r\n` or no terminator. The three measurement keys are
/// mandatory; `status` and `preset` default to empty strings.
///
/// # Errors
///
/// - `Empty` for a blank line
/// - `Utf8` for bytes that are not UTF-8
/// - `NotObject` for valid JSON that is not an object
/// - `Json` for malformed JSON, wrong value types or missing measurements
pub fn decode_line(line: &[u8]) -> Result<TelemetryReading, DecodeError> {
    let text = std::str::from_utf8(line)?.trim();
    if text.is_empty() {
        return Err(DecodeError::Empty);
    }

    let value: Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(DecodeError::NotObject);
    }

    Ok(serde_json::from_value(value)?)
}
