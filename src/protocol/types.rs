//! # Dryer Protocol Types
//!
//! Commands the engine sends to the dryer and the telemetry it receives back.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CommandError;

/// Run status sent alongside every preset except `OFF`
pub const PRESET_RUN_STATUS: &str = "RUN";

/// Operating profile selectable on the dryer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    Pla,
    Pet,
    Tpu,
    Off,
}

impl Preset {
    /// All presets in the order they are offered to the operator
    pub const ALL: [Preset; 4] = [Preset::Pla, Preset::Pet, Preset::Tpu, Preset::Off];

    /// Name used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Pla => "PLA",
            Preset::Pet => "PET",
            Preset::Tpu => "TPU",
            Preset::Off => "OFF",
        }
    }

    /// Status the device is asked to enter with this preset
    ///
    /// `OFF` carries no status; the firmware stops on its own.
    pub fn run_status(&self) -> Option<&'static str> {
        match self {
            Preset::Off => None,
            _ => Some(PRESET_RUN_STATUS),
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .into_iter()
            .find(|preset| preset.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown preset '{}' (expected PLA, PET, TPU or OFF)", s.trim()))
    }
}

/// Control fields the firmware accepts in a custom command
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CustomField {
    StepperOn,
    Fan1On,
    Fan2On,
    Debug,
    DryTimer,
    TargetAirTemp,
    TargetBedTemp,
}

impl CustomField {
    pub const ALL: [CustomField; 7] = [
        CustomField::StepperOn,
        CustomField::Fan1On,
        CustomField::Fan2On,
        CustomField::Debug,
        CustomField::DryTimer,
        CustomField::TargetAirTemp,
        CustomField::TargetBedTemp,
    ];

    /// JSON key used on the wire
    pub fn wire_name(&self) -> &'static str {
        match self {
            CustomField::StepperOn => "isStepperOn",
            CustomField::Fan1On => "isFan1On",
            CustomField::Fan2On => "isFan2On",
            CustomField::Debug => "debug",
            CustomField::DryTimer => "dryTimer",
            CustomField::TargetAirTemp => "targetAirTemp",
            CustomField::TargetBedTemp => "targetBedTemp",
        }
    }

    /// Inclusive range the firmware variable behind this field can hold
    ///
    /// Stepper and both fans are booleans, debug is a byte, the dry timer is
    /// a 16-bit unsigned second count.
    pub fn range(&self) -> (i64, i64) {
        match self {
            CustomField::StepperOn | CustomField::Fan1On | CustomField::Fan2On => (0, 1),
            CustomField::Debug => (0, u8::MAX as i64),
            CustomField::DryTimer => (0, u16::MAX as i64),
            CustomField::TargetAirTemp | CustomField::TargetBedTemp => {
                (i16::MIN as i64, i16::MAX as i64)
            }
        }
    }

    /// Whether operator text may carry a fractional part (truncated toward zero)
    pub fn accepts_decimal(&self) -> bool {
        matches!(self, CustomField::TargetAirTemp | CustomField::TargetBedTemp)
    }

    /// Convert operator-entered text into the integer sent on the wire
    ///
    /// Returns `None` if the text is not a number of the right shape or falls
    /// outside [`CustomField::range`].
    pub fn parse_value(&self, text: &str) -> Option<i64> {
        let text = text.trim();

        let value = if self.accepts_decimal() {
            let parsed: f64 = text.parse().ok()?;
            if !parsed.is_finite() {
                return None;
            }
            let truncated = parsed.trunc();
            let (min, max) = self.range();
            if truncated < min as f64 || truncated > max as f64 {
                return None;
            }
            truncated as i64
        } else {
            text.parse::<i64>().ok()?
        };

        let (min, max) = self.range();
        (min..=max).contains(&value).then_some(value)
    }
}

impl fmt::Display for CustomField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for CustomField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CustomField::ALL
            .into_iter()
            .find(|field| field.wire_name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown field '{}'", s.trim()))
    }
}

/// Operator selection for a custom command
///
/// Holds the raw text for every field the operator enabled. Nothing is
/// converted until [`CustomCommand::validate`] runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomCommand {
    entries: BTreeMap<CustomField, String>,
}

impl CustomCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable `field` with the given raw value, replacing any earlier value
    pub fn set(&mut self, field: CustomField, value: impl Into<String>) -> &mut Self {
        self.entries.insert(field, value.into());
        self
    }

    /// Builder form of [`CustomCommand::set`]
    pub fn with(mut self, field: CustomField, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    /// Disable `field`
    pub fn clear(&mut self, field: CustomField) {
        self.entries.remove(&field);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Convert every enabled field, all or nothing
    ///
    /// # Errors
    ///
    /// - `EmptySelection` if no field is enabled
    /// - `InvalidValue` for the first field whose text does not convert
    pub fn validate(&self) -> Result<CustomFields, CommandError> {
        if self.entries.is_empty() {
            return Err(CommandError::EmptySelection);
        }

        let mut values = BTreeMap::new();
        for (&field, text) in &self.entries {
            let value = field.parse_value(text).ok_or_else(|| CommandError::InvalidValue {
                field,
                value: text.clone(),
            })?;
            values.insert(field, value);
        }

        Ok(CustomFields(values))
    }
}

/// Validated custom field set, ready to encode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomFields(BTreeMap<CustomField, i64>);

impl CustomFields {
    pub fn iter(&self) -> impl Iterator<Item = (CustomField, i64)> + '_ {
        self.0.iter().map(|(&field, &value)| (field, value))
    }

    pub fn get(&self, field: CustomField) -> Option<i64> {
        self.0.get(&field).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A command frame bound for the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Preset(Preset),
    Custom(CustomFields),
}

/// Telemetry fields as they appear in a device frame
///
/// The firmware reports more keys than these (targets, timer, fan state);
/// they are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TelemetryReading {
    #[serde(rename = "currentAirTemp")]
    pub air_temp: f64,

    #[serde(rename = "currentBedTemp")]
    pub bed_temp: f64,

    #[serde(rename = "currentAbsHumidity")]
    pub humidity: f64,

    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub preset: String,
}

/// One buffered telemetry sample
///
/// `received_at` is stamped by the engine on arrival; the device sends no
/// clock of its own.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySample {
    pub received_at: DateTime<Utc>,

    /// Air (chamber) temperature in °C
    pub air_temp: f64,

    /// Bed temperature in °C
    pub bed_temp: f64,

    /// Absolute humidity in g/m³
    pub humidity: f64,

    pub status: String,

    pub preset: String,
}

impl TelemetrySample {
    pub fn from_reading(reading: TelemetryReading, received_at: DateTime<Utc>) -> Self {
        Self {
            received_at,
            air_temp: reading.air_temp,
            bed_temp: reading.bed_temp,
            humidity: reading.humidity,
            status: reading.status,
            preset: reading.preset,
        }
    }
}
