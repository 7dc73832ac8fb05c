//! # Operator Console
//!
//! Parses operator input lines for the headless binary.
//!
//! ```text
//! preset PLA
//! set dryTimer=3600 targetAirTemp=50
//! status
//! history
//! quit
//! ```

use std::fmt;

use crate::protocol::types::{CustomCommand, CustomField, Preset};

/// One parsed operator request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Preset(Preset),
    Custom(CustomCommand),
    Status,
    History,
    Help,
    Quit,
}

/// Why an input line was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ParseError {}

/// Usage text printed for `help` and after a rejected line
pub const HELP: &str = "\
commands:
  preset <PLA|PET|TPU|OFF>          select a drying preset
  set <field>=<value> [...]         send custom values
                                    fields: isStepperOn isFan1On isFan2On debug
                                            dryTimer targetAirTemp targetBedTemp
  status                            show link state and latest reading
  history                           print the telemetry window as JSON lines
  quit                              stop and exit";

/// Parse one operator line
///
/// Returns `Ok(None)` for blank lines. Values for `set` are kept as text;
/// they are validated when the command is sent.
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, ParseError> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "preset" => {
            let name = words
                .next()
                .ok_or_else(|| ParseError("preset needs a name".to_string()))?;
            ConsoleCommand::Preset(name.parse().map_err(ParseError)?)
        }
        "set" => {
            // An empty selection is passed through; the dispatcher reports it
            let mut custom = CustomCommand::new();
            for pair in words.by_ref() {
                let (name, value) = pair
                    .split_once('=')
                    .ok_or_else(|| ParseError(format!("expected field=value, got '{}'", pair)))?;
                let field: CustomField = name.parse().map_err(ParseError)?;
                custom.set(field, value);
            }
            ConsoleCommand::Custom(custom)
        }
        "status" => ConsoleCommand::Status,
        "history" => ConsoleCommand::History,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(ParseError(format!("unknown command '{}'", other))),
    };

    if let Some(extra) = words.next() {
        return Err(ParseError(format!("unexpected argument '{}'", extra)));
    }

    Ok(Some(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_line() {
        assert_eq!(parse_line("   "), Ok(None));
    }

    #[test]
    fn test_preset() {
        assert_eq!(parse_line("preset pla"), Ok(Some(ConsoleCommand::Preset(Preset::Pla))));
        assert_eq!(parse_line("PRESET OFF"), Ok(Some(ConsoleCommand::Preset(Preset::Off))));
        assert!(parse_line("preset").is_err());
        assert!(parse_line("preset ABS").is_err());
        assert!(parse_line("preset PLA PET").is_err());
    }

    #[test]
    fn test_set_collects_fields() {
        let expected = CustomCommand::new()
            .with(CustomField::DryTimer, "3600")
            .with(CustomField::TargetAirTemp, "50.5");

        assert_eq!(
            parse_line("set dryTimer=3600 targetairtemp=50.5"),
            Ok(Some(ConsoleCommand::Custom(expected)))
        );
    }

    #[test]
    fn test_set_keeps_bad_values_for_validation() {
        let expected = CustomCommand::new().with(CustomField::Fan1On, "yes");
        assert_eq!(
            parse_line("set isFan1On=yes"),
            Ok(Some(ConsoleCommand::Custom(expected)))
        );
    }

    #[test]
    fn test_set_without_fields_is_empty_selection() {
        assert_eq!(
            parse_line("set"),
            Ok(Some(ConsoleCommand::Custom(CustomCommand::new())))
        );
    }

    #[test]
    fn test_set_rejects_unknown_field_and_bad_syntax() {
        assert!(parse_line("set heater=1").is_err());
        assert!(parse_line("set dryTimer 3600").is_err());
    }

    #[test]
    fn test_simple_verbs() {
        assert_eq!(parse_line("status"), Ok(Some(ConsoleCommand::Status)));
        assert_eq!(parse_line("history"), Ok(Some(ConsoleCommand::History)));
        assert_eq!(parse_line("?"), Ok(Some(ConsoleCommand::Help)));
        assert_eq!(parse_line("exit"), Ok(Some(ConsoleCommand::Quit)));
        assert!(parse_line("status now").is_err());
        assert!(parse_line("reboot").is_err());
    }
}
