use crate::device::types::{DiscoveredDevice, Field, SessionCommand};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceRef {
    Index(usize), // 1-based, as printed in the device list
    Id(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Scan,
    Select(DeviceRef),
    Set(Field, String),
    Submit,
    Show,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  scan                          discover nearby devices
  select <number|device-id>     connect to a device and read its user data
  set <first|last|age> <value>  edit a field of the user data
  submit                        write the user data to the connected device
  show                          print the current state
  help                          print this text
  quit                          disconnect and exit";

fn parse_field(name: &str) -> Result<Field, String> {
    match name.to_ascii_lowercase().as_str() {
        "first" | "first-name" | "firstname" => Ok(Field::FirstName),
        "last" | "last-name" | "lastname" => Ok(Field::LastName),
        "age" => Ok(Field::Age),
        other => Err(format!("Unknown field \"{}\"; expected first, last or age", other)),
    }
}

/// Parses one input line; `Ok(None)` for a blank line.
pub fn parse_input(line: &str) -> Result<Option<ConsoleInput>, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let input = match word {
        "" => return Ok(None),
        "scan" => ConsoleInput::Scan,
        "submit" => ConsoleInput::Submit,
        "show" => ConsoleInput::Show,
        "help" | "?" => ConsoleInput::Help,
        "quit" | "exit" => ConsoleInput::Quit,
        "select" => {
            if rest.is_empty() {
                return Err("Usage: select <number|device-id>".to_string());
            }
            match rest.parse::<usize>() {
                Ok(index) => ConsoleInput::Select(DeviceRef::Index(index)),
                Err(_) => ConsoleInput::Select(DeviceRef::Id(rest.to_string())),
            }
        },
        "set" => {
            let (name, value) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            if name.is_empty() {
                return Err("Usage: set <first|last|age> <value>".to_string());
            }
            // an empty value clears the field
            ConsoleInput::Set(parse_field(name)?, value.trim().to_string())
        },
        other => return Err(format!("Unknown command \"{}\"; type help for a list", other)),
    };

    Ok(Some(input))
}

impl DeviceRef {
    pub fn resolve(&self, devices: &[DiscoveredDevice]) -> Option<String> {
        match self {
            DeviceRef::Index(index) => index.checked_sub(1)
                .and_then(|index| devices.get(index))
                .map(|device| device.device_id.clone()),
            DeviceRef::Id(device_id) => Some(device_id.clone()),
        }
    }
}

impl ConsoleInput {
    /// The session intent for this input, if it is one.
    pub fn to_command(&self, devices: &[DiscoveredDevice]) -> Result<Option<SessionCommand>, String> {
        let command = match self {
            ConsoleInput::Scan => SessionCommand::StartScan,
            ConsoleInput::Submit => SessionCommand::Submit,
            ConsoleInput::Set(field, value) => SessionCommand::EditField(*field, value.clone()),
            ConsoleInput::Select(device) => match device.resolve(devices) {
                Some(device_id) => SessionCommand::SelectDevice(device_id),
                None => return Err("No device with that number; run scan first".to_string()),
            },
            ConsoleInput::Show | ConsoleInput::Help | ConsoleInput::Quit => return Ok(None),
        };

        Ok(Some(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(parse_input("  scan "), Ok(Some(ConsoleInput::Scan)));
        assert_eq!(parse_input(""), Ok(None));
        assert_eq!(parse_input("select 2"), Ok(Some(ConsoleInput::Select(DeviceRef::Index(2)))));
        assert_eq!(
            parse_input("select AA:BB:CC"),
            Ok(Some(ConsoleInput::Select(DeviceRef::Id("AA:BB:CC".to_string())))),
        );
        assert_eq!(
            parse_input("set last  van der Berg"),
            Ok(Some(ConsoleInput::Set(Field::LastName, "van der Berg".to_string()))),
        );
        assert_eq!(parse_input("set age"), Ok(Some(ConsoleInput::Set(Field::Age, String::new()))));
    }

    #[test]
    fn reports_bad_input() {
        assert!(parse_input("select").is_err());
        assert!(parse_input("set height 180").is_err());
        assert!(parse_input("connect").is_err());
    }

    #[test]
    fn select_by_number_uses_the_listed_order() {
        let devices = vec![DiscoveredDevice::new("A1", None), DiscoveredDevice::new("B2", None)];

        assert_eq!(
            ConsoleInput::Select(DeviceRef::Index(2)).to_command(&devices),
            Ok(Some(SessionCommand::SelectDevice("B2".to_string()))),
        );
        assert!(ConsoleInput::Select(DeviceRef::Index(0)).to_command(&devices).is_err());
        assert!(ConsoleInput::Select(DeviceRef::Index(3)).to_command(&devices).is_err());
        assert_eq!(ConsoleInput::Show.to_command(&devices), Ok(None));
    }
}
