//! Commands sent to the reader.
//!
//! Two firmware dialects exist in the field. The JSON sketch expects
//! `{"cmd":"status"}` objects; the older text sketch expects upper-case
//! keywords such as `STATUS` or `LED:GREEN:1`. Both accept a bare `g` as
//! "read the UID of the card in the field".

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Firmware command dialect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Json,
    Text,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Dialect::Json => write!(f, "json"),
            Dialect::Text => write!(f, "text"),
        }
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Dialect::Json),
            "text" => Ok(Dialect::Text),
            other => Err(format!("unknown dialect {other:?}, expected json or text")),
        }
    }
}

/// Status LED on the reader shield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedColor {
    Green,
    Red,
    Blue,
}

impl LedColor {
    fn as_str(&self) -> &'static str {
        match self {
            LedColor::Green => "green",
            LedColor::Red => "red",
            LedColor::Blue => "blue",
        }
    }
}

/// A command for the reader firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Ask for a status report.
    Status,
    /// Reinitialize the RFID module.
    Reset,
    /// Acknowledge a card read.
    Ack,
    /// Ask the reader to actively look for a card.
    Scan,
    /// Read the UID of the card in the field.
    RequestUid,
    Led { color: LedColor, on: bool },
}

impl DeviceCommand {
    /// Encode the command for the given dialect, without line terminator.
    ///
    /// # Examples
    ///
    /// ```
    /// use labkey_protocol::{DeviceCommand, Dialect, LedColor};
    ///
    /// assert_eq!(DeviceCommand::Status.encode(Dialect::Json), r#"{"cmd":"status"}"#);
    /// assert_eq!(DeviceCommand::Status.encode(Dialect::Text), "STATUS");
    ///
    /// let led = DeviceCommand::Led { color: LedColor::Green, on: true };
    /// assert_eq!(led.encode(Dialect::Text), "LED:GREEN:1");
    /// ```
    pub fn encode(&self, dialect: Dialect) -> String {
        if let DeviceCommand::RequestUid = self {
            return "g".to_string();
        }

        match dialect {
            Dialect::Json => match self {
                DeviceCommand::Led { color, on } => json!({
                    "cmd": "led",
                    "led": color.as_str(),
                    "state": u8::from(*on),
                })
                .to_string(),
                other => json!({ "cmd": other.name() }).to_string(),
            },
            Dialect::Text => match self {
                DeviceCommand::Led { color, on } => format!(
                    "LED:{}:{}",
                    color.as_str().to_ascii_uppercase(),
                    u8::from(*on)
                ),
                other => other.name().to_ascii_uppercase(),
            },
        }
    }

    /// Encode the command with a trailing newline, ready for the wire.
    pub fn encode_line(&self, dialect: Dialect) -> String {
        let mut line = self.encode(dialect);
        line.push('\n');
        line
    }

    /// Lower-case command name, as used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            DeviceCommand::Status => "status",
            DeviceCommand::Reset => "reset",
            DeviceCommand::Ack => "ack",
            DeviceCommand::Scan => "scan",
            DeviceCommand::RequestUid => "request_uid",
            DeviceCommand::Led { .. } => "led",
        }
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(DeviceCommand::Status, r#"{"cmd":"status"}"#, "STATUS")]
    #[case(DeviceCommand::Reset, r#"{"cmd":"reset"}"#, "RESET")]
    #[case(DeviceCommand::Ack, r#"{"cmd":"ack"}"#, "ACK")]
    #[case(DeviceCommand::Scan, r#"{"cmd":"scan"}"#, "SCAN")]
    #[case(DeviceCommand::RequestUid, "g", "g")]
    fn test_encode_dialects(
        #[case] command: DeviceCommand,
        #[case] json: &str,
        #[case] text: &str,
    ) {
        assert_eq!(command.encode(Dialect::Json), json);
        assert_eq!(command.encode(Dialect::Text), text);
    }

    #[test]
    fn test_encode_led() {
        let led = DeviceCommand::Led {
            color: LedColor::Red,
            on: false,
        };
        let value: serde_json::Value = serde_json::from_str(&led.encode(Dialect::Json)).unwrap();
        assert_eq!(value["cmd"], "led");
        assert_eq!(value["led"], "red");
        assert_eq!(value["state"], 0);
        assert_eq!(led.encode(Dialect::Text), "LED:RED:0");
    }

    #[test]
    fn test_encode_line_appends_newline() {
        assert_eq!(DeviceCommand::Ack.encode_line(Dialect::Text), "ACK\n");
        assert_eq!(DeviceCommand::RequestUid.encode_line(Dialect::Json), "g\n");
    }

    #[rstest]
    #[case("json", Dialect::Json)]
    #[case("TEXT", Dialect::Text)]
    #[case(" Json ", Dialect::Json)]
    fn test_dialect_from_str(#[case] input: &str, #[case] expected: Dialect) {
        assert_eq!(input.parse::<Dialect>().unwrap(), expected);
    }

    #[test]
    fn test_dialect_rejects_unknown() {
        assert!("binary".parse::<Dialect>().is_err());
        assert_eq!(Dialect::default(), Dialect::Json);
    }
}
