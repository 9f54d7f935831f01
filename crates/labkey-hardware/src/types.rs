//! Common types for serial transports.

use labkey_core::constants::{ARDUINO_MANUFACTURER, ARDUINO_VENDOR_ID};
use serde::{Deserialize, Serialize};

/// A serial port found during enumeration.
///
/// USB ids are rendered as 4-digit lowercase hex strings (`"2341"`), the
/// way operating systems and udev print them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortInfo {
    pub path: String,
    pub port_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
}

impl PortInfo {
    /// A port with no USB metadata.
    pub fn new(path: impl Into<String>, port_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            port_type: port_type.into(),
            manufacturer: None,
            vendor_id: None,
            product_id: None,
            serial_number: None,
            product: None,
        }
    }

    /// A USB port with the given vendor and product ids.
    ///
    /// # Examples
    ///
    /// ```
    /// use labkey_hardware::PortInfo;
    ///
    /// let port = PortInfo::usb("/dev/ttyACM0", 0x2341, 0x0043);
    /// assert_eq!(port.vendor_id.as_deref(), Some("2341"));
    /// assert!(port.is_arduino());
    /// ```
    pub fn usb(path: impl Into<String>, vid: u16, pid: u16) -> Self {
        Self {
            vendor_id: Some(format!("{vid:04x}")),
            product_id: Some(format!("{pid:04x}")),
            ..Self::new(path, "usb")
        }
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    /// Whether this port looks like an Arduino board.
    pub fn is_arduino(&self) -> bool {
        let by_manufacturer = self
            .manufacturer
            .as_deref()
            .is_some_and(|m| m.contains(ARDUINO_MANUFACTURER));
        let by_vendor = self
            .vendor_id
            .as_deref()
            .is_some_and(|v| v.to_ascii_lowercase().contains(&format!("{ARDUINO_VENDOR_ID:04x}")));
        by_manufacturer || by_vendor
    }
}

/// The open serial connection, owned by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderConnection {
    pub port: String,
    pub baud_rate: u32,
    pub is_open: bool,
}

impl ReaderConnection {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            is_open: true,
        }
    }
}

/// Something that happened on an open port.
///
/// A successful `open` is itself the "opened" signal; after that the
/// transport only reports lines and the end of the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One line of reader output, without its terminator.
    Line(String),
    /// The port was closed from the device side (unplugged, reset).
    Closed,
    /// The port failed; the connection is gone.
    Error(String),
}

impl TransportEvent {
    /// Returns `true` if the connection is gone after this event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportEvent::Closed | TransportEvent::Error(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_port_info_serialization() {
        let port = PortInfo::usb("/dev/ttyACM0", 0x2341, 0x43).with_manufacturer("Arduino LLC");
        let json = serde_json::to_value(&port).unwrap();
        assert_eq!(json["path"], "/dev/ttyACM0");
        assert_eq!(json["portType"], "usb");
        assert_eq!(json["vendorId"], "2341");
        assert_eq!(json["productId"], "0043");
        assert_eq!(json["manufacturer"], "Arduino LLC");
        assert!(json.get("serialNumber").is_none());
    }

    #[rstest]
    #[case(PortInfo::usb("/dev/ttyACM0", 0x2341, 0x0043), true)]
    #[case(PortInfo::usb("/dev/ttyUSB0", 0x1a86, 0x7523).with_manufacturer("Arduino (www.arduino.cc)"), true)]
    #[case(PortInfo::usb("/dev/ttyUSB1", 0x0403, 0x6001).with_manufacturer("FTDI"), false)]
    #[case(PortInfo::new("/dev/ttyS0", "unknown"), false)]
    fn test_is_arduino(#[case] port: PortInfo, #[case] expected: bool) {
        assert_eq!(port.is_arduino(), expected);
    }

    #[test]
    fn test_transport_event_terminal() {
        assert!(TransportEvent::Closed.is_terminal());
        assert!(TransportEvent::Error("unplugged".into()).is_terminal());
        assert!(!TransportEvent::Line("READER_READY".into()).is_terminal());
    }

    #[test]
    fn test_reader_connection_new() {
        let connection = ReaderConnection::new("COM3", 9600);
        assert!(connection.is_open);
        assert_eq!(connection.baud_rate, 9600);
    }
}
