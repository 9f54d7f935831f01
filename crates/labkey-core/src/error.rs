use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Transport errors
    #[error("Serial transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Failed to open port {port}: {reason}")]
    PortOpen { port: String, reason: String },

    // Protocol errors
    #[error("Unrecognized reader line: {0}")]
    ParseAnomaly(String),

    #[error("Reader reported an error: {0}")]
    ReaderFault(String),

    // Command errors
    #[error("No card read within {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("A card read is already in progress")]
    Conflict,

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid card id: {0}")]
    InvalidCardId(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Card reader service is not running")]
    ServiceStopped,

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a port open error.
    pub fn port_open(port: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PortOpen {
            port: port.into(),
            reason: reason.into(),
        }
    }

    /// Create a timeout error from a duration.
    pub fn timeout(duration: std::time::Duration) -> Self {
        Self::Timeout {
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Returns `true` for errors caused by the caller's input rather than
    /// the reader or the transport.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::MissingField(_) | Self::InvalidCardId(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_port_open_display() {
        let error = Error::port_open("/dev/ttyACM0", "Permission denied");
        assert_eq!(
            error.to_string(),
            "Failed to open port /dev/ttyACM0: Permission denied"
        );
    }

    #[test]
    fn test_timeout_from_duration() {
        let error = Error::timeout(Duration::from_millis(1500));
        assert!(matches!(error, Error::Timeout { duration_ms: 1500 }));
        assert_eq!(error.to_string(), "No card read within 1500ms");
    }

    #[test]
    fn test_validation_classification() {
        assert!(Error::MissingField("cardId".into()).is_validation());
        assert!(Error::InvalidCardId("".into()).is_validation());
        assert!(!Error::Conflict.is_validation());
        assert!(!Error::ServiceStopped.is_validation());
    }
}
