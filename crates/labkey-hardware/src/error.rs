//! Error types for serial transport operations.
//!
//! Opening a port is the only transport operation that reports failure to
//! its caller; writes and closes log and degrade instead.

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur while talking to the serial hardware.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// The requested port does not exist.
    #[error("Port not found: {port}")]
    PortNotFound { port: String },

    /// The port exists but another process holds it.
    #[error("Port busy: {port}")]
    PortBusy { port: String },

    /// The process may not open the port (missing `dialout` group, etc).
    #[error("Permission denied: {port}")]
    PermissionDenied { port: String },

    /// Any other open failure.
    #[error("Failed to open {port}: {reason}")]
    OpenFailed { port: String, reason: String },

    /// Serial support is not available in this build or was disabled.
    #[error("Serial transport unavailable: {reason}")]
    Unavailable { reason: String },

    /// An operation needed an open port.
    #[error("Port not open")]
    NotOpen,

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    pub fn port_not_found(port: impl Into<String>) -> Self {
        Self::PortNotFound { port: port.into() }
    }

    pub fn port_busy(port: impl Into<String>) -> Self {
        Self::PortBusy { port: port.into() }
    }

    pub fn permission_denied(port: impl Into<String>) -> Self {
        Self::PermissionDenied { port: port.into() }
    }

    pub fn open_failed(port: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::OpenFailed {
            port: port.into(),
            reason: reason.into(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error means "no serial support at all" rather
    /// than a problem with one port.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl From<HardwareError> for labkey_core::Error {
    fn from(error: HardwareError) -> Self {
        let message = error.to_string();
        match error {
            HardwareError::Unavailable { reason } => labkey_core::Error::TransportUnavailable(reason),
            HardwareError::PortNotFound { port }
            | HardwareError::PortBusy { port }
            | HardwareError::PermissionDenied { port }
            | HardwareError::OpenFailed { port, .. } => labkey_core::Error::port_open(port, message),
            HardwareError::NotOpen => labkey_core::Error::ReaderFault(message),
            HardwareError::Io(io) => labkey_core::Error::Io(io),
        }
    }
}
