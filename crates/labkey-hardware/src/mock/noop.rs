use labkey_protocol::DeviceCommand;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::{HardwareError, Result};
use crate::traits::SerialTransport;
use crate::types::{PortInfo, ReaderConnection, TransportEvent};

/// Transport for mock mode: no ports, every mutating call is a logged no-op.
#[derive(Debug, Clone)]
pub struct NoopTransport {
    reason: String,
}

impl NoopTransport {
    pub fn new() -> Self {
        Self::with_reason("serial support disabled")
    }

    /// Create a no-op transport that reports `reason` when asked to open.
    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl Default for NoopTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialTransport for NoopTransport {
    async fn list_ports(&self) -> Vec<PortInfo> {
        info!("Mock mode: no serial ports available");
        Vec::new()
    }

    async fn open(&mut self, path: &str, _baud_rate: u32) -> Result<mpsc::Receiver<TransportEvent>> {
        info!(port = path, "Mock mode: ignoring request to open serial port");
        Err(HardwareError::unavailable(self.reason.clone()))
    }

    async fn write(&mut self, command: &DeviceCommand) -> bool {
        warn!(command = %command, "Mock mode: cannot send command");
        false
    }

    async fn close(&mut self) {}

    fn is_open(&self) -> bool {
        false
    }

    fn connection(&self) -> Option<ReaderConnection> {
        None
    }

    fn is_available(&self) -> bool {
        false
    }
}
