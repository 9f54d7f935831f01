//! Enum wrapper for transport dispatch.
//!
//! Native `async fn` in traits is not object-safe, so `Box<dyn
//! SerialTransport>` is not an option. [`AnyTransport`] dispatches to the
//! concrete backends instead, and keeps the real serial backend behind the
//! `hardware-serial` feature.
//!
//! # Examples
//!
//! ```
//! use labkey_hardware::devices::AnyTransport;
//! use labkey_hardware::traits::SerialTransport;
//!
//! let transport = AnyTransport::detect(true);
//! assert!(transport.is_mock());
//! assert!(!transport.is_available());
//! ```

use labkey_protocol::{DeviceCommand, Dialect};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::Result;
use crate::mock::{NoopTransport, ScriptedTransport};
#[cfg(feature = "hardware-serial")]
use crate::serial::SerialPortTransport;
use crate::traits::SerialTransport;
use crate::types::{PortInfo, ReaderConnection, TransportEvent};

#[derive(Debug)]
#[non_exhaustive]
pub enum AnyTransport {
    /// OS serial port.
    #[cfg(feature = "hardware-serial")]
    Serial(SerialPortTransport),
    /// Mock mode.
    Noop(NoopTransport),
    /// Driven by a [`ScriptedTransportHandle`](crate::mock::ScriptedTransportHandle).
    Scripted(ScriptedTransport),
}

impl AnyTransport {
    /// Pick the backend for this build.
    ///
    /// Falls back to mock mode, with a warning, when `force_mock` is set or
    /// the crate was built without `hardware-serial`.
    pub fn detect(force_mock: bool) -> Self {
        if force_mock {
            warn!("Serial transport disabled by configuration, running in mock mode");
            return Self::Noop(NoopTransport::with_reason("mock mode forced by configuration"));
        }

        #[cfg(feature = "hardware-serial")]
        {
            info!("Using serialport transport");
            Self::Serial(SerialPortTransport::new())
        }

        #[cfg(not(feature = "hardware-serial"))]
        {
            warn!("Built without serial support, running in mock mode");
            Self::Noop(NoopTransport::with_reason("built without serial support"))
        }
    }

    /// Set the dialect used to encode outbound commands.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        match &mut self {
            #[cfg(feature = "hardware-serial")]
            Self::Serial(transport) => transport.set_dialect(dialect),
            Self::Noop(_) | Self::Scripted(_) => {}
        }
        self
    }

    /// Returns `true` when running without any serial backend.
    pub fn is_mock(&self) -> bool {
        matches!(self, Self::Noop(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            #[cfg(feature = "hardware-serial")]
            Self::Serial(_) => "serial",
            Self::Noop(_) => "mock",
            Self::Scripted(_) => "scripted",
        }
    }
}

impl From<ScriptedTransport> for AnyTransport {
    fn from(transport: ScriptedTransport) -> Self {
        Self::Scripted(transport)
    }
}

impl From<NoopTransport> for AnyTransport {
    fn from(transport: NoopTransport) -> Self {
        Self::Noop(transport)
    }
}

impl SerialTransport for AnyTransport {
    async fn list_ports(&self) -> Vec<PortInfo> {
        match self {
            #[cfg(feature = "hardware-serial")]
            Self::Serial(t) => t.list_ports().await,
            Self::Noop(t) => t.list_ports().await,
            Self::Scripted(t) => t.list_ports().await,
        }
    }

    async fn open(&mut self, path: &str, baud_rate: u32) -> Result<mpsc::Receiver<TransportEvent>> {
        match self {
            #[cfg(feature = "hardware-serial")]
            Self::Serial(t) => t.open(path, baud_rate).await,
            Self::Noop(t) => t.open(path, baud_rate).await,
            Self::Scripted(t) => t.open(path, baud_rate).await,
        }
    }

    async fn write(&mut self, command: &DeviceCommand) -> bool {
        match self {
            #[cfg(feature = "hardware-serial")]
            Self::Serial(t) => t.write(command).await,
            Self::Noop(t) => t.write(command).await,
            Self::Scripted(t) => t.write(command).await,
        }
    }

    async fn close(&mut self) {
        match self {
            #[cfg(feature = "hardware-serial")]
            Self::Serial(t) => t.close().await,
            Self::Noop(t) => t.close().await,
            Self::Scripted(t) => t.close().await,
        }
    }

    fn is_open(&self) -> bool {
        match self {
            #[cfg(feature = "hardware-serial")]
            Self::Serial(t) => t.is_open(),
            Self::Noop(t) => t.is_open(),
            Self::Scripted(t) => t.is_open(),
        }
    }

    fn connection(&self) -> Option<ReaderConnection> {
        match self {
            #[cfg(feature = "hardware-serial")]
            Self::Serial(t) => t.connection(),
            Self::Noop(t) => t.connection(),
            Self::Scripted(t) => t.connection(),
        }
    }

    fn is_available(&self) -> bool {
        match self {
            #[cfg(feature = "hardware-serial")]
            Self::Serial(t) => t.is_available(),
            Self::Noop(t) => t.is_available(),
            Self::Scripted(t) => t.is_available(),
        }
    }
}
