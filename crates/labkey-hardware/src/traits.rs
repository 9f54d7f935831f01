//! Serial transport trait.
//!
//! Uses native `async fn` in traits (Edition 2024), so the trait is not
//! object-safe; see [`AnyTransport`](crate::devices::AnyTransport) for
//! dispatch.

#![allow(async_fn_in_trait)]

use labkey_protocol::DeviceCommand;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::{PortInfo, ReaderConnection, TransportEvent};

/// A line-oriented serial link to the card reader.
///
/// Implementations own at most one open connection at a time.
///
/// # Examples
///
/// ```no_run
/// use labkey_hardware::traits::SerialTransport;
/// use labkey_hardware::{Result, TransportEvent};
/// use labkey_protocol::DeviceCommand;
///
/// async fn first_line<T: SerialTransport>(transport: &mut T) -> Result<Option<String>> {
///     let mut events = transport.open("/dev/ttyACM0", 9600).await?;
///     transport.write(&DeviceCommand::Status).await;
///
///     match events.recv().await {
///         Some(TransportEvent::Line(line)) => Ok(Some(line)),
///         _ => Ok(None),
///     }
/// }
/// ```
pub trait SerialTransport: Send {
    /// Enumerate serial ports. Never fails; enumeration problems are logged
    /// and yield an empty list.
    async fn list_ports(&self) -> Vec<PortInfo>;

    /// Open `path` at `baud_rate`, closing any previous connection first.
    ///
    /// # Errors
    ///
    /// Returns an error if the port is missing, busy, not permitted, or the
    /// transport has no serial support.
    async fn open(&mut self, path: &str, baud_rate: u32) -> Result<mpsc::Receiver<TransportEvent>>;

    /// Encode and send a command. Returns `false` (and logs) when no port is
    /// open or the write failed.
    async fn write(&mut self, command: &DeviceCommand) -> bool;

    /// Close the connection. Idempotent.
    async fn close(&mut self);

    fn is_open(&self) -> bool;

    fn connection(&self) -> Option<ReaderConnection>;

    /// Whether this transport can reach real hardware at all.
    fn is_available(&self) -> bool;
}
