//! Scripted serial transport.
//!
//! Plays the reader firmware from test code: the handle injects lines,
//! simulates unplugging, makes opens fail, and records every command the
//! service wrote.

use std::sync::{Arc, Mutex, MutexGuard};

use labkey_protocol::{DeviceCommand, Dialect};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{HardwareError, Result};
use crate::traits::SerialTransport;
use crate::types::{PortInfo, ReaderConnection, TransportEvent};

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct ScriptedState {
    ports: Vec<PortInfo>,
    connection: Option<ReaderConnection>,
    events_tx: Option<mpsc::Sender<TransportEvent>>,
    written: Vec<DeviceCommand>,
    open_attempts: Vec<String>,
    failing_opens: usize,
}

fn lock(state: &Mutex<ScriptedState>) -> MutexGuard<'_, ScriptedState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Transport half, handed to the reader service.
///
/// # Examples
///
/// ```
/// use labkey_hardware::mock::ScriptedTransport;
/// use labkey_hardware::traits::SerialTransport;
/// use labkey_hardware::TransportEvent;
///
/// #[tokio::main]
/// async fn main() -> labkey_hardware::Result<()> {
///     let (mut transport, handle) = ScriptedTransport::new();
///
///     let mut events = transport.open("/dev/ttyACM0", 9600).await?;
///     handle.send_line("READER_READY").await?;
///
///     assert_eq!(events.recv().await, Some(TransportEvent::Line("READER_READY".into())));
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptedState>>,
}

impl ScriptedTransport {
    /// Create a transport and the handle that drives it.
    pub fn new() -> (Self, ScriptedTransportHandle) {
        let state = Arc::new(Mutex::new(ScriptedState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            ScriptedTransportHandle { state },
        )
    }
}

impl SerialTransport for ScriptedTransport {
    async fn list_ports(&self) -> Vec<PortInfo> {
        lock(&self.state).ports.clone()
    }

    async fn open(&mut self, path: &str, baud_rate: u32) -> Result<mpsc::Receiver<TransportEvent>> {
        let mut state = lock(&self.state);
        state.connection = None;
        state.events_tx = None;
        state.open_attempts.push(path.to_string());

        if state.failing_opens > 0 {
            state.failing_opens -= 1;
            debug!(port = path, "Scripted open failure");
            return Err(HardwareError::port_not_found(path));
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        state.events_tx = Some(tx);
        state.connection = Some(ReaderConnection::new(path, baud_rate));
        info!(port = path, baud_rate, "Scripted port opened");
        Ok(rx)
    }

    async fn write(&mut self, command: &DeviceCommand) -> bool {
        let mut state = lock(&self.state);
        if state.connection.is_none() {
            warn!(command = %command, "Cannot send command - port not open");
            return false;
        }
        state.written.push(*command);
        true
    }

    async fn close(&mut self) {
        let mut state = lock(&self.state);
        state.connection = None;
        state.events_tx = None;
    }

    fn is_open(&self) -> bool {
        lock(&self.state).connection.is_some()
    }

    fn connection(&self) -> Option<ReaderConnection> {
        lock(&self.state).connection.clone()
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Control half of a [`ScriptedTransport`].
///
/// Cloneable; every clone drives the same transport.
#[derive(Debug, Clone)]
pub struct ScriptedTransportHandle {
    state: Arc<Mutex<ScriptedState>>,
}

impl ScriptedTransportHandle {
    /// Ports returned by `list_ports`.
    pub fn set_ports(&self, ports: Vec<PortInfo>) {
        lock(&self.state).ports = ports;
    }

    /// Make the next `count` opens fail with `PortNotFound`.
    pub fn fail_next_opens(&self, count: usize) {
        lock(&self.state).failing_opens = count;
    }

    /// Deliver a line as if the reader had printed it.
    ///
    /// # Errors
    ///
    /// Returns `NotOpen` if no port is open or the service dropped the
    /// receiving end.
    pub async fn send_line(&self, line: &str) -> Result<()> {
        self.send(TransportEvent::Line(line.to_string())).await
    }

    /// Simulate the device closing the port (unplugged, board reset).
    pub async fn disconnect(&self) -> Result<()> {
        let tx = self.take_sender()?;
        tx.send(TransportEvent::Closed)
            .await
            .map_err(|_| HardwareError::NotOpen)
    }

    /// Simulate a port failure.
    pub async fn fail(&self, message: &str) -> Result<()> {
        let tx = self.take_sender()?;
        tx.send(TransportEvent::Error(message.to_string()))
            .await
            .map_err(|_| HardwareError::NotOpen)
    }

    /// Commands written so far, in order.
    pub fn written(&self) -> Vec<DeviceCommand> {
        lock(&self.state).written.clone()
    }

    /// Commands written so far, encoded as they would appear on the wire.
    pub fn written_lines(&self, dialect: Dialect) -> Vec<String> {
        lock(&self.state)
            .written
            .iter()
            .map(|command| command.encode(dialect))
            .collect()
    }

    pub fn clear_written(&self) {
        lock(&self.state).written.clear();
    }

    /// Paths of every open attempt, successful or not.
    pub fn open_attempts(&self) -> Vec<String> {
        lock(&self.state).open_attempts.clone()
    }

    pub fn is_open(&self) -> bool {
        lock(&self.state).connection.is_some()
    }

    async fn send(&self, event: TransportEvent) -> Result<()> {
        let tx = lock(&self.state)
            .events_tx
            .clone()
            .ok_or(HardwareError::NotOpen)?;
        tx.send(event).await.map_err(|_| HardwareError::NotOpen)
    }

    /// Detach the connection and return its sender for a final event.
    fn take_sender(&self) -> Result<mpsc::Sender<TransportEvent>> {
        let mut state = lock(&self.state);
        state.connection = None;
        state.events_tx.take().ok_or(HardwareError::NotOpen)
    }
}
