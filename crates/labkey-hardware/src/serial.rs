//! Real serial ports through the `serialport` crate.
//!
//! `serialport` is a blocking API. Opening and writing run on the blocking
//! pool; reading runs on a dedicated thread that frames bytes with
//! [`ReaderLineCodec`] and forwards lines over a bounded channel.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::BytesMut;
use labkey_protocol::{DeviceCommand, Dialect, ReaderLineCodec};
use serialport::{SerialPort, SerialPortType};
use tokio::sync::mpsc;
use tokio_util::codec::Decoder;
use tracing::{debug, error, info, warn};

use crate::error::{HardwareError, Result};
use crate::traits::SerialTransport;
use crate::types::{PortInfo, ReaderConnection, TransportEvent};

/// Read timeout of the port; bounds how long the reader thread takes to
/// notice a close.
const READ_POLL_TIMEOUT: Duration = Duration::from_millis(100);

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Retry interval of the reader thread while the line channel is full.
const SEND_RETRY_INTERVAL: Duration = Duration::from_millis(10);

type SharedPort = Arc<Mutex<Box<dyn SerialPort>>>;

struct OpenPort {
    connection: ReaderConnection,
    writer: SharedPort,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl Drop for OpenPort {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Serial transport backed by an OS serial port.
pub struct SerialPortTransport {
    dialect: Dialect,
    port: Option<OpenPort>,
}

impl SerialPortTransport {
    pub fn new() -> Self {
        Self::with_dialect(Dialect::default())
    }

    pub fn with_dialect(dialect: Dialect) -> Self {
        Self { dialect, port: None }
    }

    pub fn set_dialect(&mut self, dialect: Dialect) {
        self.dialect = dialect;
    }

    /// Stop the reader thread and wait until it has released the port.
    ///
    /// Ports are opened exclusively, so the same path cannot be reopened
    /// before the thread drops its handle.
    async fn close_port(&mut self) {
        let Some(mut open) = self.port.take() else {
            return;
        };
        open.stop.store(true, Ordering::SeqCst);

        if let Some(reader) = open.reader.take()
            && let Err(e) = tokio::task::spawn_blocking(move || reader.join()).await
        {
            error!(
                port = %open.connection.port,
                error = %e,
                "Failed to join serial reader thread"
            );
        }
        info!(port = %open.connection.port, "Serial port closed");
    }
}

impl Default for SerialPortTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SerialPortTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPortTransport")
            .field("dialect", &self.dialect)
            .field("connection", &self.port.as_ref().map(|p| &p.connection))
            .finish()
    }
}

impl SerialTransport for SerialPortTransport {
    async fn list_ports(&self) -> Vec<PortInfo> {
        let ports = match tokio::task::spawn_blocking(serialport::available_ports).await {
            Ok(Ok(ports)) => ports,
            Ok(Err(e)) => {
                error!(error = %e, "Failed to list serial ports");
                return Vec::new();
            }
            Err(e) => {
                error!(error = %e, "Serial port enumeration task failed");
                return Vec::new();
            }
        };

        let ports: Vec<PortInfo> = ports.into_iter().map(port_info).collect();
        info!(count = ports.len(), "Found serial ports");
        ports
    }

    async fn open(&mut self, path: &str, baud_rate: u32) -> Result<mpsc::Receiver<TransportEvent>> {
        self.close_port().await;

        info!(port = path, baud_rate, "Opening serial port");
        let owned_path = path.to_string();
        let reader = tokio::task::spawn_blocking(move || {
            serialport::new(&owned_path, baud_rate)
                .timeout(READ_POLL_TIMEOUT)
                .open()
        })
        .await
        .map_err(|e| HardwareError::open_failed(path, e.to_string()))?
        .map_err(|e| classify_open_error(path, e))?;

        let writer = reader
            .try_clone()
            .map_err(|e| classify_open_error(path, e))?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let thread_path = path.to_string();

        let reader = std::thread::Builder::new()
            .name(format!("serial-reader:{path}"))
            .spawn(move || read_loop(reader, tx, thread_stop, thread_path))?;

        self.port = Some(OpenPort {
            connection: ReaderConnection::new(path, baud_rate),
            writer: Arc::new(Mutex::new(writer)),
            stop,
            reader: Some(reader),
        });

        info!(port = path, baud_rate, "Serial port opened");
        Ok(rx)
    }

    async fn write(&mut self, command: &DeviceCommand) -> bool {
        let Some(open) = self.port.as_ref().filter(|p| !p.stop.load(Ordering::SeqCst)) else {
            warn!(command = %command, "Cannot send command - port not open");
            return false;
        };

        let line = command.encode_line(self.dialect);
        let writer = Arc::clone(&open.writer);
        let result = tokio::task::spawn_blocking(move || -> io::Result<()> {
            let mut port = writer.lock().unwrap_or_else(|e| e.into_inner());
            port.write_all(line.as_bytes())?;
            port.flush()
        })
        .await;

        match result {
            Ok(Ok(())) => {
                debug!(command = %command, "Sent command");
                true
            }
            Ok(Err(e)) => {
                error!(command = %command, error = %e, "Error sending command");
                false
            }
            Err(e) => {
                error!(command = %command, error = %e, "Serial write task failed");
                false
            }
        }
    }

    async fn close(&mut self) {
        self.close_port().await;
    }

    fn is_open(&self) -> bool {
        self.port
            .as_ref()
            .is_some_and(|p| !p.stop.load(Ordering::SeqCst))
    }

    fn connection(&self) -> Option<ReaderConnection> {
        self.port.as_ref().map(|p| ReaderConnection {
            is_open: !p.stop.load(Ordering::SeqCst),
            ..p.connection.clone()
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

fn read_loop(
    mut port: Box<dyn SerialPort>,
    tx: mpsc::Sender<TransportEvent>,
    stop: Arc<AtomicBool>,
    path: String,
) {
    let mut codec = ReaderLineCodec::new();
    let mut buffer = BytesMut::with_capacity(1024);
    let mut chunk = [0u8; 256];

    while !stop.load(Ordering::SeqCst) {
        match port.read(&mut chunk) {
            Ok(0) => {
                info!(port = %path, "Serial port closed by device");
                stop.store(true, Ordering::SeqCst);
                let _ = tx.try_send(TransportEvent::Closed);
                return;
            }
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                loop {
                    match codec.decode(&mut buffer) {
                        Ok(Some(line)) => {
                            if !forward(&tx, TransportEvent::Line(line), &stop) {
                                debug!(port = %path, "Line receiver gone, stopping reader thread");
                                return;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!(port = %path, error = %e, "Discarding undecodable serial data");
                            buffer.clear();
                            break;
                        }
                    }
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => continue,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                if stop.swap(true, Ordering::SeqCst) {
                    return;
                }
                error!(port = %path, error = %e, "Serial port error");
                let _ = tx.try_send(TransportEvent::Error(e.to_string()));
                return;
            }
        }
    }
}

/// Send `event`, waiting while the channel is full. Gives up once the
/// receiver is gone or the port is being closed, so a close never waits on
/// a consumer that stopped reading.
fn forward(
    tx: &mpsc::Sender<TransportEvent>,
    mut event: TransportEvent,
    stop: &AtomicBool,
) -> bool {
    loop {
        match tx.try_send(event) {
            Ok(()) => return true,
            Err(mpsc::error::TrySendError::Closed(_)) => return false,
            Err(mpsc::error::TrySendError::Full(pending)) => {
                if stop.load(Ordering::SeqCst) {
                    return false;
                }
                event = pending;
                std::thread::sleep(SEND_RETRY_INTERVAL);
            }
        }
    }
}

fn classify_open_error(path: &str, error: serialport::Error) -> HardwareError {
    let description = error.description.to_ascii_lowercase();
    if description.contains("busy") || description.contains("exclusive lock") {
        return HardwareError::port_busy(path);
    }

    match error.kind() {
        serialport::ErrorKind::NoDevice => HardwareError::port_not_found(path),
        serialport::ErrorKind::Io(io::ErrorKind::NotFound) => HardwareError::port_not_found(path),
        serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied) => {
            HardwareError::permission_denied(path)
        }
        _ => HardwareError::open_failed(path, error.description),
    }
}

fn port_info(port: serialport::SerialPortInfo) -> PortInfo {
    match port.port_type {
        SerialPortType::UsbPort(usb) => PortInfo {
            manufacturer: usb.manufacturer,
            serial_number: usb.serial_number,
            product: usb.product,
            ..PortInfo::usb(port.port_name, usb.vid, usb.pid)
        },
        SerialPortType::BluetoothPort => PortInfo::new(port.port_name, "bluetooth"),
        SerialPortType::PciPort => PortInfo::new(port.port_name, "pci"),
        SerialPortType::Unknown => PortInfo::new(port.port_name, "unknown"),
    }
}
