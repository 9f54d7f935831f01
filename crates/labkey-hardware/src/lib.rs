//! Serial transport layer for the card reader bridge.
//!
//! The reader service talks to the Arduino through the [`SerialTransport`]
//! trait. Three backends implement it:
//!
//! - [`SerialPortTransport`](serial::SerialPortTransport): real OS serial
//!   ports (feature `hardware-serial`, on by default)
//! - [`NoopTransport`](mock::NoopTransport): mock mode, used when serial
//!   support is missing or disabled
//! - [`ScriptedTransport`](mock::ScriptedTransport): driven from code, for
//!   tests and demos
//!
//! [`AnyTransport`] selects between them at runtime.
//!
//! # Thread Safety
//!
//! Transports are `Send` and owned by a single task; the scripted handle is
//! `Clone + Send + Sync` so tests can drive it from anywhere.

pub mod devices;
pub mod error;
pub mod mock;
#[cfg(feature = "hardware-serial")]
pub mod serial;
pub mod traits;
pub mod types;

pub use devices::AnyTransport;
pub use error::{HardwareError, Result};
pub use traits::SerialTransport;
pub use types::{PortInfo, ReaderConnection, TransportEvent};
