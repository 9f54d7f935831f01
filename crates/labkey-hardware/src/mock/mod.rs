//! Transports that work without a physical reader.
//!
//! [`NoopTransport`] is what the service runs on when serial support is
//! missing or disabled. [`ScriptedTransport`] is driven programmatically
//! through its [`ScriptedTransportHandle`] and backs tests and demos.

pub mod noop;
pub mod scripted;

pub use noop::NoopTransport;
pub use scripted::{ScriptedTransport, ScriptedTransportHandle};
