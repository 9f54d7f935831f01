//! Line protocol spoken by the Arduino RFID reader.
//!
//! The firmware has gone through several revisions and emits a mix of JSON
//! objects and free-form text on the serial line. This crate turns each line
//! into a [`ParsedMessage`] and encodes the [`DeviceCommand`]s sent back.

pub mod codec;
pub mod command;
pub mod message;
pub mod parser;

pub use codec::ReaderLineCodec;
pub use command::{DeviceCommand, Dialect, LedColor};
pub use message::{CardPresence, ParsedMessage, StatusReport};
pub use parser::{classify_card, parse_line};
