//! Core constants for the card reader bridge.
//!
//! Defaults for the serial link, the reconnection policy, and the command
//! surface timing. Every value here can be overridden through
//! `ReaderConfig`; these are the values used when nothing is configured.
//!
//! # Usage
//!
//! ```
//! use labkey_core::constants::*;
//! use std::time::Duration;
//!
//! let backoff = Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS * 2);
//! assert_eq!(backoff, Duration::from_secs(10));
//! ```

// ============================================================================
// Serial Link
// ============================================================================

/// Default baud rate for the Arduino RFID sketch.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// USB vendor id assigned to Arduino boards (`2341`).
///
/// Used during port discovery when no explicit port is configured.
pub const ARDUINO_VENDOR_ID: u16 = 0x2341;

/// Manufacturer string reported by genuine Arduino boards.
pub const ARDUINO_MANUFACTURER: &str = "Arduino";

/// Maximum accepted length of a single line from the reader, in bytes.
///
/// Longer lines are discarded. The firmware never emits more than a few
/// dozen characters per line.
pub const MAX_LINE_LENGTH: usize = 1024;

/// Delay between opening the port and sending the first `status` query.
///
/// Opening the port resets most Arduino boards; the sketch needs a moment
/// before it listens on the serial line again.
pub const DEFAULT_HANDSHAKE_DELAY_MS: u64 = 1000;

// ============================================================================
// Reconnection
// ============================================================================

/// Maximum number of automatic reconnect attempts before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Base delay for linear reconnect backoff (`base * attempt`).
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5000;

/// Interval of the liveness status probe.
pub const DEFAULT_STATUS_INTERVAL_MS: u64 = 10_000;

// ============================================================================
// Card Reads
// ============================================================================

/// A card scanned within this window satisfies `read_card` immediately.
pub const RECENT_CARD_WINDOW_MS: u64 = 5000;

/// Default wait for `read_card` when the caller gives no timeout.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 30_000;

/// Card type reported when the reader does not name one.
pub const DEFAULT_CARD_TYPE: &str = "MIFARE";

/// How long a feedback LED stays lit after a card read or reader error.
pub const DEFAULT_LED_FLASH_MS: u64 = 2000;

/// Minimum number of hex digits for a bare UID to be recognized.
pub const MIN_UID_HEX_DIGITS: usize = 8;

/// Minimum card id length after normalization.
pub const MIN_CARD_ID_LENGTH: usize = 1;

/// Maximum card id length after normalization.
pub const MAX_CARD_ID_LENGTH: usize = 32;

/// Separators stripped from card ids during normalization.
pub const CARD_ID_SEPARATORS: [char; 3] = [':', ' ', '-'];

// ============================================================================
// Event Bridge
// ============================================================================

/// Capacity of the event broadcast channel.
///
/// A subscriber that falls this many events behind is dropped.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the command channel into the reader task.
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;
