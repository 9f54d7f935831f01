use crate::{
    Result,
    constants::{
        CARD_ID_SEPARATORS, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY_MS,
        MAX_CARD_ID_LENGTH, MIN_CARD_ID_LENGTH,
    },
    error::Error,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use subtle::ConstantTimeEq;

/// Normalized card identifier.
///
/// Readers report the same UID in several shapes (`a6:86:05:88`,
/// `A6 86 05 88`, `A6860588`). The identifier is normalized once at the
/// boundary: separators are stripped and letters are uppercased, so all
/// shapes compare equal.
///
/// # Security
/// Comparison is constant-time, since card ids are used to authorize
/// equipment checkout downstream.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CardId(String);

impl CardId {
    /// Create a new card id, normalizing and validating it.
    ///
    /// # Errors
    /// Returns `Error::InvalidCardId` if, after normalization:
    /// - the id is empty or longer than 32 characters
    /// - the id contains anything other than ASCII letters and digits
    ///
    /// # Examples
    /// ```
    /// use labkey_core::CardId;
    ///
    /// let id = CardId::new("a6:86:05:88").unwrap();
    /// assert_eq!(id.as_str(), "A6860588");
    /// assert_eq!(id, CardId::new("A6860588").unwrap());
    /// ```
    pub fn new(raw: &str) -> Result<Self> {
        let normalized = Self::normalize(raw);

        let len = normalized.len();
        if !(MIN_CARD_ID_LENGTH..=MAX_CARD_ID_LENGTH).contains(&len) {
            return Err(Error::InvalidCardId(format!(
                "Card id must be {MIN_CARD_ID_LENGTH}-{MAX_CARD_ID_LENGTH} chars, got {len}"
            )));
        }

        if !normalized.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidCardId(format!(
                "Card id must be alphanumeric, got {raw:?}"
            )));
        }

        Ok(CardId(normalized))
    }

    /// Strip separators and uppercase, without validating.
    #[must_use]
    pub fn normalize(raw: &str) -> String {
        raw.trim()
            .chars()
            .filter(|c| !CARD_ID_SEPARATORS.contains(c))
            .collect::<String>()
            .to_ascii_uppercase()
    }

    /// Get the card id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the id consists only of hex digits.
    #[must_use]
    pub fn is_hex(&self) -> bool {
        self.0.chars().all(|c| c.is_ascii_hexdigit())
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CardId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CardId::new(s)
    }
}

impl TryFrom<String> for CardId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        CardId::new(&value)
    }
}

impl From<CardId> for String {
    fn from(id: CardId) -> Self {
        id.0
    }
}

impl PartialEq for CardId {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl std::hash::Hash for CardId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

/// Where a card event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanSource {
    /// Read by the physical reader.
    Reader,
    /// Injected through `simulate_scan` (HTTP, WebSocket or in-process).
    Simulated,
}

impl fmt::Display for ScanSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ScanSource::Reader => write!(f, "reader"),
            ScanSource::Simulated => write!(f, "simulated"),
        }
    }
}

/// A single card scan.
///
/// Card events are ephemeral facts: they are not persisted by the bridge and
/// have no identity beyond `(card_id, timestamp)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardEvent {
    pub card_id: CardId,
    pub card_type: String,
    pub timestamp: DateTime<Utc>,
    pub source: ScanSource,
}

impl CardEvent {
    /// Create a card event stamped with the current time.
    pub fn new(card_id: CardId, card_type: impl Into<String>, source: ScanSource) -> Self {
        Self {
            card_id,
            card_type: card_type.into(),
            timestamp: Utc::now(),
            source,
        }
    }

    /// Returns `true` if the event was produced by `simulate_scan`.
    #[must_use]
    pub fn is_simulated(&self) -> bool {
        self.source == ScanSource::Simulated
    }
}

/// Last known reader status.
///
/// A single current value, overwritten on every transport or device status
/// change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderStatus {
    pub connected: bool,
    pub message: String,
    pub firmware_version: Option<String>,
    pub uptime_seconds: Option<u64>,
}

impl ReaderStatus {
    /// Status for a reader that is not connected.
    pub fn disconnected(message: impl Into<String>) -> Self {
        Self {
            connected: false,
            message: message.into(),
            firmware_version: None,
            uptime_seconds: None,
        }
    }

    /// Status for a connected reader.
    pub fn connected(message: impl Into<String>) -> Self {
        Self {
            connected: true,
            message: message.into(),
            firmware_version: None,
            uptime_seconds: None,
        }
    }
}

impl Default for ReaderStatus {
    fn default() -> Self {
        Self::disconnected("Not connected")
    }
}

/// Linear reconnect backoff with an attempt cap.
///
/// The attempt counter resets on every successful open. Each scheduled retry
/// increments it and waits `base_delay * attempt`. Once the counter reaches
/// `max_attempts`, no more retries are handed out until [`reset`] is called
/// (a manual connect).
///
/// [`reset`]: ReconnectPolicy::reset
///
/// # Examples
/// ```
/// use labkey_core::ReconnectPolicy;
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(2, Duration::from_millis(100));
/// assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_millis(200)));
/// assert_eq!(policy.next_delay(), None);
///
/// policy.reset();
/// assert_eq!(policy.attempt(), 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    attempt: u32,
    max_attempts: u32,
    base_delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            base_delay,
        }
    }

    /// Claim the next retry slot and return its delay, or `None` when the
    /// policy is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        self.attempt += 1;
        Some(self.base_delay.saturating_mul(self.attempt))
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_RECONNECT_ATTEMPTS,
            Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
        )
    }
}
