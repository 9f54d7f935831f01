//! Events published by the reader service.

use labkey_core::CardEvent;
use serde::Serialize;
use serde_json::{Value, json};

use crate::state_machine::{ConnectionState, StateTransition};

/// Read model of the reader, as served by `/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub connected: bool,
    /// Human readable status message.
    pub status: String,
    pub state: ConnectionState,
    /// Seconds spent in `state`.
    pub state_duration: u64,
    /// Latest connection state changes, oldest first.
    pub recent_transitions: Vec<TransitionRecord>,
    pub card_present: bool,
    pub card_id: Option<String>,
    pub card_type: Option<String>,
    /// Seconds since the current connection opened, 0 when disconnected.
    pub uptime: u64,
    pub firmware_version: Option<String>,
    /// Uptime reported by the device itself.
    pub device_uptime: Option<u64>,
    pub reconnect_attempts: u32,
    pub max_reconnect_attempts: u32,
    pub mock_mode: bool,
    pub port: Option<String>,
}

/// A past connection state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub seconds_ago: u64,
}

impl From<&StateTransition> for TransitionRecord {
    fn from(transition: &StateTransition) -> Self {
        Self {
            from: transition.from,
            to: transition.to,
            seconds_ago: transition.elapsed().as_secs(),
        }
    }
}

/// Something subscribers should hear about.
#[derive(Debug, Clone, PartialEq)]
pub enum ReaderEvent {
    StatusUpdated(StatusSnapshot),
    CardScanned(CardEvent),
    /// The card left the field; carries the card if one was known.
    CardRemoved(Option<CardEvent>),
    ReaderError { message: String },
}

impl ReaderEvent {
    /// Event name on the wire (SSE `event:` field, WebSocket `event` key).
    pub fn name(&self) -> &'static str {
        match self {
            ReaderEvent::StatusUpdated(_) => "status",
            ReaderEvent::CardScanned(_) => "card_present",
            ReaderEvent::CardRemoved(_) => "card_removed",
            ReaderEvent::ReaderError { .. } => "error",
        }
    }

    /// JSON payload of the event.
    pub fn payload(&self) -> Value {
        match self {
            ReaderEvent::StatusUpdated(snapshot) => json!(snapshot),
            ReaderEvent::CardScanned(card) => json!(card),
            ReaderEvent::CardRemoved(Some(card)) => json!(card),
            ReaderEvent::CardRemoved(None) => json!({}),
            ReaderEvent::ReaderError { message } => json!({ "message": message }),
        }
    }

    /// `{"event": name, "data": payload}`, the WebSocket frame format.
    ///
    /// ```
    /// use labkey_reader::ReaderEvent;
    ///
    /// let event = ReaderEvent::ReaderError { message: "Antenna fault".into() };
    /// let frame = event.to_frame();
    /// assert_eq!(frame["event"], "error");
    /// assert_eq!(frame["data"]["message"], "Antenna fault");
    /// ```
    pub fn to_frame(&self) -> Value {
        json!({
            "event": self.name(),
            "data": self.payload(),
        })
    }
}
