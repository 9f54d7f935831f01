//! Reader connection state machine.
//!
//! Tracks the serial connection lifecycle and whether a card is in the
//! reader's field.
//!
//! # States
//!
//! - `Disconnected`: no open port
//! - `Connecting`: an open is in progress
//! - `Connected`: port open, lines flowing
//! - `Reconnecting`: the connection was lost and a retry is scheduled
//!
//! # Valid Transitions
//!
//! - Disconnected → Connecting | Reconnecting
//! - Connecting → Connected | Disconnected
//! - Connected → Disconnected | Reconnecting
//! - Reconnecting → Connecting | Disconnected
//!
//! A manual disconnect goes through [`ReaderStateMachine::reset`], which is
//! valid from every state.
//!
//! # Examples
//!
//! ```
//! use labkey_reader::{ConnectionState, ReaderStateMachine};
//!
//! let mut machine = ReaderStateMachine::new();
//! machine.transition_to(ConnectionState::Connecting).unwrap();
//! machine.transition_to(ConnectionState::Connected).unwrap();
//! assert!(machine.is_connected());
//!
//! // Cannot jump straight back into Connecting.
//! assert!(machine.transition_to(ConnectionState::Connecting).is_err());
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use labkey_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Maximum number of state transitions to keep in history.
const MAX_HISTORY_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Reconnecting => "Reconnecting",
        };
        write!(f, "{}", state_str)
    }
}

impl ConnectionState {
    /// Check if transition to target state is valid from this state.
    ///
    /// ```
    /// use labkey_reader::ConnectionState;
    ///
    /// assert!(ConnectionState::Connected.can_transition_to(&ConnectionState::Reconnecting));
    /// assert!(!ConnectionState::Disconnected.can_transition_to(&ConnectionState::Connected));
    /// ```
    pub fn can_transition_to(&self, target: &ConnectionState) -> bool {
        matches!(
            (self, target),
            (
                ConnectionState::Disconnected,
                ConnectionState::Connecting | ConnectionState::Reconnecting
            ) | (
                ConnectionState::Connecting,
                ConnectionState::Connected | ConnectionState::Disconnected
            ) | (
                ConnectionState::Connected,
                ConnectionState::Disconnected | ConnectionState::Reconnecting
            ) | (
                ConnectionState::Reconnecting,
                ConnectionState::Connecting | ConnectionState::Disconnected
            )
        )
    }
}

/// Whether a card is in the reader's field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardState {
    #[default]
    Absent,
    Present,
}

/// A record of a connection state change.
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub timestamp: Instant,
}

impl StateTransition {
    pub fn new(from: ConnectionState, to: ConnectionState) -> Self {
        Self {
            from,
            to,
            timestamp: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.timestamp.elapsed()
    }
}

/// Connection and card state of the reader.
///
/// Owned by the reader task; not shared.
#[derive(Debug)]
pub struct ReaderStateMachine {
    current_state: ConnectionState,
    state_entered_at: Instant,
    card: CardState,
    history: VecDeque<StateTransition>,
}

impl ReaderStateMachine {
    pub fn new() -> Self {
        Self {
            current_state: ConnectionState::Disconnected,
            state_entered_at: Instant::now(),
            card: CardState::Absent,
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    pub fn current_state(&self) -> ConnectionState {
        self.current_state
    }

    pub fn is_connected(&self) -> bool {
        self.current_state == ConnectionState::Connected
    }

    pub fn card_state(&self) -> CardState {
        self.card
    }

    pub fn time_in_current_state(&self) -> Duration {
        self.state_entered_at.elapsed()
    }

    /// Get the most recent `count` transitions, oldest first.
    pub fn last_transitions(&self, count: usize) -> Vec<StateTransition> {
        self.history
            .iter()
            .rev()
            .take(count)
            .rev()
            .cloned()
            .collect()
    }

    /// Move to `new_state`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidStateTransition` if the table above does not
    /// allow the move; the state is left unchanged.
    pub fn transition_to(&mut self, new_state: ConnectionState) -> Result<StateTransition> {
        if !self.current_state.can_transition_to(&new_state) {
            return Err(Error::InvalidStateTransition {
                from: self.current_state.to_string(),
                to: new_state.to_string(),
            });
        }

        let transition = StateTransition::new(self.current_state, new_state);
        self.perform_state_change(new_state, transition.clone());
        Ok(transition)
    }

    /// Force the machine into `Disconnected` and clear the card.
    ///
    /// Returns `None` when already disconnected.
    pub fn reset(&mut self) -> Option<StateTransition> {
        self.card = CardState::Absent;
        if self.current_state == ConnectionState::Disconnected {
            return None;
        }

        let transition = StateTransition::new(self.current_state, ConnectionState::Disconnected);
        self.perform_state_change(ConnectionState::Disconnected, transition.clone());
        Some(transition)
    }

    /// A card entered the field. Returns `true` if it was absent before.
    pub fn card_arrived(&mut self) -> bool {
        let changed = self.card == CardState::Absent;
        self.card = CardState::Present;
        changed
    }

    /// The card left the field. Returns `true` if one was present.
    pub fn card_left(&mut self) -> bool {
        let changed = self.card == CardState::Present;
        self.card = CardState::Absent;
        changed
    }

    fn perform_state_change(&mut self, new_state: ConnectionState, transition: StateTransition) {
        self.current_state = new_state;
        self.state_entered_at = Instant::now();

        if self.history.len() >= MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(transition);
    }
}

impl Default for ReaderStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
