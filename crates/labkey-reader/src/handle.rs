//! Typed command surface of the reader task.

use std::time::Duration;

use labkey_core::{CardEvent, CardId, Error, Result};
use labkey_hardware::PortInfo;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::bus::{EventBus, ListenerHandle};
use crate::event::{ReaderEvent, StatusSnapshot};
use crate::service::Command;

/// Result of a reset request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResetOutcome {
    pub success: bool,
    pub message: String,
}

impl ResetOutcome {
    pub(crate) fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub(crate) fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Cloneable handle to a running [`ReaderService`](crate::ReaderService).
///
/// Every method fails with [`Error::ServiceStopped`] once the reader task
/// has ended.
#[derive(Debug, Clone)]
pub struct ReaderHandle {
    commands: mpsc::Sender<Command>,
    bus: EventBus,
    read_timeout: Duration,
}

impl ReaderHandle {
    pub(crate) fn new(commands: mpsc::Sender<Command>, bus: EventBus, read_timeout: Duration) -> Self {
        Self {
            commands,
            bus,
            read_timeout,
        }
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| Error::ServiceStopped)?;
        response.await.map_err(|_| Error::ServiceStopped)
    }

    /// Best-known reader state.
    pub async fn status(&self) -> Result<StatusSnapshot> {
        self.request(Command::Status).await
    }

    /// Serial ports visible to the transport; empty in mock mode.
    pub async fn list_ports(&self) -> Result<Vec<PortInfo>> {
        self.request(Command::ListPorts).await
    }

    /// Connect to `port`, closing the current connection first.
    ///
    /// Returns `Ok(false)` in mock mode, where there is nothing to connect.
    ///
    /// # Errors
    ///
    /// - `Error::MissingField` if `port` is blank
    /// - `Error::PortOpen` if the port cannot be opened
    /// - `Error::TransportUnavailable` if the transport has no serial support
    pub async fn connect(&self, port: &str, baud_rate: Option<u32>) -> Result<bool> {
        let port = port.trim();
        if port.is_empty() {
            return Err(Error::MissingField("port".into()));
        }

        let port = port.to_string();
        self.request(|reply| Command::Connect {
            port,
            baud_rate,
            reply,
        })
        .await?
    }

    /// Close the connection and stop automatic reconnects until the next
    /// [`connect`](Self::connect). Idempotent.
    pub async fn disconnect(&self) -> Result<StatusSnapshot> {
        self.request(Command::Disconnect).await
    }

    /// Ask the reader to reinitialize its RFID module.
    pub async fn reset(&self) -> Result<ResetOutcome> {
        self.request(Command::Reset).await
    }

    /// Ask the reader for the UID of the card in its field. Returns `false`
    /// when not connected.
    pub async fn request_uid(&self) -> Result<bool> {
        self.request(Command::RequestUid).await
    }

    /// Inject a card scan without a reader. Works in every state.
    ///
    /// The card type defaults to the label of the id's batch.
    ///
    /// # Errors
    ///
    /// `Error::MissingField` for a blank id, `Error::InvalidCardId` for an
    /// id that does not normalize to 1-32 alphanumeric characters.
    pub async fn simulate_scan(&self, card_id: &str, card_type: Option<&str>) -> Result<CardEvent> {
        if card_id.trim().is_empty() {
            return Err(Error::MissingField("cardId".into()));
        }
        let card_id = CardId::new(card_id)?;
        let card_type = card_type
            .map(str::trim)
            .filter(|card_type| !card_type.is_empty())
            .map(str::to_string);

        self.request(|reply| Command::SimulateScan {
            card_id,
            card_type,
            reply,
        })
        .await
    }

    /// Wait for a card.
    ///
    /// A card scanned within the recent-card window is returned at once.
    /// Otherwise the reader is asked to scan and the call waits up to
    /// `timeout` (the configured default when `None`).
    ///
    /// # Errors
    ///
    /// - `Error::Timeout` if no card arrives in time
    /// - `Error::Conflict` if another read is already waiting
    pub async fn read_card(&self, timeout: Option<Duration>) -> Result<CardEvent> {
        let timeout = timeout.unwrap_or(self.read_timeout);
        self.request(|reply| Command::ReadCard { timeout, reply })
            .await?
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ReaderEvent> {
        self.bus.subscribe()
    }

    /// Run `callback` for every event until the handle is dropped.
    pub fn add_listener<F>(&self, callback: F) -> ListenerHandle
    where
        F: FnMut(ReaderEvent) + Send + 'static,
    {
        self.bus.add_listener(callback)
    }

    /// Stop the reader task. Pending reads fail with `ServiceStopped`.
    pub async fn shutdown(&self) {
        let _ = self.request(Command::Shutdown).await;
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Completes once the reader task has ended.
    pub async fn stopped(&self) {
        self.commands.closed().await;
    }
}
