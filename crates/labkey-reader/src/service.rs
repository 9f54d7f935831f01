//! The reader task.
//!
//! [`ReaderService`] owns the transport, the state machine and every timer.
//! It runs as one tokio task and serves commands from [`ReaderHandle`]s
//! between transport lines, so no reader state is ever shared or locked.
//!
//! # Lifecycle
//!
//! ```text
//! spawn ─► startup (auto-connect) ─► select! loop ─► shutdown
//!                                      │
//!          commands ───────────────────┤
//!          transport lines / close ────┤
//!          reconnect timer ────────────┤
//!          handshake timer ────────────┤
//!          status probe ───────────────┤
//!          read_card deadline ─────────┤
//!          LED off ────────────────────┘
//! ```

use std::time::Duration;

use labkey_core::constants::{COMMAND_CHANNEL_CAPACITY, DEFAULT_CARD_TYPE};
use labkey_core::{CardEvent, CardId, Error, ReaderStatus, ReconnectPolicy, Result, ScanSource};
use labkey_hardware::{AnyTransport, PortInfo, SerialTransport, TransportEvent};
use labkey_protocol::{
    CardPresence, DeviceCommand, LedColor, ParsedMessage, classify_card, parse_line,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::bus::EventBus;
use crate::config::ReaderConfig;
use crate::event::{ReaderEvent, StatusSnapshot, TransitionRecord};
use crate::handle::{ReaderHandle, ResetOutcome};
use crate::state_machine::{CardState, ConnectionState, ReaderStateMachine};

/// State changes reported in each [`StatusSnapshot`].
const RECENT_TRANSITIONS: usize = 5;

/// Requests from a [`ReaderHandle`] to the reader task.
#[derive(Debug)]
pub(crate) enum Command {
    Status(oneshot::Sender<StatusSnapshot>),
    ListPorts(oneshot::Sender<Vec<PortInfo>>),
    Connect {
        port: String,
        baud_rate: Option<u32>,
        reply: oneshot::Sender<Result<bool>>,
    },
    Disconnect(oneshot::Sender<StatusSnapshot>),
    Reset(oneshot::Sender<ResetOutcome>),
    RequestUid(oneshot::Sender<bool>),
    SimulateScan {
        card_id: CardId,
        card_type: Option<String>,
        reply: oneshot::Sender<CardEvent>,
    },
    ReadCard {
        timeout: Duration,
        reply: oneshot::Sender<Result<CardEvent>>,
    },
    Shutdown(oneshot::Sender<()>),
}

/// The single outstanding `read_card` waiter.
#[derive(Debug)]
struct PendingRead {
    reply: oneshot::Sender<Result<CardEvent>>,
    timeout: Duration,
    deadline: Instant,
}

/// Card reader actor. Create one with [`ReaderService::spawn`].
#[derive(Debug)]
pub struct ReaderService {
    config: ReaderConfig,
    transport: AnyTransport,
    mock_mode: bool,
    machine: ReaderStateMachine,
    status: ReaderStatus,
    reconnect: ReconnectPolicy,
    /// Port and baud rate of the last successful open.
    target: Option<(String, u32)>,
    manually_disconnected: bool,
    lines: Option<mpsc::Receiver<TransportEvent>>,
    reconnect_at: Option<Instant>,
    handshake_at: Option<Instant>,
    /// The lit feedback LED and when to switch it off.
    led_off_at: Option<(Instant, LedColor)>,
    connected_at: Option<Instant>,
    current_card: Option<CardEvent>,
    last_card: Option<(CardEvent, Instant)>,
    /// Type announced by a `Card Type:` line, waiting for its UID.
    pending_card_type: Option<String>,
    pending_read: Option<PendingRead>,
    commands: mpsc::Receiver<Command>,
    bus: EventBus,
}

impl ReaderService {
    /// Start the reader task and return a handle to it.
    ///
    /// Must be called from within a Tokio runtime. The task stops when
    /// [`ReaderHandle::shutdown`] is called or every handle is dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use labkey_hardware::AnyTransport;
    /// use labkey_reader::{ReaderConfig, ReaderService};
    ///
    /// #[tokio::main]
    /// async fn main() -> labkey_core::Result<()> {
    ///     let reader = ReaderService::spawn(ReaderConfig::default(), AnyTransport::detect(true));
    ///
    ///     let status = reader.status().await?;
    ///     assert!(status.mock_mode);
    ///     assert!(!status.connected);
    ///
    ///     reader.shutdown().await;
    ///     Ok(())
    /// }
    /// ```
    pub fn spawn(config: ReaderConfig, transport: impl Into<AnyTransport>) -> ReaderHandle {
        let transport = transport.into().with_dialect(config.dialect);
        let (commands_tx, commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let bus = EventBus::new();
        let read_timeout = config.read_timeout();

        let service = Self {
            mock_mode: transport.is_mock(),
            reconnect: config.reconnect_policy(),
            config,
            transport,
            machine: ReaderStateMachine::new(),
            status: ReaderStatus::default(),
            target: None,
            manually_disconnected: false,
            lines: None,
            reconnect_at: None,
            handshake_at: None,
            led_off_at: None,
            connected_at: None,
            current_card: None,
            last_card: None,
            pending_card_type: None,
            pending_read: None,
            commands,
            bus: bus.clone(),
        };
        tokio::spawn(service.run());

        ReaderHandle::new(commands_tx, bus, read_timeout)
    }

    async fn run(mut self) {
        self.startup().await;

        let period = self.config.status_interval();
        let mut probe = time::interval_at(Instant::now() + period, period);
        probe.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let reconnect_at = self.reconnect_at;
            let handshake_at = self.handshake_at;
            let read_deadline = self.pending_read.as_ref().map(|read| read.deadline);
            let led_off_at = self.led_off_at.map(|(at, _)| at);

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command).await {
                            return;
                        }
                    }
                    None => {
                        debug!("All reader handles dropped");
                        self.shutdown().await;
                        return;
                    }
                },
                event = next_event(&mut self.lines) => self.handle_transport_event(event).await,
                () = sleep_until(reconnect_at) => self.attempt_reconnect().await,
                () = sleep_until(handshake_at) => {
                    self.handshake_at = None;
                    if self.machine.is_connected() {
                        self.transport.write(&DeviceCommand::Status).await;
                    }
                }
                _ = probe.tick() => self.probe().await,
                () = sleep_until(read_deadline) => self.expire_read(),
                () = sleep_until(led_off_at) => self.led_off().await,
                () = read_abandoned(&mut self.pending_read) => {
                    debug!("Card read caller went away");
                    self.pending_read = None;
                }
            }
        }
    }

    async fn startup(&mut self) {
        if self.mock_mode {
            info!("Running in mock mode, only simulated scans are available");
            self.status = ReaderStatus::disconnected("Mock mode: serial hardware unavailable");
            return;
        }
        if !self.config.auto_connect {
            return;
        }

        match self.reconnect_target().await {
            Some((path, baud_rate)) => {
                if let Err(error) = self.open(&path, baud_rate).await {
                    warn!(%error, "Auto-connect failed");
                }
            }
            None => info!("No reader found, waiting for a connect request"),
        }
    }

    /// Serve one command. Returns `false` once the task should stop.
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Status(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::ListPorts(reply) => {
                let _ = reply.send(self.transport.list_ports().await);
            }
            Command::Connect {
                port,
                baud_rate,
                reply,
            } => {
                let result = self.connect(&port, baud_rate).await;
                let _ = reply.send(result);
            }
            Command::Disconnect(reply) => {
                self.disconnect().await;
                let _ = reply.send(self.snapshot());
            }
            Command::Reset(reply) => {
                let outcome = self.reset().await;
                let _ = reply.send(outcome);
            }
            Command::RequestUid(reply) => {
                let sent = self.machine.is_connected()
                    && self.transport.write(&DeviceCommand::RequestUid).await;
                let _ = reply.send(sent);
            }
            Command::SimulateScan {
                card_id,
                card_type,
                reply,
            } => {
                let card_type = card_type.unwrap_or_else(|| classify_card(&card_id).to_string());
                let card = CardEvent::new(card_id, card_type, ScanSource::Simulated);
                self.record_card(card.clone());
                let _ = reply.send(card);
            }
            Command::ReadCard { timeout, reply } => self.read_card(timeout, reply).await,
            Command::Shutdown(reply) => {
                self.shutdown().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    async fn connect(&mut self, port: &str, baud_rate: Option<u32>) -> Result<bool> {
        if self.mock_mode {
            info!(port, "Connect requested in mock mode, ignoring");
            return Ok(false);
        }

        self.manually_disconnected = false;
        self.reconnect.reset();
        self.reconnect_at = None;
        if self.machine.current_state() != ConnectionState::Disconnected {
            info!("Closing current connection before connecting");
            self.teardown().await;
        }

        let baud_rate = baud_rate.unwrap_or(self.config.baud_rate);
        self.open(port, baud_rate).await?;
        Ok(true)
    }

    /// Open `path` and move to `Connected`, or back to `Disconnected` on
    /// failure.
    async fn open(&mut self, path: &str, baud_rate: u32) -> Result<()> {
        self.enter(ConnectionState::Connecting);

        match self.transport.open(path, baud_rate).await {
            Ok(lines) => {
                let now = Instant::now();
                self.lines = Some(lines);
                self.reconnect.reset();
                self.reconnect_at = None;
                self.enter(ConnectionState::Connected);
                self.status = ReaderStatus::connected("Connected");
                self.connected_at = Some(now);
                self.handshake_at = Some(now + self.config.handshake_delay());
                self.target = Some((path.to_string(), baud_rate));

                info!(port = path, baud_rate, "Reader connected");
                self.publish_status();
                Ok(())
            }
            Err(error) => {
                warn!(port = path, %error, "Failed to open reader port");
                self.enter(ConnectionState::Disconnected);
                self.status = ReaderStatus::disconnected(format!("Error opening port: {error}"));
                self.publish_status();
                Err(error.into())
            }
        }
    }

    async fn disconnect(&mut self) {
        self.manually_disconnected = true;
        self.reconnect_at = None;
        if self.machine.current_state() != ConnectionState::Disconnected {
            info!("Disconnecting reader");
        }

        self.teardown().await;
        self.status = ReaderStatus::disconnected("Disconnected");
        self.publish_status();
    }

    async fn reset(&mut self) -> ResetOutcome {
        if !self.machine.is_connected() {
            return ResetOutcome::failed("Reader not connected");
        }

        if self.transport.write(&DeviceCommand::Reset).await {
            info!("Reset command sent to reader");
            ResetOutcome::succeeded("Reset command sent")
        } else {
            ResetOutcome::failed("Failed to send reset command")
        }
    }

    async fn read_card(&mut self, timeout: Duration, reply: oneshot::Sender<Result<CardEvent>>) {
        if let Some((card, seen_at)) = &self.last_card
            && seen_at.elapsed() <= self.config.recent_card_window()
        {
            let _ = reply.send(Ok(card.clone()));
            return;
        }

        if let Some(pending) = &self.pending_read
            && !pending.reply.is_closed()
        {
            let _ = reply.send(Err(Error::Conflict));
            return;
        }

        if self.machine.is_connected() {
            self.transport.write(&DeviceCommand::Scan).await;
        }
        debug!(timeout_ms = timeout.as_millis() as u64, "Waiting for a card");
        self.pending_read = Some(PendingRead {
            reply,
            timeout,
            deadline: Instant::now() + timeout,
        });
    }

    fn expire_read(&mut self) {
        if let Some(read) = self.pending_read.take() {
            debug!(timeout_ms = read.timeout.as_millis() as u64, "Card read timed out");
            let _ = read.reply.send(Err(Error::timeout(read.timeout)));
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Line(line) => self.handle_line(&line).await,
            TransportEvent::Closed => self.connection_lost(None).await,
            TransportEvent::Error(message) => self.connection_lost(Some(message)).await,
        }
    }

    async fn handle_line(&mut self, line: &str) {
        let Some(message) = parse_line(line) else {
            return;
        };
        debug!(kind = message.kind(), line, "Reader line");

        match message {
            ParsedMessage::Status(report) => {
                if let Some(message) = report.message {
                    self.status.message = message;
                }
                if report.firmware.is_some() {
                    self.status.firmware_version = report.firmware;
                }
                if report.uptime.is_some() {
                    self.status.uptime_seconds = report.uptime;
                }
                self.publish_status();
            }
            ParsedMessage::CardPresent(CardPresence::Identified { card_id, card_type }) => {
                let pending_type = self.pending_card_type.take();
                let card_type = card_type
                    .or(pending_type)
                    .unwrap_or_else(|| DEFAULT_CARD_TYPE.to_string());
                self.record_card(CardEvent::new(card_id, card_type, ScanSource::Reader));
                self.transport.write(&DeviceCommand::Ack).await;
                self.flash_led(LedColor::Green).await;
            }
            ParsedMessage::CardPresent(CardPresence::UidPending { card_type }) => {
                info!(card_type = %card_type, "Card detected, requesting UID");
                self.status.message = format!("Card detected: {card_type}");
                self.pending_card_type = Some(card_type);
                self.publish_status();
                self.transport.write(&DeviceCommand::RequestUid).await;
            }
            ParsedMessage::CardRemoved => {
                self.machine.card_left();
                self.pending_card_type = None;
                let card = self.current_card.take();
                self.bus.publish(ReaderEvent::CardRemoved(card));
            }
            ParsedMessage::ReaderError(message) => {
                warn!(%message, "Reader reported an error");
                self.status.message = format!("Reader error: {message}");
                self.bus.publish(ReaderEvent::ReaderError { message });
                self.flash_led(LedColor::Red).await;
            }
            ParsedMessage::Unrecognized(line) => debug!(%line, "Ignoring unrecognized reader line"),
        }
    }

    /// Light `color` for the configured flash time. A flash of another
    /// color switches the lit one off first.
    async fn flash_led(&mut self, color: LedColor) {
        let Some(duration) = self.config.led_flash() else {
            return;
        };
        if let Some((_, lit)) = self.led_off_at
            && lit != color
        {
            self.transport.write(&DeviceCommand::Led { color: lit, on: false }).await;
        }
        if self.transport.write(&DeviceCommand::Led { color, on: true }).await {
            self.led_off_at = Some((Instant::now() + duration, color));
        }
    }

    async fn led_off(&mut self) {
        if let Some((_, color)) = self.led_off_at.take()
            && self.machine.is_connected()
        {
            self.transport.write(&DeviceCommand::Led { color, on: false }).await;
        }
    }

    fn record_card(&mut self, card: CardEvent) {
        info!(
            card_id = %card.card_id,
            card_type = %card.card_type,
            source = %card.source,
            "Card scanned"
        );
        self.machine.card_arrived();
        self.current_card = Some(card.clone());
        self.last_card = Some((card.clone(), Instant::now()));

        if let Some(read) = self.pending_read.take() {
            let _ = read.reply.send(Ok(card.clone()));
        }
        self.bus.publish(ReaderEvent::CardScanned(card));
    }

    async fn connection_lost(&mut self, error: Option<String>) {
        self.teardown().await;

        match error {
            Some(message) => {
                warn!(%message, "Serial port error");
                self.status = ReaderStatus::disconnected(format!("Error: {message}"));
                self.bus.publish(ReaderEvent::ReaderError { message });
            }
            None => {
                warn!("Serial port closed");
                self.status = ReaderStatus::disconnected("Port closed");
            }
        }

        if self.should_reconnect() {
            self.schedule_reconnect();
        } else {
            self.publish_status();
        }
    }

    /// Claim the next retry slot, or park in `Disconnected` once the
    /// attempts are used up. No-op while a retry is already scheduled.
    fn schedule_reconnect(&mut self) {
        if self.reconnect_at.is_some() {
            return;
        }

        match self.reconnect.next_delay() {
            Some(delay) => {
                info!(
                    attempt = self.reconnect.attempt(),
                    max_attempts = self.reconnect.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling reconnect"
                );
                self.enter(ConnectionState::Reconnecting);
                self.reconnect_at = Some(Instant::now() + delay);
            }
            None => {
                warn!(
                    max_attempts = self.reconnect.max_attempts(),
                    "Max reconnect attempts reached"
                );
                self.enter(ConnectionState::Disconnected);
                self.status.message = "Max reconnect attempts reached".to_string();
            }
        }
        self.publish_status();
    }

    async fn attempt_reconnect(&mut self) {
        self.reconnect_at = None;
        if self.manually_disconnected {
            self.enter(ConnectionState::Disconnected);
            return;
        }

        let Some((path, baud_rate)) = self.reconnect_target().await else {
            info!(attempt = self.reconnect.attempt(), "No reader port found for reconnect");
            self.enter(ConnectionState::Disconnected);
            self.schedule_reconnect();
            return;
        };

        info!(attempt = self.reconnect.attempt(), port = %path, "Attempting to reconnect");
        if self.open(&path, baud_rate).await.is_err() {
            self.schedule_reconnect();
        }
    }

    async fn probe(&mut self) {
        if self.machine.is_connected() {
            self.transport.write(&DeviceCommand::Status).await;
            return;
        }

        if self.should_reconnect()
            && self.reconnect_at.is_none()
            && !self.reconnect.is_exhausted()
            && self.machine.current_state() == ConnectionState::Disconnected
        {
            debug!("Reader not connected, scheduling reconnect");
            self.schedule_reconnect();
        }
    }

    fn should_reconnect(&self) -> bool {
        !self.mock_mode && self.config.auto_connect && !self.manually_disconnected
    }

    /// Last successful port, then the configured one, then the first
    /// Arduino found.
    async fn reconnect_target(&self) -> Option<(String, u32)> {
        if let Some(target) = &self.target {
            return Some(target.clone());
        }
        if let Some(port) = &self.config.port {
            return Some((port.clone(), self.config.baud_rate));
        }

        let ports = self.transport.list_ports().await;
        let arduino = ports.into_iter().find(PortInfo::is_arduino)?;
        info!(port = %arduino.path, "Found Arduino reader");
        Some((arduino.path, self.config.baud_rate))
    }

    /// Close the port and forget everything tied to the connection.
    async fn teardown(&mut self) {
        self.lines = None;
        self.handshake_at = None;
        self.led_off_at = None;
        self.connected_at = None;
        self.transport.close().await;
        self.machine.reset();
        self.current_card = None;
        self.pending_card_type = None;
    }

    async fn shutdown(&mut self) {
        if let Some(read) = self.pending_read.take() {
            let _ = read.reply.send(Err(Error::ServiceStopped));
        }
        self.reconnect_at = None;
        self.teardown().await;
        info!("Reader service stopped");
    }

    fn enter(&mut self, state: ConnectionState) {
        if self.machine.current_state() == state {
            return;
        }
        match self.machine.transition_to(state) {
            Ok(transition) => debug!(from = %transition.from, to = %transition.to, "Reader state changed"),
            Err(error) => warn!(%error, "Ignoring reader state change"),
        }
    }

    fn publish_status(&self) {
        self.bus.publish(ReaderEvent::StatusUpdated(self.snapshot()));
    }

    fn snapshot(&self) -> StatusSnapshot {
        let card = self.current_card.as_ref();
        StatusSnapshot {
            connected: self.machine.is_connected(),
            status: self.status.message.clone(),
            state: self.machine.current_state(),
            state_duration: self.machine.time_in_current_state().as_secs(),
            recent_transitions: self
                .machine
                .last_transitions(RECENT_TRANSITIONS)
                .iter()
                .map(TransitionRecord::from)
                .collect(),
            card_present: self.machine.card_state() == CardState::Present,
            card_id: card.map(|card| card.card_id.to_string()),
            card_type: card.map(|card| card.card_type.clone()),
            uptime: self.connected_at.map_or(0, |at| at.elapsed().as_secs()),
            firmware_version: self.status.firmware_version.clone(),
            device_uptime: self.status.uptime_seconds,
            reconnect_attempts: self.reconnect.attempt(),
            max_reconnect_attempts: self.reconnect.max_attempts(),
            mock_mode: self.mock_mode,
            port: self.transport.connection().map(|connection| connection.port),
        }
    }
}

async fn next_event(lines: &mut Option<mpsc::Receiver<TransportEvent>>) -> TransportEvent {
    match lines {
        Some(rx) => rx.recv().await.unwrap_or(TransportEvent::Closed),
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn read_abandoned(pending: &mut Option<PendingRead>) {
    match pending {
        Some(read) => read.reply.closed().await,
        None => std::future::pending().await,
    }
}
