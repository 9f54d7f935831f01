//! Shared helpers for the reader service tests.
//!
//! Every test drives the service through a [`ScriptedTransport`], playing
//! the Arduino from the test body, and runs with paused time so reconnect
//! and read timers elapse instantly.

#![allow(dead_code)]

use std::time::Duration;

use labkey_hardware::mock::{ScriptedTransport, ScriptedTransportHandle};
use labkey_reader::{ReaderConfig, ReaderEvent, ReaderHandle, ReaderService, StatusSnapshot};
use tokio::sync::broadcast;

pub const PORT: &str = "/dev/ttyACM0";

/// Upper bound for waiting on an event. Time is paused, so this only trips
/// when the event never comes.
const EVENT_WAIT: Duration = Duration::from_secs(600);

/// Configuration with a fixed port and short timers.
pub fn test_config() -> ReaderConfig {
    ReaderConfig {
        port: Some(PORT.to_string()),
        max_reconnect_attempts: 3,
        reconnect_delay_ms: 100,
        status_interval_ms: 60_000,
        handshake_delay_ms: 50,
        ..ReaderConfig::default()
    }
}

/// Configuration that never touches the transport on its own.
pub fn manual_config() -> ReaderConfig {
    ReaderConfig {
        port: None,
        auto_connect: false,
        ..test_config()
    }
}

/// Spawn a reader over a scripted transport.
pub fn spawn_reader(config: ReaderConfig) -> (ReaderHandle, ScriptedTransportHandle) {
    let (transport, device) = ScriptedTransport::new();
    (ReaderService::spawn(config, transport), device)
}

/// Wait for the next event called `name`, skipping others.
pub async fn next_event(events: &mut broadcast::Receiver<ReaderEvent>, name: &str) -> ReaderEvent {
    tokio::time::timeout(EVENT_WAIT, async {
        loop {
            let event = events.recv().await.expect("event stream ended");
            if event.name() == name {
                return event;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {name} event"))
}

/// Wait for a status event matching `predicate`.
pub async fn wait_for_status(
    events: &mut broadcast::Receiver<ReaderEvent>,
    predicate: impl Fn(&StatusSnapshot) -> bool,
) -> StatusSnapshot {
    tokio::time::timeout(EVENT_WAIT, async {
        loop {
            if let ReaderEvent::StatusUpdated(snapshot) =
                events.recv().await.expect("event stream ended")
                && predicate(&snapshot)
            {
                return snapshot;
            }
        }
    })
    .await
    .expect("expected status never published")
}
