//! In-process event fan-out.
//!
//! A single producer (the reader task) publishes onto a broadcast channel.
//! Every subscriber sees events in production order. A subscriber that
//! falls more than the channel capacity behind loses events; the producer
//! never waits.

use labkey_core::constants::EVENT_CHANNEL_CAPACITY;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::event::ReaderEvent;

/// Broadcast bus for [`ReaderEvent`]s. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ReaderEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event; returns how many subscribers will see it.
    pub fn publish(&self, event: ReaderEvent) -> usize {
        debug!(event = event.name(), "Publishing reader event");
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to events published from now on. Drop the receiver to
    /// unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<ReaderEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Call `callback` for every event on a background task.
    ///
    /// Must be called from within a Tokio runtime. The listener runs until
    /// the returned handle is removed or dropped. A listener that lags
    /// behind skips the missed events and keeps going.
    ///
    /// # Examples
    ///
    /// ```
    /// use labkey_reader::{EventBus, ReaderEvent};
    /// use std::sync::{Arc, Mutex};
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let bus = EventBus::new();
    ///     let seen = Arc::new(Mutex::new(Vec::new()));
    ///
    ///     let sink = Arc::clone(&seen);
    ///     let listener = bus.add_listener(move |event| {
    ///         sink.lock().unwrap().push(event.name());
    ///     });
    ///
    ///     bus.publish(ReaderEvent::CardRemoved(None));
    ///     tokio::task::yield_now().await;
    ///
    ///     listener.remove();
    /// }
    /// ```
    pub fn add_listener<F>(&self, mut callback: F) -> ListenerHandle
    where
        F: FnMut(ReaderEvent) + Send + 'static,
    {
        let mut rx = self.subscribe();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => callback(event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event listener lagged behind, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        ListenerHandle { task }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Registration of a callback listener. Dropping it removes the listener.
#[derive(Debug)]
#[must_use = "dropping the handle removes the listener"]
pub struct ListenerHandle {
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn remove(self) {}

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
