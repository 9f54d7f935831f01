//! Push channels: Server-Sent Events and WebSocket.
//!
//! Both replay the current status first and then forward every
//! [`ReaderEvent`] in the order the reader published it. A client that
//! falls too far behind is disconnected; the reader never waits for it.

use std::convert::Infallible;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, SplitSink};
use futures::{SinkExt, Stream, StreamExt};
use labkey_reader::{ReaderEvent, ReaderHandle};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;

pub(crate) async fn sse_handler(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let reader = state.reader;
    let events = reader.subscribe();
    let current = reader.status().await?;

    let client = Uuid::new_v4();
    info!(%client, "SSE client connected");

    let stream = stream::once(async move { ReaderEvent::StatusUpdated(current) })
        .chain(subscription(events, client))
        .map(|event| Ok::<_, Infallible>(sse_event(&event)))
        .take_until(async move { reader.stopped().await });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn sse_event(event: &ReaderEvent) -> Event {
    Event::default()
        .event(event.name())
        .data(event.payload().to_string())
}

/// Events from `events` until the bus closes or this subscriber lags.
fn subscription(
    events: broadcast::Receiver<ReaderEvent>,
    client: Uuid,
) -> impl Stream<Item = ReaderEvent> {
    stream::unfold(events, move |mut events| async move {
        match events.recv().await {
            Ok(event) => Some((event, events)),
            Err(RecvError::Lagged(skipped)) => {
                warn!(%client, skipped, "Event subscriber lagged behind, closing stream");
                None
            }
            Err(RecvError::Closed) => {
                debug!(%client, "Event bus closed");
                None
            }
        }
    })
}

pub(crate) async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, state.reader))
}

/// Messages a WebSocket client may send.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    #[serde(alias = "simulate_scan", rename_all = "camelCase")]
    SimulateCardScan {
        card_id: Option<String>,
        card_type: Option<String>,
    },
}

type SocketSink = SplitSink<WebSocket, Message>;

async fn serve_socket(socket: WebSocket, reader: ReaderHandle) {
    let client = Uuid::new_v4();
    info!(%client, "WebSocket client connected");

    let mut events = reader.subscribe();
    let (mut sink, mut incoming) = socket.split();

    if let Ok(current) = reader.status().await
        && send_event(&mut sink, &ReaderEvent::StatusUpdated(current))
            .await
            .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if send_event(&mut sink, &event).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%client, skipped, "WebSocket client lagged behind, closing");
                    break;
                }
                Err(RecvError::Closed) => break,
            },
            message = incoming.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if let Err(message) = handle_client_message(&reader, text.as_str()).await
                        && send_frame(&mut sink, json!({ "event": "error", "data": { "message": message } }))
                            .await
                            .is_err()
                    {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    debug!(%client, %error, "WebSocket receive failed");
                    break;
                }
            },
            () = reader.stopped() => break,
        }
    }

    info!(%client, "WebSocket client disconnected");
}

/// Run a client request. The resulting card event reaches every client,
/// this one included, through the bus; only failures are answered directly.
async fn handle_client_message(reader: &ReaderHandle, text: &str) -> Result<(), String> {
    let message: ClientMessage =
        serde_json::from_str(text).map_err(|e| format!("Invalid message: {e}"))?;

    match message {
        ClientMessage::SimulateCardScan { card_id, card_type } => {
            reader
                .simulate_scan(card_id.as_deref().unwrap_or_default(), card_type.as_deref())
                .await
                .map_err(|e| e.to_string())?;
        }
    }
    Ok(())
}

async fn send_event(sink: &mut SocketSink, event: &ReaderEvent) -> Result<(), axum::Error> {
    send_frame(sink, event.to_frame()).await
}

async fn send_frame(sink: &mut SocketSink, frame: serde_json::Value) -> Result<(), axum::Error> {
    sink.send(Message::Text(frame.to_string().into())).await
}
