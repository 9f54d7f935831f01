//! HTTP bridge for the card reader.
//!
//! Exposes a [`ReaderHandle`] over HTTP:
//!
//! | Method | Path | |
//! |---|---|---|
//! | GET | `/status` | current [`StatusSnapshot`](labkey_reader::StatusSnapshot) |
//! | GET | `/ports` | serial ports |
//! | POST | `/connect` | `{port, baudRate?}` |
//! | POST | `/disconnect` | |
//! | POST | `/reset` | |
//! | POST | `/simulate-scan` | `{cardId, cardType?}` |
//! | POST | `/request-uid` | |
//! | GET | `/read-card?timeout=ms` | wait for a card |
//! | GET | `/events` | Server-Sent Events |
//! | GET | `/ws` | WebSocket events and simulated scans |
//! | GET | `/health` | liveness |

pub mod config;
pub mod error;
mod events;
mod routes;

use std::future::Future;

use axum::Router;
use axum::routing::{get, post};
use labkey_reader::ReaderHandle;
use tokio::net::TcpListener;
use tracing::info;

pub use config::{DEFAULT_HTTP_PORT, ServerConfig};
pub use error::ApiError;

/// Shared state of the handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    reader: ReaderHandle,
}

/// Build the bridge router around a running reader.
pub fn router(reader: ReaderHandle) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/status", get(routes::status))
        .route("/ports", get(routes::ports))
        .route("/connect", post(routes::connect))
        .route("/disconnect", post(routes::disconnect))
        .route("/reset", post(routes::reset))
        .route("/simulate-scan", post(routes::simulate_scan))
        .route("/request-uid", post(routes::request_uid))
        .route("/read-card", get(routes::read_card))
        .route("/events", get(events::sse_handler))
        .route("/ws", get(events::ws_handler))
        .with_state(AppState { reader })
}

/// Serve the bridge on `listener` until `shutdown` completes.
///
/// Event streams end when the reader stops, so stop the reader as part of
/// `shutdown` for the server to drain.
pub async fn serve<F>(listener: TcpListener, reader: ReaderHandle, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, "Card reader bridge listening");

    axum::serve(listener, router(reader))
        .with_graceful_shutdown(shutdown)
        .await
}
