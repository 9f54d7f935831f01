//! Command endpoints.

use std::time::Duration;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use chrono::{DateTime, Utc};
use labkey_core::{CardEvent, Error};
use labkey_hardware::PortInfo;
use labkey_reader::{ResetOutcome, StatusSnapshot};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::AppState;
use crate::error::ApiError;

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConnectRequest {
    port: Option<String>,
    baud_rate: Option<u32>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ConnectionResponse {
    connected: bool,
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SimulateScanRequest {
    card_id: Option<String>,
    card_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SimulateScanResponse {
    success: bool,
    card_id: String,
    card_type: String,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CardResponse {
    card_id: String,
    card_type: String,
    timestamp: DateTime<Utc>,
}

impl From<CardEvent> for CardResponse {
    fn from(card: CardEvent) -> Self {
        Self {
            card_id: card.card_id.into(),
            card_type: card.card_type,
            timestamp: card.timestamp,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReadCardQuery {
    /// Milliseconds to wait for a card.
    timeout: Option<u64>,
}

pub(crate) async fn health() -> &'static str {
    "ok"
}

pub(crate) async fn status(State(state): State<AppState>) -> ApiResult<StatusSnapshot> {
    Ok(Json(state.reader.status().await?))
}

pub(crate) async fn ports(State(state): State<AppState>) -> ApiResult<Vec<PortInfo>> {
    Ok(Json(state.reader.list_ports().await?))
}

/// A port that fails to open is reported in the body, not as an HTTP error.
pub(crate) async fn connect(
    State(state): State<AppState>,
    payload: Result<Json<ConnectRequest>, JsonRejection>,
) -> ApiResult<ConnectionResponse> {
    let Json(request) = payload?;
    let port = request
        .port
        .ok_or_else(|| Error::MissingField("port".into()))?;

    let connected = match state.reader.connect(&port, request.baud_rate).await {
        Ok(connected) => connected,
        Err(error @ (Error::PortOpen { .. } | Error::TransportUnavailable(_))) => {
            info!(port = %port, %error, "Connect request failed");
            false
        }
        Err(error) => return Err(error.into()),
    };

    let status = state.reader.status().await?;
    Ok(Json(ConnectionResponse {
        connected,
        status: status.status,
    }))
}

pub(crate) async fn disconnect(State(state): State<AppState>) -> ApiResult<ConnectionResponse> {
    let status = state.reader.disconnect().await?;
    Ok(Json(ConnectionResponse {
        connected: status.connected,
        status: status.status,
    }))
}

pub(crate) async fn reset(State(state): State<AppState>) -> ApiResult<ResetOutcome> {
    Ok(Json(state.reader.reset().await?))
}

pub(crate) async fn request_uid(State(state): State<AppState>) -> ApiResult<ResetOutcome> {
    let sent = state.reader.request_uid().await?;
    Ok(Json(ResetOutcome {
        success: sent,
        message: if sent {
            "UID request sent".to_string()
        } else {
            "Reader not connected".to_string()
        },
    }))
}

pub(crate) async fn simulate_scan(
    State(state): State<AppState>,
    payload: Result<Json<SimulateScanRequest>, JsonRejection>,
) -> ApiResult<SimulateScanResponse> {
    let Json(request) = payload?;
    let card_id = request.card_id.unwrap_or_default();

    let card = state
        .reader
        .simulate_scan(&card_id, request.card_type.as_deref())
        .await?;
    Ok(Json(SimulateScanResponse {
        success: true,
        card_id: card.card_id.into(),
        card_type: card.card_type,
        timestamp: card.timestamp,
    }))
}

pub(crate) async fn read_card(
    State(state): State<AppState>,
    query: Result<Query<ReadCardQuery>, QueryRejection>,
) -> ApiResult<CardResponse> {
    let Query(query) = query?;
    let timeout = query.timeout.map(Duration::from_millis);
    let card = state.reader.read_card(timeout).await?;
    Ok(Json(card.into()))
}
