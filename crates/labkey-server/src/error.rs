//! HTTP error responses.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use labkey_core::Error;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Error returned by an API handler, rendered as `{"error": message}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Reader(#[from] Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// HTTP status for this error.
    ///
    /// - MissingField / InvalidCardId / malformed request: 400
    /// - Timeout: 408
    /// - Conflict: 409
    /// - ServiceStopped: 503
    /// - anything else: 500
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Reader(error) if error.is_validation() => StatusCode::BAD_REQUEST,
            Self::Reader(Error::Timeout { .. }) => StatusCode::REQUEST_TIMEOUT,
            Self::Reader(Error::Conflict) => StatusCode::CONFLICT,
            Self::Reader(Error::ServiceStopped) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Reader(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
