//! HTTP error mapping and service endpoints

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::error::StreamError;
use crate::state::AppState;

/// HTTP error type
#[derive(Debug)]
pub enum HttpError {
    /// A session lifecycle failure
    Stream(StreamError),
    /// Malformed request
    BadRequest(String),
    /// File not in the segment store
    NotFound(String),
    ShuttingDown,
}

impl HttpError {
    fn status(&self) -> StatusCode {
        match self {
            HttpError::Stream(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            HttpError::Stream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            HttpError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HttpError::NotFound(_) => StatusCode::NOT_FOUND,
            HttpError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            HttpError::Stream(e) => e.kind(),
            HttpError::BadRequest(_) => "InvalidRequest",
            HttpError::NotFound(_) => "NotFound",
            HttpError::ShuttingDown => "ShuttingDown",
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        let message = match self {
            HttpError::Stream(e) => e.to_string(),
            HttpError::BadRequest(msg) => msg,
            HttpError::NotFound(name) => format!("Not found: {}", name),
            HttpError::ShuttingDown => "Server is shutting down".to_string(),
        };

        if status.is_server_error() {
            tracing::error!(kind, "{}", message);
        }

        (
            status,
            Json(serde_json::json!({
                "error": kind,
                "message": message,
            })),
        )
            .into_response()
    }
}

impl From<StreamError> for HttpError {
    fn from(err: StreamError) -> Self {
        HttpError::Stream(err)
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

/// Version endpoint
pub async fn version_check() -> &'static str {
    concat!("dash-live-server v", env!("CARGO_PKG_VERSION"))
}

/// Prometheus metrics endpoint
/// GET /metrics
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        state.metrics.export_prometheus(),
    )
        .into_response()
}
