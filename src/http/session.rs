//! Session endpoints
//!
//! - `POST /process`: start a session from an upload or a remote URL
//! - `POST /seek`: restart the transcoder at a new offset
//! - `GET /status`: readiness and processing flags for the player to poll

use axum::{
    extract::{multipart::Field, rejection::JsonRejection, Multipart, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::handlers::HttpError;
use crate::error::StreamError;
use crate::source::{SourceDescriptor, UploadedFile};
use crate::state::AppState;
use crate::storage::UploadStore;

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub status: &'static str,
    pub filename: String,
    pub duration_str: String,
    pub duration_sec: f64,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    #[serde(default)]
    pub timestamp: f64,
}

#[derive(Debug, Serialize)]
pub struct SeekResponse {
    pub status: &'static str,
    pub offset: f64,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub ready: bool,
    pub processing: bool,
    pub offset: f64,
    pub epoch: u64,
    pub session_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub filename: Option<String>,
    pub duration_sec: f64,
    pub last_error: Option<String>,
}

fn record(state: &AppState, err: StreamError) -> HttpError {
    state.metrics.record_error(err.kind());
    HttpError::from(err)
}

/// Start a session
/// POST /process
pub async fn process(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<ProcessResponse>, HttpError> {
    if state.is_shutdown() {
        return Err(HttpError::ShuttingDown);
    }

    let descriptor = read_descriptor(state.controller.uploads(), multipart).await?;
    let started = state
        .controller
        .start(descriptor)
        .await
        .map_err(|e| record(&state, e))?;

    Ok(Json(ProcessResponse {
        status: "started",
        filename: started.display_name,
        duration_str: started.duration.formatted(),
        duration_sec: started.duration.as_secs_f64(),
    }))
}

/// Seek within the current session
/// POST /seek
pub async fn seek(
    State(state): State<Arc<AppState>>,
    request: std::result::Result<Json<SeekRequest>, JsonRejection>,
) -> Result<Json<SeekResponse>, HttpError> {
    if state.is_shutdown() {
        return Err(HttpError::ShuttingDown);
    }

    let Json(request) = request.map_err(|e| HttpError::BadRequest(e.body_text()))?;
    let offset = state
        .controller
        .seek(request.timestamp)
        .await
        .map_err(|e| record(&state, e))?;

    Ok(Json(SeekResponse {
        status: "seeking",
        offset,
    }))
}

/// Session status
/// GET /status
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let status = state.controller.status().await;
    Json(StatusResponse {
        ready: status.ready,
        processing: status.processing,
        offset: status.offset,
        epoch: status.epoch,
        session_id: status.session.id,
        started_at: status.session.started_at,
        filename: status.session.source.map(|s| s.display_name),
        duration_sec: status.session.duration.as_secs_f64(),
        last_error: status.session.last_error,
    })
}

/// Read the `type` field and the matching `file` or `url` field.
///
/// A file part is streamed into the upload staging area as it arrives.
async fn read_descriptor(
    uploads: &UploadStore,
    mut multipart: Multipart,
) -> Result<SourceDescriptor, HttpError> {
    let mut kind = None;
    let mut url = None;
    let mut file: Option<UploadedFile> = None;

    let result = async {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| HttpError::BadRequest(e.body_text()))?
        {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some("type") => kind = Some(text(field).await?),
                Some("url") => url = Some(text(field).await?),
                Some("file") => {
                    if let Some(previous) = file.take() {
                        uploads.discard(&previous).await;
                    }
                    file = Some(receive_file(uploads, field).await?);
                }
                _ => {}
            }
        }
        Ok::<_, HttpError>(())
    }
    .await;

    if let Err(e) = result {
        if let Some(file) = &file {
            uploads.discard(file).await;
        }
        return Err(e);
    }

    match kind.as_deref().map(str::trim) {
        Some("file") => file
            .map(SourceDescriptor::Upload)
            .ok_or_else(|| HttpError::BadRequest("No file part".to_string())),
        Some("url") => {
            if let Some(file) = &file {
                uploads.discard(file).await;
            }
            Ok(SourceDescriptor::Remote(url.unwrap_or_default()))
        }
        _ => {
            if let Some(file) = &file {
                uploads.discard(file).await;
            }
            Err(HttpError::BadRequest("Invalid request type".to_string()))
        }
    }
}

/// Stream a file part to a staging file. The name is checked first so a
/// nameless part is rejected before anything is written.
async fn receive_file(uploads: &UploadStore, mut field: Field<'_>) -> Result<UploadedFile, HttpError> {
    let file_name = field.file_name().unwrap_or_default().to_string();
    UploadStore::check_name(&file_name)?;

    let (staged, mut out) = uploads.stage().await?;
    let mut size = 0u64;
    let copied = async {
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| HttpError::BadRequest(e.body_text()))?
        {
            out.write_all(&chunk)
                .await
                .map_err(|e| StreamError::UploadFailed(e.to_string()))?;
            size += chunk.len() as u64;
        }
        out.flush()
            .await
            .map_err(|e| StreamError::UploadFailed(e.to_string()))?;
        Ok::<_, HttpError>(())
    }
    .await;

    if let Err(e) = copied {
        drop(out);
        uploads.discard_staged(&staged).await;
        return Err(e);
    }

    tracing::debug!("Received upload {} ({} bytes)", file_name, size);
    Ok(UploadedFile {
        file_name,
        staged,
        size,
    })
}

async fn text(field: Field<'_>) -> Result<String, HttpError> {
    field
        .text()
        .await
        .map_err(|e| HttpError::BadRequest(e.body_text()))
}
