//! Segment store file serving
//!
//! Only names from the output naming scheme are served. The manifest keeps
//! its name while the transcoder rewrites it, so it is never cacheable.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use std::io::ErrorKind;
use std::sync::Arc;

use super::handlers::HttpError;
use crate::state::AppState;
use crate::storage::{StoreFile, MANIFEST_NAME};

const MANIFEST_CACHE_CONTROL: &str = "no-store, no-cache, must-revalidate, max-age=0";

/// Live manifest
/// GET /manifest.mpd
pub async fn manifest(State(state): State<Arc<AppState>>) -> Result<Response, HttpError> {
    serve(&state, MANIFEST_NAME).await
}

/// Init or media segment
/// GET /{file}
pub async fn segment(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response, HttpError> {
    serve(&state, &name).await
}

async fn serve(state: &AppState, name: &str) -> Result<Response, HttpError> {
    let (path, kind) = state
        .store
        .resolve(name)
        .ok_or_else(|| HttpError::NotFound(name.to_string()))?;

    let data = match tokio::fs::read(&path).await {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(HttpError::NotFound(name.to_string()))
        }
        Err(e) => return Err(HttpError::Stream(e.into())),
    };

    let mut headers = HeaderMap::new();
    headers.insert("Content-Type", HeaderValue::from_static(kind.content_type()));
    if kind == StoreFile::Manifest {
        headers.insert("Cache-Control", HeaderValue::from_static(MANIFEST_CACHE_CONTROL));
        headers.insert("Pragma", HeaderValue::from_static("no-cache"));
        headers.insert("Expires", HeaderValue::from_static("0"));
    } else {
        // a segment name is only reused after a restart wiped the store
        headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    }

    Ok((headers, data).into_response())
}
