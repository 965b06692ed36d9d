//! HTTP handlers and the token gate

use axum::body::Body;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use std::time::Instant;
use tokio_util::io::ReaderStream;

use super::storage::{SpoolError, UploadSpool};
use super::AppState;
use crate::archive::ArchiveError;

/// Multipart field carrying the zip
pub const UPLOAD_FIELD: &str = "folder";
/// File name of the zip in both directions
pub const ARCHIVE_NAME: &str = "folder.zip";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid token")]
    Unauthorized,
    #[error("no file uploaded")]
    MissingFile,
    #[error("malformed upload: {0}")]
    BadUpload(String),
    #[error("{0}")]
    TooLarge(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::MissingFile | ApiError::BadUpload(_) => StatusCode::BAD_REQUEST,
            ApiError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<ArchiveError> for ApiError {
    fn from(e: ArchiveError) -> Self {
        if e.is_security() {
            tracing::warn!("rejected archive: {e}");
        } else {
            tracing::error!("archive failure: {e}");
        }
        ApiError::Internal(e.to_string())
    }
}

impl From<SpoolError> for ApiError {
    fn from(e: SpoolError) -> Self {
        match e {
            SpoolError::TooLarge { .. } => ApiError::TooLarge(e.to_string()),
            SpoolError::Io(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("worker failed: {e}"))
    }
}

/// Reject requests whose `Authorization` header is missing or unknown.
///
/// The header carries the raw token. The response never says which part
/// was wrong.
pub async fn require_token(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let authorized = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|token| !token.is_empty() && state.tokens.contains(token))
        .unwrap_or(false);
    if !authorized {
        tracing::debug!(path = %req.uri().path(), "unauthorized request");
        return ApiError::Unauthorized.into_response();
    }
    next.run(req).await
}

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn readyz(State(state): State<AppState>) -> Response {
    match state.storage.check_ready() {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))).into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "storage not ready", "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// `POST /upload`: replace storage with the uploaded archive
pub async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let started = Instant::now();
    let mut multipart = multipart.map_err(|_| ApiError::MissingFile)?;

    let mut spool = None;
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let mut s = UploadSpool::new(&state.limits.spool_dir, state.limits.memory_limit, state.limits.max_upload);
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            s.write_chunk(&chunk)?;
        }
        spool = Some(s);
        break;
    }
    let spool = spool.ok_or(ApiError::MissingFile)?;
    let received = spool.len();

    let guard = state.storage.write().await;
    let storage = state.storage.clone();
    let stats = tokio::task::spawn_blocking(move || storage.replace_contents(&guard, spool)).await??;

    tracing::info!(
        bytes_received = received,
        files = stats.files,
        dirs = stats.dirs,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "folder replaced"
    );
    Ok(Json(json!({ "status": "folder replaced" })))
}

/// `GET /download`: stream a zip of the current storage tree
pub async fn download(State(state): State<AppState>) -> Result<Response, ApiError> {
    let guard = state.storage.read().await;
    let storage = state.storage.clone();
    let (file, stats) = tokio::task::spawn_blocking(move || storage.snapshot(&guard)).await??;

    let len = file
        .metadata()
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .len();
    tracing::info!(files = stats.files, dirs = stats.dirs, archive_bytes = len, "serving download");

    let body = Body::from_stream(ReaderStream::new(tokio::fs::File::from_std(file)));
    let disposition = format!("attachment; filename=\"{ARCHIVE_NAME}\"");
    let mut resp = (StatusCode::OK, body).into_response();
    let headers = resp.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    if let Ok(v) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, v);
    }
    Ok(resp)
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::TooLarge(e.body_text())
    } else {
        ApiError::BadUpload(e.body_text())
    }
}
