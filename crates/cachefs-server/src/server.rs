//! HTTP server for cached static files
//!
//! Provides /health, /files and /files/{*path} endpoints.

use crate::types::HealthResponse;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use cachefs::{CacheError, CacheFs, FileInfo};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};

/// Shared state for the HTTP server
pub struct ServerState {
    pub cache: CacheFs,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(cache: CacheFs) -> Self {
        Self {
            cache,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// What a file request resolved to
enum Served {
    Directory(Vec<FileInfo>),
    NotModified {
        info: FileInfo,
    },
    File {
        info: FileInfo,
        body: Vec<u8>,
        span: Option<(u64, u64)>,
        size: u64,
        hit: bool,
    },
    Unsatisfiable {
        size: u64,
    },
}

#[derive(Debug, PartialEq, Eq)]
struct RangeNotSatisfiable;

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/files", get(get_root))
        .route("/files/{*path}", get(get_file))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds() as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        cache: state.cache.stats(),
    })
}

async fn get_root(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    serve(state, String::new(), headers).await
}

async fn get_file(
    State(state): State<SharedState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Response {
    serve(state, path, headers).await
}

async fn serve(state: SharedState, path: String, headers: HeaderMap) -> Response {
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let since = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date);

    let cache = state.cache.clone();
    let name = path.clone();
    let result =
        tokio::task::spawn_blocking(move || load(&cache, &name, range.as_deref(), since)).await;

    match result {
        Ok(Ok(served)) => respond(&path, served),
        Ok(Err(e)) => {
            let (status, message) = classify(&e);
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                error!(path = %path, error = %e, "Failed to read file");
            } else {
                warn!(path = %path, error = %e, "Failed to serve file");
            }
            error_response(status, message)
        }
        Err(e) => {
            error!(path = %path, error = %e, "File task panicked");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

/// Blocking part of a request: open through the cache, then answer from a
/// single snapshot of the content
fn load(
    cache: &CacheFs,
    name: &str,
    range: Option<&str>,
    since: Option<DateTime<Utc>>,
) -> cachefs::Result<Served> {
    let hit = cache.get(&cache.resolve(name)?).is_some();
    let mut file = cache.open(name)?;
    let (info, content) = file.content()?;

    if info.is_dir {
        let entries = file.list_directory(None)?;
        file.close()?;
        return Ok(Served::Directory(entries));
    }
    file.close()?;

    // HTTP dates carry whole seconds only
    if let Some(since) = since {
        if info.modified.timestamp() <= since.timestamp() {
            return Ok(Served::NotModified { info });
        }
    }

    let size = content.len() as u64;
    let span = match range.and_then(|r| parse_range(r, size)) {
        Some(Ok(span)) => Some(span),
        Some(Err(RangeNotSatisfiable)) => return Ok(Served::Unsatisfiable { size }),
        None => None,
    };

    let body = match span {
        Some((start, end)) => content[start as usize..=end as usize].to_vec(),
        None => content.to_vec(),
    };

    debug!(path = %name, hit, len = body.len(), "Served file");
    Ok(Served::File {
        info,
        body,
        span,
        size,
        hit,
    })
}

fn respond(path: &str, served: Served) -> Response {
    match served {
        Served::Directory(entries) => Json(entries).into_response(),
        Served::NotModified { info } => (
            StatusCode::NOT_MODIFIED,
            [(header::LAST_MODIFIED, http_date(&info.modified))],
        )
            .into_response(),
        Served::Unsatisfiable { size } => (
            StatusCode::RANGE_NOT_SATISFIABLE,
            [(header::CONTENT_RANGE, format!("bytes */{}", size))],
        )
            .into_response(),
        Served::File {
            info,
            body,
            span,
            size,
            hit,
        } => {
            let content_type = mime_guess::from_path(path).first_or_octet_stream();
            let builder = Response::builder()
                .header(header::CONTENT_TYPE, content_type.as_ref())
                .header(header::CONTENT_LENGTH, body.len())
                .header(header::LAST_MODIFIED, http_date(&info.modified))
                .header(header::ACCEPT_RANGES, "bytes")
                .header("X-Cache", if hit { "HIT" } else { "MISS" });

            let builder = match span {
                Some((start, end)) => builder
                    .status(StatusCode::PARTIAL_CONTENT)
                    .header(
                        header::CONTENT_RANGE,
                        format!("bytes {}-{}/{}", start, end, size),
                    ),
                None => builder.status(StatusCode::OK),
            };

            builder.body(Body::from(body)).unwrap_or_else(|e| {
                error!(path = %path, error = %e, "Failed to build response");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            })
        }
    }
}

fn classify(err: &CacheError) -> (StatusCode, &'static str) {
    match err {
        CacheError::InvalidPath(_) => (StatusCode::BAD_REQUEST, "Invalid path"),
        CacheError::OutOfRangeSeek { .. } => {
            (StatusCode::RANGE_NOT_SATISFIABLE, "Range not satisfiable")
        }
        e if e.is_not_found() => (StatusCode::NOT_FOUND, "File not found"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file"),
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Parse a single `bytes=` range against a body of `size` bytes.
///
/// Returns `None` when the header should be ignored (malformed or several
/// ranges) and the inclusive `(start, end)` otherwise.
fn parse_range(value: &str, size: u64) -> Option<Result<(u64, u64), RangeNotSatisfiable>> {
    let ranges = value.trim().strip_prefix("bytes=")?;
    if ranges.contains(',') {
        return None;
    }
    let (start, end) = ranges.split_once('-')?;
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        let suffix: u64 = end.parse().ok()?;
        if suffix == 0 || size == 0 {
            return Some(Err(RangeNotSatisfiable));
        }
        return Some(Ok((size.saturating_sub(suffix), size - 1)));
    }

    let start: u64 = start.parse().ok()?;
    let last = size.saturating_sub(1);
    let end = if end.is_empty() {
        last
    } else {
        end.parse::<u64>().ok()?.min(last)
    };

    if start >= size || end < start {
        return Some(Err(RangeNotSatisfiable));
    }
    Some(Ok((start, end)))
}

fn http_date(time: &DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
