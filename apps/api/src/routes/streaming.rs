//! Payload streaming
//!
//! - `GET /songsource?songId=N` - stored audio of a song
//! - `HEAD /songsource?songId=N` - headers only (served by the GET route)
//! - `GET /songs/:song_id/thumbnail` - stored thumbnail of a song
//!
//! Single byte ranges (RFC 7233), `ETag`/`Last-Modified` validators and
//! conditional `304` responses are supported. Files are streamed from disk.

use std::path::Path as StdPath;
use std::time::SystemTime;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio_util::io::ReaderStream;

use crate::error::{ApiError, ApiResult};
use crate::repositories::LibraryRepository;
use crate::services::PayloadStore;

const CACHE_CONTROL_IMMUTABLE: &str = "private, max-age=31536000, immutable";

/// Shared state for streaming handlers
#[derive(Clone)]
pub struct StreamingState {
    pub repo: LibraryRepository,
    pub storage: PayloadStore,
}

impl StreamingState {
    pub fn new(repo: LibraryRepository, storage: PayloadStore) -> Self {
        Self { repo, storage }
    }
}

pub fn streaming_router(state: StreamingState) -> Router {
    Router::new()
        .route("/songsource", get(song_source))
        .route("/songs/:song_id/thumbnail", get(song_thumbnail))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongSourceQuery {
    pub song_id: i32,
}

async fn song_source(
    State(state): State<StreamingState>,
    Query(query): Query<SongSourceQuery>,
    method: Method,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let source = state
        .repo
        .song_source(query.song_id)
        .await?
        .ok_or_else(|| ApiError::not_found("song", query.song_id.to_string()))?;

    let (Some(data_uuid), Some(ext)) = (source.data_uuid, source.dataext) else {
        return Err(ApiError::AudioFileNotFound(format!(
            "song {} has not been downloaded",
            source.id
        )));
    };

    let path = state.storage.path_for(&data_uuid, &ext)?;
    serve_file(&path, content_type_for_ext(&ext), &headers, method == Method::HEAD).await
}

async fn song_thumbnail(
    State(state): State<StreamingState>,
    Path(song_id): Path<i32>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let thumbnail = state
        .repo
        .thumbnail_for_song(song_id)
        .await?
        .ok_or_else(|| ApiError::not_found("thumbnail", song_id.to_string()))?;

    let path = state.storage.path_for(&thumbnail.data_uuid, &thumbnail.ext)?;
    serve_file(&path, content_type_for_ext(&thumbnail.ext), &headers, false).await
}

/// Build a full, partial or `304` response for a file on disk
pub async fn serve_file(
    path: &StdPath,
    content_type: &'static str,
    headers: &HeaderMap,
    head_only: bool,
) -> ApiResult<Response> {
    let mut file = File::open(path).await.map_err(|e| {
        tracing::error!(error = %e, path = %path.display(), "Failed to open payload");
        ApiError::from(e)
    })?;
    let metadata = file.metadata().await?;

    let file_size = metadata.len();
    let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    let etag = generate_etag(file_size, modified);
    let last_modified = httpdate::fmt_http_date(modified);

    let builder = Response::builder()
        .header(header::ETAG, &etag)
        .header(header::LAST_MODIFIED, &last_modified)
        .header(header::CACHE_CONTROL, CACHE_CONTROL_IMMUTABLE);

    if is_cache_valid(headers, &etag, modified) {
        return builder
            .status(StatusCode::NOT_MODIFIED)
            .body(Body::empty())
            .map_err(|e| ApiError::Internal(e.to_string()));
    }

    // RFC 7233: a Range header we cannot parse is ignored, not an error
    let range = match headers.get(header::RANGE).and_then(|h| h.to_str().ok()) {
        Some(value) => match parse_range_header(value, file_size) {
            Ok(range) => Some(range),
            Err(ApiError::InvalidRange(reason)) => {
                tracing::debug!(range = %value, reason = %reason, "Ignoring invalid Range header");
                None
            }
            Err(e) => return Err(e),
        },
        None => None,
    };

    let builder = builder
        .header(header::CONTENT_TYPE, content_type)
        .header(header::ACCEPT_RANGES, "bytes");

    let (builder, body) = match range {
        Some((start, end)) => {
            let length = end - start + 1;
            let builder = builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_LENGTH, length)
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", start, end, file_size),
                );

            let body = if head_only {
                Body::empty()
            } else {
                file.seek(SeekFrom::Start(start)).await?;
                Body::from_stream(ReaderStream::new(file.take(length)))
            };
            (builder, body)
        }
        None => {
            let builder = builder
                .status(StatusCode::OK)
                .header(header::CONTENT_LENGTH, file_size);

            let body = if head_only {
                Body::empty()
            } else {
                Body::from_stream(ReaderStream::new(file))
            };
            (builder, body)
        }
    };

    builder
        .body(body)
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// Parse a single-range `Range` header into inclusive byte offsets
///
/// Accepts `bytes=START-END`, `bytes=START-` and `bytes=-SUFFIX`. The end is
/// clamped to the file; a start past the end of the file is `416`. Anything
/// malformed, including an end before the start, is `InvalidRange`.
pub fn parse_range_header(value: &str, file_size: u64) -> ApiResult<(u64, u64)> {
    let spec = value
        .trim()
        .strip_prefix("bytes=")
        .ok_or_else(|| ApiError::InvalidRange("unsupported range unit".to_string()))?;

    if spec.contains(',') {
        return Err(ApiError::InvalidRange(
            "multiple ranges are not supported".to_string(),
        ));
    }

    let (first, last) = spec
        .split_once('-')
        .ok_or_else(|| ApiError::InvalidRange("missing '-' in range".to_string()))?;
    let (first, last) = (first.trim(), last.trim());

    let offset = |s: &str, what: &str| {
        s.parse::<u64>()
            .map_err(|_| ApiError::InvalidRange(format!("invalid {}", what)))
    };
    let last_byte = file_size.saturating_sub(1);

    let (start, end) = match (first.is_empty(), last.is_empty()) {
        (false, false) => {
            let (start, end) = (offset(first, "start")?, offset(last, "end")?);
            if start > end {
                return Err(ApiError::InvalidRange("start is after end".to_string()));
            }
            (start, end)
        }
        (false, true) => (offset(first, "start")?, last_byte),
        (true, false) => {
            let suffix = offset(last, "suffix length")?;
            (file_size.saturating_sub(suffix), last_byte)
        }
        (true, true) => return Err(ApiError::InvalidRange("empty range".to_string())),
    };

    if start >= file_size {
        return Err(ApiError::RangeNotSatisfiable { file_size });
    }

    Ok((start, end.min(last_byte)))
}

/// MIME type for a stored payload extension
pub fn content_type_for_ext(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "webm" => "audio/webm",
        "m4a" | "mp4" => "audio/mp4",
        "mp3" => "audio/mpeg",
        "opus" => "audio/opus",
        "ogg" | "oga" => "audio/ogg",
        "flac" => "audio/flac",
        "wav" => "audio/wav",
        "aac" => "audio/aac",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// `"{size}-{mtime_secs}"`
fn generate_etag(file_size: u64, modified: SystemTime) -> String {
    let mtime = modified
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("\"{}-{}\"", file_size, mtime)
}

/// Whether the client's cached copy is still fresh
///
/// `If-None-Match` wins over `If-Modified-Since`. Future dates are ignored.
fn is_cache_valid(headers: &HeaderMap, etag: &str, modified: SystemTime) -> bool {
    let strip_weak = |tag: &str| tag.strip_prefix("W/").unwrap_or(tag).to_string();

    if let Some(value) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    {
        let ours = strip_weak(etag);
        return value
            .split(',')
            .map(str::trim)
            .any(|tag| tag == "*" || strip_weak(tag) == ours);
    }

    let since = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| httpdate::parse_http_date(v).ok());

    match (since, modified.duration_since(SystemTime::UNIX_EPOCH)) {
        (Some(since), Ok(mtime)) if since <= SystemTime::now() => {
            // HTTP dates carry whole seconds
            let truncated = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(mtime.as_secs());
            truncated <= since
        }
        _ => false,
    }
}
