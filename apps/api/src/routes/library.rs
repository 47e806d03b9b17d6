//! Library routes
//!
//! - `POST /fullsync` - replace the whole library
//! - `POST /song` - register a song and start downloading it
//! - `POST /downloads` - download every song without a stored payload

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};

use crate::error::ApiResult;
use crate::models::{DownloadsStarted, FullSync, FullSyncSummary, SongCreated, SongIn};
use crate::services::{DownloadService, LibraryService};

/// Shared state for library handlers
#[derive(Clone)]
pub struct LibraryState {
    pub library: LibraryService,
    pub downloads: DownloadService,
}

impl LibraryState {
    pub fn new(library: LibraryService, downloads: DownloadService) -> Self {
        Self { library, downloads }
    }
}

pub fn library_router(state: LibraryState) -> Router {
    Router::new()
        .route("/fullsync", post(full_sync))
        .route("/song", post(add_song))
        .route("/downloads", post(download_missing))
        .with_state(state)
}

async fn full_sync(
    State(state): State<LibraryState>,
    Json(body): Json<FullSync>,
) -> ApiResult<Json<FullSyncSummary>> {
    Ok(Json(state.library.full_sync(&body).await?))
}

async fn add_song(
    State(state): State<LibraryState>,
    Json(body): Json<SongIn>,
) -> ApiResult<(StatusCode, Json<SongCreated>)> {
    let created = state.downloads.add_song(body).await?;
    Ok((StatusCode::ACCEPTED, Json(created)))
}

async fn download_missing(
    State(state): State<LibraryState>,
) -> ApiResult<(StatusCode, Json<DownloadsStarted>)> {
    let started = state.downloads.download_missing().await?;
    Ok((StatusCode::ACCEPTED, Json(started)))
}
