//! Song download jobs
//!
//! Every download is one work unit in a [`JobRegistry`] job:
//! extract with the configured [`Extractor`], store the audio payload,
//! store the thumbnail (deduplicated by content hash), then record both on
//! the song row. Units fail independently; a job's completion callback only
//! logs what happened.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use btecify_jobs::{completion, JobId, JobRegistry};
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::models::{DownloadsStarted, SongCreated, SongDownload, SongIn};
use crate::repositories::library::PendingDownload;
use crate::repositories::LibraryRepository;
use crate::services::extractor::{ExtractedThumbnail, Extractor};
use crate::services::storage::{content_hash, PayloadStore};

/// Per-job success and failure counters shared by its units
#[derive(Debug, Default)]
pub struct DownloadTally {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

impl DownloadTally {
    pub fn record<T, E>(&self, outcome: &Result<T, E>) {
        let counter = if outcome.is_ok() {
            &self.succeeded
        } else {
            &self.failed
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }
}

/// Starts download jobs and runs their units
#[derive(Clone)]
pub struct DownloadService {
    registry: JobRegistry,
    repo: LibraryRepository,
    storage: PayloadStore,
    extractor: Arc<dyn Extractor>,
}

impl DownloadService {
    pub fn new(
        registry: JobRegistry,
        repo: LibraryRepository,
        storage: PayloadStore,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        Self {
            registry,
            repo,
            storage,
            extractor,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Register a song by URL and start a one-unit job downloading it
    pub async fn add_song(&self, song: SongIn) -> ApiResult<SongCreated> {
        let weburl = validate_weburl(&song.weburl)?;

        let artist_id = match non_empty(song.artist.as_deref()) {
            Some(artist) => Some(self.repo.find_or_create_artist(artist).await?),
            None => None,
        };
        let album_id = match non_empty(song.album.as_deref()) {
            Some(album) => Some(self.repo.find_or_create_album(album).await?),
            None => None,
        };

        let song_id = self
            .repo
            .upsert_song_for_url(&weburl, non_empty(song.title.as_deref()), artist_id, album_id)
            .await?;

        let job_id = self.submit_downloads(vec![PendingDownload {
            id: song_id,
            weburl,
        }])
        .await;

        info!(song_id, job_id = %job_id, "Song registered, download started");
        Ok(SongCreated { song_id, job_id })
    }

    /// Start one job downloading every song without a stored payload
    pub async fn download_missing(&self) -> ApiResult<DownloadsStarted> {
        let pending = self.repo.songs_missing_data().await?;
        let size = pending.len();
        let job_id = self.submit_downloads(pending).await;

        info!(job_id = %job_id, size, "Download of missing songs started");
        Ok(DownloadsStarted { job_id, size })
    }

    /// Submit one download unit per song as a single job
    pub async fn submit_downloads(&self, pending: Vec<PendingDownload>) -> JobId {
        let tally = Arc::new(DownloadTally::default());
        let size = pending.len();

        let units: Vec<_> = pending
            .into_iter()
            .map(|song| {
                let service = self.clone();
                let tally = Arc::clone(&tally);
                async move {
                    let outcome = service.download_song(song.id, song.weburl).await;
                    tally.record(&outcome);
                    outcome
                }
            })
            .collect();

        let on_complete = completion(move || async move {
            info!(
                size,
                succeeded = tally.succeeded(),
                failed = tally.failed(),
                "Download job finished"
            );
            Ok(())
        });

        self.registry.submit(units, Some(on_complete)).await
    }

    /// Download one song and record the result on its row
    ///
    /// The stored payload is only kept once the row points at it; if the unit
    /// fails or is aborted before that, the file is deleted again.
    pub async fn download_song(&self, song_id: i32, weburl: String) -> ApiResult<i32> {
        let extraction = self.extractor.extract(&weburl).await.map_err(|e| {
            warn!(song_id, url = %weburl, error = %e, "Download failed");
            ApiError::from(e)
        })?;

        let info = &extraction.info;
        let artist_id = match non_empty(info.artist_name()) {
            Some(artist) => Some(self.repo.find_or_create_artist(artist).await?),
            None => None,
        };
        let album_id = match non_empty(info.album.as_deref()) {
            Some(album) => Some(self.repo.find_or_create_album(album).await?),
            None => None,
        };

        let payload = self.storage.stage(&extraction.data, &extraction.ext).await?;

        let thumb_id = match &extraction.thumbnail {
            Some(thumbnail) => match self.store_thumbnail(thumbnail).await {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(song_id, error = %e, "Storing thumbnail failed, continuing without it");
                    None
                }
            },
            None => None,
        };

        let download = SongDownload {
            data_uuid: payload.data_uuid().to_string(),
            dataext: payload.ext().to_string(),
            thumb_id,
            title: info.title.clone(),
            duration: info.duration,
            extractor: info.extractor_key.clone(),
            thumburl: info.thumbnail.clone(),
            artist_id,
            album_id,
        };

        match self.repo.attach_download(song_id, &download).await? {
            Some(previous) => {
                let data_uuid = payload.keep();
                if let (Some(old_uuid), Some(old_ext)) = (previous.data_uuid, previous.dataext) {
                    self.discard(&old_uuid, &old_ext).await;
                }
                info!(song_id, data_uuid = %data_uuid, ext = %download.dataext, "Song downloaded");
                Ok(song_id)
            }
            None => Err(ApiError::not_found("song", song_id.to_string())),
        }
    }

    /// Store a thumbnail unless identical bytes are already stored
    async fn store_thumbnail(&self, thumbnail: &ExtractedThumbnail) -> ApiResult<i32> {
        let hash = content_hash(&thumbnail.data);
        if let Some(existing) = self.repo.find_thumbnail_by_hash(&hash).await? {
            return Ok(existing.id);
        }

        let staged = self.storage.stage(&thumbnail.data, &thumbnail.ext).await?;
        let row = self
            .repo
            .upsert_thumbnail(&hash, staged.data_uuid(), staged.ext())
            .await?;

        // Otherwise another download stored the same image first and ours is dropped
        if row.data_uuid == staged.data_uuid() {
            staged.keep();
        }
        Ok(row.id)
    }

    async fn discard(&self, data_uuid: &str, ext: &str) {
        if let Err(e) = self.storage.remove(data_uuid, ext).await {
            warn!(data_uuid = %data_uuid, error = %e, "Failed to remove payload");
        }
    }
}

/// Accept only absolute http(s) URLs
pub fn validate_weburl(raw: &str) -> ApiResult<String> {
    let trimmed = raw.trim();
    let parsed = url::Url::parse(trimmed)
        .map_err(|e| ApiError::ValidationError(format!("invalid weburl: {}", e)))?;

    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(trimmed.to_string()),
        scheme => Err(ApiError::ValidationError(format!(
            "unsupported weburl scheme: {}",
            scheme
        ))),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
