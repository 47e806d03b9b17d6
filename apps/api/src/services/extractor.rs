//! Media extraction through the external `yt-dlp` tool
//!
//! Each download runs one `yt-dlp` process writing into the extraction
//! directory under a fresh UUID file stem, so parallel downloads never
//! collide. The payload and thumbnail are read back into memory and the
//! files removed before returning.
//!
//! The number of concurrent processes is capped by a semaphore; callers
//! wait for a permit rather than failing.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use btecify_shared_config::ExtractionConfig;
use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Semaphore;
use uuid::Uuid;

/// Errors that can occur while extracting media
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("extractor executable not found: {0}")]
    ToolNotFound(String),

    #[error("extractor process failed: {0}")]
    ProcessFailed(String),

    #[error("playlist URL cannot be downloaded as a single song: {0}")]
    PlaylistUrl(String),

    #[error("unexpected extractor output: {0}")]
    MalformedOutput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Subset of the `yt-dlp` info JSON the library cares about
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExtractInfo {
    #[serde(rename = "_type")]
    pub kind: Option<String>,
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub ext: Option<String>,
    pub extractor_key: Option<String>,
    pub thumbnail: Option<String>,
    pub webpage_url: Option<String>,
    pub artist: Option<String>,
    pub uploader: Option<String>,
    pub album: Option<String>,
}

impl ExtractInfo {
    pub fn is_playlist(&self) -> bool {
        self.kind.as_deref() == Some("playlist")
    }

    /// Best guess at the performing artist
    pub fn artist_name(&self) -> Option<&str> {
        self.artist.as_deref().or(self.uploader.as_deref())
    }
}

/// Image downloaded next to the audio payload
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedThumbnail {
    pub data: Bytes,
    pub ext: String,
}

/// Result of one successful extraction
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub data: Bytes,
    /// Audio container extension, e.g. `webm` or `m4a`
    pub ext: String,
    pub thumbnail: Option<ExtractedThumbnail>,
    pub info: ExtractInfo,
}

/// Source of audio payloads for a web URL
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Download a single song from `url`
    async fn extract(&self, url: &str) -> Result<Extraction, ExtractError>;

    /// Whether the extractor can currently run
    async fn is_available(&self) -> bool {
        true
    }
}

/// [`Extractor`] backed by a `yt-dlp` subprocess
pub struct YtDlpExtractor {
    config: ExtractionConfig,
    semaphore: Arc<Semaphore>,
}

impl std::fmt::Debug for YtDlpExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YtDlpExtractor")
            .field("ytdlp_path", &self.config.ytdlp_path)
            .field("dir", &self.config.dir)
            .field("max_concurrent", &self.config.max_concurrent)
            .field("available_permits", &self.semaphore.available_permits())
            .finish()
    }
}

impl YtDlpExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        let permits = config.max_concurrent.max(1);
        Self {
            config,
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Check if the `yt-dlp` executable can be run
    async fn check_available(&self) -> bool {
        Command::new(&self.config.ytdlp_path)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn command(&self, url: &str, stem: &str) -> Command {
        let template = self.config.dir.join(format!("{}.%(ext)s", stem));

        let mut cmd = Command::new(&self.config.ytdlp_path);
        cmd.arg("--no-playlist")
            .arg("--playlist-items")
            .arg("1")
            .arg("-f")
            .arg(&self.config.format)
            .arg("-o")
            .arg(template)
            .arg("--write-thumbnail")
            .arg("--dump-single-json")
            .arg("--no-simulate")
            .arg("--no-progress")
            .arg("--")
            .arg(url);

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    async fn is_available(&self) -> bool {
        self.check_available().await
    }

    async fn extract(&self, url: &str) -> Result<Extraction, ExtractError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| ExtractError::ProcessFailed("extractor shut down".to_string()))?;

        let stem = Uuid::new_v4().to_string();
        tracing::debug!(url = %url, stem = %stem, "Starting extraction");

        let output = self.command(url, &stem).output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ExtractError::ToolNotFound(self.config.ytdlp_path.clone())
            } else {
                ExtractError::ProcessFailed(e.to_string())
            }
        })?;

        if !output.status.success() {
            remove_outputs(&self.config.dir, &stem).await;
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("no diagnostic output")
                .trim()
                .to_string();
            tracing::warn!(url = %url, status = %output.status, reason = %reason, "Extraction failed");
            return Err(ExtractError::ProcessFailed(reason));
        }

        let info = match parse_info(&output.stdout) {
            Ok(info) => info,
            Err(e) => {
                remove_outputs(&self.config.dir, &stem).await;
                return Err(e);
            }
        };

        if info.is_playlist() {
            remove_outputs(&self.config.dir, &stem).await;
            return Err(ExtractError::PlaylistUrl(url.to_string()));
        }

        let extraction = collect_outputs(&self.config.dir, &stem, info).await?;
        tracing::info!(
            url = %url,
            bytes = extraction.data.len(),
            ext = %extraction.ext,
            has_thumbnail = extraction.thumbnail.is_some(),
            "Extraction finished"
        );
        Ok(extraction)
    }
}

/// Parse the single JSON document `yt-dlp` prints on stdout
pub fn parse_info(stdout: &[u8]) -> Result<ExtractInfo, ExtractError> {
    serde_json::from_slice(stdout).map_err(|e| ExtractError::MalformedOutput(e.to_string()))
}

/// Files in `dir` whose name is `{stem}.{ext}`
async fn outputs_for(dir: &Path, stem: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.file_stem().and_then(|s| s.to_str()) == Some(stem) {
            found.push(path);
        }
    }
    Ok(found)
}

async fn remove_outputs(dir: &Path, stem: &str) {
    if let Ok(paths) = outputs_for(dir, stem).await {
        for path in paths {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!(error = %e, path = %path.display(), "Failed to remove extraction leftover");
            }
        }
    }
}

/// Read and delete the files produced for `stem`
///
/// The file whose extension matches `info.ext` is the audio payload; any
/// other file with the same stem is taken as the thumbnail.
pub async fn collect_outputs(
    dir: &Path,
    stem: &str,
    info: ExtractInfo,
) -> Result<Extraction, ExtractError> {
    let paths = outputs_for(dir, stem).await?;

    let audio_ext = match info.ext.clone() {
        Some(ext) => ext,
        None => {
            remove_outputs(dir, stem).await;
            return Err(ExtractError::MalformedOutput(
                "info JSON has no `ext` field".to_string(),
            ));
        }
    };

    let mut data = None;
    let mut thumbnail = None;
    for path in paths {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let bytes = match take_file(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                remove_outputs(dir, stem).await;
                return Err(e.into());
            }
        };

        if ext == audio_ext {
            data = Some(bytes);
        } else {
            thumbnail = Some(ExtractedThumbnail { data: bytes, ext });
        }
    }

    let data = data.ok_or_else(|| {
        ExtractError::MalformedOutput(format!("no .{} file was written", audio_ext))
    })?;

    Ok(Extraction {
        data,
        ext: audio_ext,
        thumbnail,
        info,
    })
}

async fn take_file(path: &Path) -> std::io::Result<Bytes> {
    let bytes = tokio::fs::read(path).await?;
    tokio::fs::remove_file(path).await?;
    Ok(Bytes::from(bytes))
}

/// Create the extraction directory and delete anything left in it
///
/// Returns the number of removed files.
pub async fn clear_extraction_dir(dir: &Path) -> std::io::Result<usize> {
    tokio::fs::create_dir_all(dir).await?;

    let mut removed = 0;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            tokio::fs::remove_file(entry.path()).await?;
            removed += 1;
        }
    }
    Ok(removed)
}
