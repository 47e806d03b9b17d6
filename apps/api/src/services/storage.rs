//! On-disk payload storage
//!
//! Payloads are stored flat under one root as `{data_uuid}.{ext}`. Both parts
//! are validated before a path is built, so database values can never point
//! outside the root.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// Longest accepted file extension
const MAX_EXT_LEN: usize = 10;

/// Flat directory of stored payload files
#[derive(Debug, Clone)]
pub struct PayloadStore {
    root: PathBuf,
}

impl PayloadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the storage root if it does not exist
    pub async fn ensure_root(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    /// Resolve the file path of a stored payload
    pub fn path_for(&self, data_uuid: &str, ext: &str) -> ApiResult<PathBuf> {
        let uuid = Uuid::parse_str(data_uuid).map_err(|_| {
            tracing::warn!(data_uuid = %data_uuid, "Rejected malformed payload id");
            ApiError::Forbidden("invalid payload id".to_string())
        })?;

        if !is_valid_ext(ext) {
            tracing::warn!(ext = %ext, "Rejected malformed payload extension");
            return Err(ApiError::Forbidden("invalid payload extension".to_string()));
        }

        Ok(self.root.join(format!("{}.{}", uuid.hyphenated(), ext)))
    }

    /// Write a new payload and return its id
    pub async fn write(&self, data: &[u8], ext: &str) -> ApiResult<String> {
        let data_uuid = Uuid::new_v4().to_string();
        let path = self.path_for(&data_uuid, ext)?;
        tokio::fs::write(&path, data).await?;
        Ok(data_uuid)
    }

    /// Write a new payload that is deleted again unless [`StagedPayload::keep`] is called
    pub async fn stage(&self, data: &[u8], ext: &str) -> ApiResult<StagedPayload> {
        let data_uuid = self.write(data, ext).await?;
        let path = self.path_for(&data_uuid, ext)?;
        Ok(StagedPayload {
            data_uuid,
            ext: ext.to_string(),
            path,
            kept: false,
        })
    }

    /// Delete a payload, ignoring files that are already gone
    pub async fn remove(&self, data_uuid: &str, ext: &str) -> ApiResult<()> {
        let path = self.path_for(data_uuid, ext)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Payload file that no database row refers to yet
///
/// Dropping it without calling [`keep`](Self::keep) deletes the file, also
/// when the owning task is aborted mid-download.
#[derive(Debug)]
#[must_use = "a staged payload is deleted when dropped"]
pub struct StagedPayload {
    data_uuid: String,
    ext: String,
    path: PathBuf,
    kept: bool,
}

impl StagedPayload {
    pub fn data_uuid(&self) -> &str {
        &self.data_uuid
    }

    pub fn ext(&self) -> &str {
        &self.ext
    }

    /// Leave the file in place and hand back its id
    pub fn keep(mut self) -> String {
        self.kept = true;
        std::mem::take(&mut self.data_uuid)
    }
}

impl Drop for StagedPayload {
    fn drop(&mut self) {
        if self.kept {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(data_uuid = %self.data_uuid, "Discarded staged payload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                data_uuid = %self.data_uuid,
                error = %e,
                "Failed to remove staged payload"
            ),
        }
    }
}

fn is_valid_ext(ext: &str) -> bool {
    !ext.is_empty() && ext.len() <= MAX_EXT_LEN && ext.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Hex SHA-256 digest used to deduplicate thumbnails
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
