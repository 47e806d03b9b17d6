//! Responses for endpoints that start background jobs

use btecify_jobs::JobId;
use serde::{Deserialize, Serialize};

/// Response of `POST /api/song`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongCreated {
    pub song_id: i32,
    pub job_id: JobId,
}

/// Response of `POST /api/downloads`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadsStarted {
    pub job_id: JobId,
    /// Number of songs queued for download
    pub size: usize,
}
