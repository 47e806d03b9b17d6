//! Data models for the Btecify API

pub mod jobs;
pub mod library;

pub use jobs::{DownloadsStarted, SongCreated};
pub use library::{
    FullSync, FullSyncSummary, PlaylistFullSync, SongDownload, SongFullSync, SongIn, SongSource,
    Thumbnail,
};
