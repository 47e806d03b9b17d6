//! Business logic services for Btecify
//!
//! - Media extraction through `yt-dlp`
//! - Payload storage on disk
//! - Download jobs on the job registry
//! - Full library sync
//! - Health checks

pub mod downloads;
pub mod extractor;
pub mod health;
pub mod library;
pub mod storage;

pub use downloads::DownloadService;
pub use extractor::{clear_extraction_dir, ExtractError, Extractor, YtDlpExtractor};
pub use health::HealthService;
pub use library::{LibraryService, SyncPlan};
pub use storage::{content_hash, PayloadStore};
