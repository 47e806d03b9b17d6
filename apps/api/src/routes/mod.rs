//! HTTP route handlers for the Btecify API
//!
//! - Job status and live progress
//! - Library sync and downloads
//! - Payload streaming
//! - Health checks

pub mod health;
pub mod jobs;
pub mod library;
pub mod streaming;

pub use health::{health_router, HealthState};
pub use jobs::{jobs_router, JobsState};
pub use library::{library_router, LibraryState};
pub use streaming::{streaming_router, StreamingState};
