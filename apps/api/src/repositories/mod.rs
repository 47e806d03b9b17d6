//! Database repository layer for Btecify
//!
//! All SQL lives here; services and routes go through the repositories.

pub mod library;

pub use library::{LibraryRepository, PendingDownload};
