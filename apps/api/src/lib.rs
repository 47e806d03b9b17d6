//! Btecify API library
//!
//! Exposes the server's components for the binary and for integration tests.

pub mod config;
pub mod error;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod websocket;

pub use error::{ApiError, ApiResult, ErrorResponse};
