//! Error handling for the Btecify API
//!
//! One error type for every handler, mapped to an HTTP status and a stable
//! error code through Axum's `IntoResponse`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use btecify_jobs::JobError;
use serde::Serialize;
use thiserror::Error;

use crate::services::extractor::ExtractError;

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for client-side handling
    pub code: &'static str,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Main API error type
#[derive(Error, Debug)]
pub enum ApiError {
    // ========== Resource Errors ==========
    /// Requested resource not found
    #[error("{resource_type} not found: {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// Access to a stored file was refused
    #[error("access denied: {0}")]
    Forbidden(String),

    // ========== Validation Errors ==========
    /// Request validation failed
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Invalid query parameter
    #[error("invalid query parameter '{name}': {reason}")]
    InvalidQueryParam { name: &'static str, reason: String },

    // ========== Database Errors ==========
    /// Database query failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Database connection pool exhausted
    #[error("database connection unavailable")]
    DatabaseUnavailable,

    // ========== Extraction Errors ==========
    /// The external extractor failed
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    // ========== Audio/Streaming Errors ==========
    /// Stored payload missing on disk
    #[error("audio file not found: {0}")]
    AudioFileNotFound(String),

    /// Reading a stored payload failed
    #[error("audio processing error: {0}")]
    AudioProcessing(String),

    /// Range request invalid (400 Bad Request)
    #[error("invalid range request: {0}")]
    InvalidRange(String),

    /// Range not satisfiable (416 Range Not Satisfiable)
    #[error("range not satisfiable")]
    RangeNotSatisfiable { file_size: u64 },

    // ========== Configuration Errors ==========
    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    // ========== Internal Errors ==========
    /// Internal server error (catch-all for unexpected errors)
    #[error("internal server error: {0}")]
    Internal(String),

    /// JSON serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ApiError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 404 Not Found
            Self::NotFound { .. } | Self::AudioFileNotFound(_) => StatusCode::NOT_FOUND,

            // 403 Forbidden
            Self::Forbidden(_) => StatusCode::FORBIDDEN,

            // 400 Bad Request
            Self::ValidationError(_) | Self::InvalidQueryParam { .. } | Self::InvalidRange(_) => {
                StatusCode::BAD_REQUEST
            }

            // 416 Range Not Satisfiable
            Self::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,

            // 422 Unprocessable Entity
            Self::Serialization(_) => StatusCode::UNPROCESSABLE_ENTITY,

            // 503 Service Unavailable
            Self::DatabaseUnavailable => StatusCode::SERVICE_UNAVAILABLE,

            Self::Extraction(e) => match e {
                ExtractError::PlaylistUrl(_) => StatusCode::BAD_REQUEST,
                ExtractError::ToolNotFound(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_GATEWAY,
            },

            // 500 Internal Server Error
            Self::Database(_)
            | Self::AudioProcessing(_)
            | Self::Configuration(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for client-side handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::InvalidQueryParam { .. } => "INVALID_QUERY_PARAM",
            Self::Database(_) => "DATABASE_ERROR",
            Self::DatabaseUnavailable => "DATABASE_UNAVAILABLE",
            Self::Extraction(ExtractError::PlaylistUrl(_)) => "PLAYLIST_URL",
            Self::Extraction(_) => "EXTRACTION_ERROR",
            Self::AudioFileNotFound(_) => "AUDIO_NOT_FOUND",
            Self::AudioProcessing(_) => "AUDIO_PROCESSING_ERROR",
            Self::InvalidRange(_) => "INVALID_RANGE",
            Self::RangeNotSatisfiable { .. } => "RANGE_NOT_SATISFIABLE",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Create a not found error for a specific resource
    pub fn not_found(resource_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type,
            id: id.into(),
        }
    }

    /// Log the error with appropriate severity based on status code
    pub fn log(&self) {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(
                error = %self,
                code = self.error_code(),
                status = status.as_u16(),
                "Server error occurred"
            );
        } else {
            tracing::debug!(
                error = %self,
                code = self.error_code(),
                status = status.as_u16(),
                "Client error"
            );
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.status_code();
        let error_response = ErrorResponse {
            code: self.error_code(),
            message: self.to_string(),
            details: None,
        };

        // RFC 7233: report the full length alongside a 416
        if let Self::RangeNotSatisfiable { file_size } = &self {
            return (
                status,
                [("Content-Range", format!("bytes */{}", file_size))],
                Json(error_response),
            )
                .into_response();
        }

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

// ========== Conversion Implementations ==========

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::NotFound(id) => Self::not_found("job", id),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ApiError>() {
            Ok(api_err) => api_err,
            Err(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::AudioFileNotFound(err.to_string()),
            std::io::ErrorKind::PermissionDenied => {
                Self::Forbidden("file access denied".to_string())
            }
            _ => Self::AudioProcessing(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::not_found("song", "12").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::ValidationError("test".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::RangeNotSatisfiable { file_size: 10 }.status_code(),
            StatusCode::RANGE_NOT_SATISFIABLE
        );
        assert_eq!(
            ApiError::DatabaseUnavailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_extraction_status_codes() {
        assert_eq!(
            ApiError::from(ExtractError::PlaylistUrl("https://x/list".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(ExtractError::ToolNotFound("yt-dlp".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(ExtractError::ProcessFailed("exit 1".into())).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ApiError::not_found("song", "12").error_code(), "NOT_FOUND");
        assert_eq!(
            ApiError::from(ExtractError::PlaylistUrl("u".into())).error_code(),
            "PLAYLIST_URL"
        );
    }

    #[test]
    fn test_job_not_found_conversion() {
        let err = ApiError::from(JobError::NotFound("abc".to_string()));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "job not found: abc");
    }

    #[test]
    fn test_io_error_conversion() {
        let err = ApiError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.error_code(), "AUDIO_NOT_FOUND");

        let err = ApiError::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "nope",
        ));
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_range_not_satisfiable_sets_content_range() {
        let response = ApiError::RangeNotSatisfiable { file_size: 42 }.into_response();
        assert_eq!(
            response.headers().get("Content-Range").unwrap(),
            "bytes */42"
        );
    }
}
