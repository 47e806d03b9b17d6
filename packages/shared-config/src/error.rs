//! Errors raised while reading settings from the environment

use thiserror::Error;

/// Why a service could not build its configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A variable with no usable default, such as `DATABASE_URL` in production
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Variable name and the reason its value was rejected
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    /// Connection URL with an unsupported scheme
    #[error("invalid URL format for {0}: {1}")]
    InvalidUrl(String, String),

    /// Values that parse on their own but conflict, like a hard job timeout
    /// shorter than the soft one
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
