//! Media extraction and payload storage configuration types

use std::path::PathBuf;

use crate::{get_env_or_default, parse_env, ConfigError, ConfigResult};

/// Settings for the external `yt-dlp` extractor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionConfig {
    /// Scratch directory for downloaded files, emptied at startup
    pub dir: PathBuf,

    /// Path or name of the `yt-dlp` executable
    pub ytdlp_path: String,

    /// Format selector passed to `yt-dlp -f`
    pub format: String,

    /// Maximum number of concurrent `yt-dlp` processes
    pub max_concurrent: usize,

    /// Directory holding stored audio and thumbnail payloads
    pub storage_dir: PathBuf,
}

impl ExtractionConfig {
    /// Load extraction configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        let max_concurrent = parse_env("EXTRACTION_MAX_CONCURRENT", 4)?;
        if max_concurrent == 0 {
            return Err(ConfigError::InvalidValue(
                "EXTRACTION_MAX_CONCURRENT".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            dir: PathBuf::from(get_env_or_default("EXTRACTION_DIR", "./extractions")),
            ytdlp_path: get_env_or_default("YTDLP_PATH", "yt-dlp"),
            format: get_env_or_default("EXTRACTION_FORMAT", "worstaudio"),
            max_concurrent,
            storage_dir: PathBuf::from(get_env_or_default("STORAGE_DIR", "./storage")),
        })
    }

    /// Create a configuration rooted at custom directories (useful for testing)
    pub fn with_dirs(dir: impl Into<PathBuf>, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            storage_dir: storage_dir.into(),
            ..Self::default()
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./extractions"),
            ytdlp_path: "yt-dlp".to_string(),
            format: "worstaudio".to_string(),
            max_concurrent: 4,
            storage_dir: PathBuf::from("./storage"),
        }
    }
}
