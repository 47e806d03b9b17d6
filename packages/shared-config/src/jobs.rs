//! Background job timing configuration

use std::time::Duration;

use crate::{parse_env, ConfigError, ConfigResult};

/// Timing knobs for the job registry and its progress stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobsConfig {
    /// Seconds between idle sweeps
    pub sweep_interval_secs: u64,

    /// Seconds a completed job stays queryable after its last use
    pub soft_timeout_secs: u64,

    /// Seconds after which any idle job is evicted
    pub hard_timeout_secs: u64,

    /// Milliseconds between progress pushes on a WebSocket
    pub poll_interval_ms: u64,
}

impl JobsConfig {
    /// Load job configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        let config = Self {
            sweep_interval_secs: parse_env("JOB_SWEEP_INTERVAL", 30)?,
            soft_timeout_secs: parse_env("JOB_SOFT_TIMEOUT", 30)?,
            hard_timeout_secs: parse_env("JOB_HARD_TIMEOUT", 180)?,
            poll_interval_ms: parse_env("JOB_POLL_INTERVAL_MS", 500)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that every interval is positive and the hard timeout is not
    /// shorter than the soft one
    pub fn validate(&self) -> ConfigResult<()> {
        let positive = [
            ("JOB_SWEEP_INTERVAL", self.sweep_interval_secs),
            ("JOB_SOFT_TIMEOUT", self.soft_timeout_secs),
            ("JOB_HARD_TIMEOUT", self.hard_timeout_secs),
            ("JOB_POLL_INTERVAL_MS", self.poll_interval_ms),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::InvalidValue(
                name.to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        if self.hard_timeout_secs < self.soft_timeout_secs {
            return Err(ConfigError::ValidationError(format!(
                "JOB_HARD_TIMEOUT ({}s) must not be shorter than JOB_SOFT_TIMEOUT ({}s)",
                self.hard_timeout_secs, self.soft_timeout_secs
            )));
        }

        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn soft_timeout(&self) -> Duration {
        Duration::from_secs(self.soft_timeout_secs)
    }

    pub fn hard_timeout(&self) -> Duration {
        Duration::from_secs(self.hard_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 30,
            soft_timeout_secs: 30,
            hard_timeout_secs: 180,
            poll_interval_ms: 500,
        }
    }
}
