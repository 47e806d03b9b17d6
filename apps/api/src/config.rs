//! API server configuration

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use btecify_jobs::SweepPolicy;
use btecify_shared_config::{
    CommonConfig, DatabaseConfig, Environment, ExtractionConfig, JobsConfig,
};

/// API server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Common configuration shared with other services
    pub common: CommonConfig,

    /// Server port (default: 8080)
    pub port: u16,

    /// CORS allowed origins (optional)
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// In production mode `DATABASE_URL` must be set explicitly; elsewhere
    /// the local development database is the fallback.
    pub fn from_env() -> Result<Self> {
        let environment = Environment::from_str(
            &env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        )
        .unwrap_or_default();

        if environment.is_production() {
            Self::validate_database_url()?;
        }

        let common = CommonConfig::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

        Ok(Self {
            common,

            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid PORT value")?,

            cors_allowed_origins: env::var("CORS_ORIGINS").ok().map(|s| {
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            }),
        })
    }

    /// Validate that DATABASE_URL is explicitly set in production
    fn validate_database_url() -> Result<()> {
        match env::var("DATABASE_URL") {
            Ok(url) if !url.is_empty() => Ok(()),
            _ => {
                bail!(
                    "DATABASE_URL environment variable is required in production. \
                     Please set your PostgreSQL connection string."
                );
            }
        }
    }

    pub fn database(&self) -> &DatabaseConfig {
        &self.common.database
    }

    pub fn jobs(&self) -> &JobsConfig {
        &self.common.jobs
    }

    pub fn extraction(&self) -> &ExtractionConfig {
        &self.common.extraction
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.common.environment.is_production()
    }

    /// Eviction policy for the job registry
    pub fn sweep_policy(&self) -> SweepPolicy {
        let jobs = self.jobs();
        SweepPolicy::new(jobs.sweep_interval(), jobs.soft_timeout(), jobs.hard_timeout())
    }

    /// Interval between WebSocket progress pushes
    pub fn poll_interval(&self) -> Duration {
        self.jobs().poll_interval()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_url_required_in_production() {
        temp_env::with_vars(
            [("ENVIRONMENT", Some("production")), ("DATABASE_URL", None)],
            || {
                let err = Config::from_env().unwrap_err();
                assert!(err.to_string().contains("DATABASE_URL"));
            },
        );
    }

    #[test]
    fn test_empty_database_url_rejected_in_production() {
        temp_env::with_vars(
            [("ENVIRONMENT", Some("production")), ("DATABASE_URL", Some(""))],
            || {
                assert!(Config::from_env().is_err());
            },
        );
    }

    #[test]
    fn test_development_defaults() {
        temp_env::with_vars(
            [
                ("ENVIRONMENT", None::<&str>),
                ("DATABASE_URL", None),
                ("PORT", None),
                ("CORS_ORIGINS", None),
                ("JOB_SOFT_TIMEOUT", None),
                ("JOB_HARD_TIMEOUT", None),
                ("JOB_SWEEP_INTERVAL", None),
                ("JOB_POLL_INTERVAL_MS", None),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.port, 8080);
                assert!(config.cors_allowed_origins.is_none());
                assert!(!config.is_production());
                assert_eq!(config.sweep_policy(), SweepPolicy::default());
                assert_eq!(config.poll_interval(), Duration::from_millis(500));
            },
        );
    }

    #[test]
    fn test_cors_origins_are_split_and_trimmed() {
        temp_env::with_var(
            "CORS_ORIGINS",
            Some("http://localhost:3000, https://music.example.com,,"),
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(
                    config.cors_allowed_origins.unwrap(),
                    vec![
                        "http://localhost:3000".to_string(),
                        "https://music.example.com".to_string()
                    ]
                );
            },
        );
    }

    #[test]
    fn test_invalid_port() {
        temp_env::with_var("PORT", Some("eighty"), || {
            let err = Config::from_env().unwrap_err();
            assert!(err.to_string().contains("PORT"));
        });
    }

    #[test]
    fn test_sweep_policy_follows_job_config() {
        temp_env::with_vars(
            [
                ("JOB_SWEEP_INTERVAL", Some("10")),
                ("JOB_SOFT_TIMEOUT", Some("20")),
                ("JOB_HARD_TIMEOUT", Some("90")),
            ],
            || {
                let policy = Config::from_env().unwrap().sweep_policy();
                assert_eq!(policy.interval, Duration::from_secs(10));
                assert_eq!(policy.soft_timeout, Duration::from_secs(20));
                assert_eq!(policy.hard_timeout, Duration::from_secs(90));
            },
        );
    }

    #[test]
    fn test_invalid_job_timeouts_fail_startup() {
        temp_env::with_vars(
            [("JOB_SOFT_TIMEOUT", Some("300")), ("JOB_HARD_TIMEOUT", Some("60"))],
            || {
                assert!(Config::from_env().is_err());
            },
        );
    }
}
