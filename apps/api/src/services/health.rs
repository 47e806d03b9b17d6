//! Health checks for the API's dependencies
//!
//! - PostgreSQL database (required)
//! - `yt-dlp` extractor (required for downloads)
//! - in-process job registry (always healthy, reports its size)

use std::sync::Arc;
use std::time::{Duration, Instant};

use btecify_jobs::JobRegistry;
use serde::Serialize;
use sqlx::PgPool;

use crate::services::extractor::Extractor;

/// Upper bound on a single database probe
const DATABASE_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Status of an individual service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Service is healthy and responding
    Healthy,
    /// Service is unhealthy or unreachable
    Unhealthy,
    /// Service check was skipped
    Skipped,
}

/// Result of a single service health check
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub name: &'static str,
    pub status: ServiceStatus,
    /// Response time in milliseconds (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ServiceHealth {
    pub fn healthy(name: &'static str, response_time: Duration) -> Self {
        Self {
            name,
            status: ServiceStatus::Healthy,
            response_time_ms: Some(response_time.as_millis() as u64),
            error: None,
            details: None,
        }
    }

    pub fn healthy_with_details(
        name: &'static str,
        response_time: Duration,
        details: serde_json::Value,
    ) -> Self {
        Self {
            details: Some(details),
            ..Self::healthy(name, response_time)
        }
    }

    pub fn unhealthy(name: &'static str, error: impl Into<String>) -> Self {
        Self {
            name,
            status: ServiceStatus::Unhealthy,
            response_time_ms: None,
            error: Some(error.into()),
            details: None,
        }
    }

    pub fn unhealthy_with_time(
        name: &'static str,
        error: impl Into<String>,
        response_time: Duration,
    ) -> Self {
        Self {
            response_time_ms: Some(response_time.as_millis() as u64),
            ..Self::unhealthy(name, error)
        }
    }

    pub fn skipped(name: &'static str, reason: impl Into<String>) -> Self {
        Self {
            name,
            status: ServiceStatus::Skipped,
            response_time_ms: None,
            error: None,
            details: Some(serde_json::json!({ "reason": reason.into() })),
        }
    }
}

/// Aggregated health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResponse {
    /// Healthy only if every non-skipped service is healthy
    pub status: ServiceStatus,
    pub services: Vec<ServiceHealth>,
    pub total_time_ms: u64,
    pub version: &'static str,
}

impl HealthCheckResponse {
    pub fn new(services: Vec<ServiceHealth>, total_time: Duration) -> Self {
        let status = if services
            .iter()
            .all(|s| s.status == ServiceStatus::Healthy || s.status == ServiceStatus::Skipped)
        {
            ServiceStatus::Healthy
        } else {
            ServiceStatus::Unhealthy
        };

        Self {
            status,
            services,
            total_time_ms: total_time.as_millis() as u64,
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == ServiceStatus::Healthy
    }
}

/// Runs the readiness checks
#[derive(Clone)]
pub struct HealthService {
    pool: Option<PgPool>,
    registry: JobRegistry,
    extractor: Option<Arc<dyn Extractor>>,
}

impl HealthService {
    pub fn new(pool: PgPool, registry: JobRegistry, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            pool: Some(pool),
            registry,
            extractor: Some(extractor),
        }
    }

    /// Health service that only knows about the job registry
    pub fn registry_only(registry: JobRegistry) -> Self {
        Self {
            pool: None,
            registry,
            extractor: None,
        }
    }

    pub async fn check_database(&self) -> ServiceHealth {
        let Some(pool) = &self.pool else {
            return ServiceHealth::skipped("database", "not configured");
        };

        let start = Instant::now();
        let probe = sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool);

        match tokio::time::timeout(DATABASE_CHECK_TIMEOUT, probe).await {
            Ok(Ok(_)) => ServiceHealth::healthy_with_details(
                "database",
                start.elapsed(),
                serde_json::json!({
                    "pool_size": pool.size(),
                    "idle_connections": pool.num_idle(),
                }),
            ),
            Ok(Err(e)) => ServiceHealth::unhealthy_with_time(
                "database",
                format!("Query failed: {}", e),
                start.elapsed(),
            ),
            Err(_) => ServiceHealth::unhealthy_with_time(
                "database",
                "Query timed out",
                start.elapsed(),
            ),
        }
    }

    pub async fn check_extractor(&self) -> ServiceHealth {
        let Some(extractor) = &self.extractor else {
            return ServiceHealth::skipped("extractor", "not configured");
        };

        let start = Instant::now();
        if extractor.is_available().await {
            ServiceHealth::healthy("extractor", start.elapsed())
        } else {
            ServiceHealth::unhealthy_with_time(
                "extractor",
                "yt-dlp executable could not be run",
                start.elapsed(),
            )
        }
    }

    pub fn check_jobs(&self) -> ServiceHealth {
        let start = Instant::now();
        let snapshots = self.registry.snapshots();
        let running = snapshots.iter().filter(|s| !s.status).count();

        ServiceHealth::healthy_with_details(
            "jobs",
            start.elapsed(),
            serde_json::json!({
                "registered": snapshots.len(),
                "running": running,
            }),
        )
    }

    /// Run every check concurrently
    pub async fn check_all(&self) -> HealthCheckResponse {
        let start = Instant::now();

        let (database, extractor) = tokio::join!(self.check_database(), self.check_extractor());
        let services = vec![database, extractor, self.check_jobs()];

        HealthCheckResponse::new(services, start.elapsed())
    }
}
