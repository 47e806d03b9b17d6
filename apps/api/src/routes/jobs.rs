//! Job status routes
//!
//! - `GET /` - every registered job (does not count as use)
//! - `GET /:job_id` - one job's snapshot
//! - `DELETE /:job_id` - evict a job and cancel its running units
//! - `GET /:job_id/ws` - live progress over a WebSocket

use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use btecify_jobs::{JobRegistry, JobSnapshot};

use crate::error::{ApiError, ApiResult};
use crate::websocket::job_progress_ws;

/// Shared state for job handlers
#[derive(Clone)]
pub struct JobsState {
    pub registry: JobRegistry,
    /// How often a progress socket polls its job
    pub poll_interval: Duration,
}

impl JobsState {
    pub fn new(registry: JobRegistry, poll_interval: Duration) -> Self {
        Self {
            registry,
            poll_interval,
        }
    }
}

pub fn jobs_router(state: JobsState) -> Router {
    Router::new()
        .route("/", get(list_jobs))
        .route("/:job_id", get(get_job).delete(evict_job))
        .route("/:job_id/ws", get(job_progress_ws))
        .with_state(state)
}

async fn list_jobs(State(state): State<JobsState>) -> Json<Vec<JobSnapshot>> {
    let mut jobs = state.registry.snapshots();
    jobs.sort_by(|a, b| a.last_used.cmp(&b.last_used).reverse());
    Json(jobs)
}

async fn get_job(
    State(state): State<JobsState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobSnapshot>> {
    Ok(Json(state.registry.require(&job_id)?))
}

async fn evict_job(
    State(state): State<JobsState>,
    Path(job_id): Path<String>,
) -> ApiResult<StatusCode> {
    if state.registry.evict(&job_id) {
        tracing::info!(job_id = %job_id, "Job evicted on request");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("job", job_id))
    }
}
