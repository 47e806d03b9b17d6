//! WebSocket message types
//!
//! Messages are JSON objects of the form `{"type": ..., "payload": ...}`.

use btecify_jobs::JobSnapshot;
use serde::{Deserialize, Serialize};

/// Messages sent from server to client on a job progress socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum JobMessage {
    /// Current state of the watched job
    Progress(JobSnapshot),

    /// The job cannot be watched (unknown or evicted)
    Error(ErrorPayload),
}

/// Payload for Error message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl ErrorPayload {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn job_not_found(job_id: &str) -> Self {
        Self::new("JOB_NOT_FOUND", format!("job not found: {}", job_id))
    }
}
