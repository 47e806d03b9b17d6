//! Public data types exposed by the job registry

use std::borrow::Borrow;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque job identifier handed out by [`JobRegistry::submit`]
///
/// [`JobRegistry::submit`]: crate::JobRegistry::submit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Lets the job table be queried with a plain `&str`.
impl Borrow<str> for JobId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

/// Point-in-time view of a job
///
/// Taken under the job's lock, so `status == true` always comes with
/// `progress == size`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    /// Job identifier
    pub id: JobId,
    /// Number of work units submitted with the job
    pub size: usize,
    /// Number of work units that have finished, successfully or not
    pub progress: usize,
    /// Whether every work unit has finished
    pub status: bool,
    /// Last time a unit finished or the job was queried
    pub last_used: DateTime<Utc>,
}

impl JobSnapshot {
    /// Number of units still running
    pub fn remaining(&self) -> usize {
        self.size - self.progress
    }

    /// Completion ratio in `0.0..=1.0` (an empty job is fully complete)
    pub fn fraction(&self) -> f64 {
        if self.size == 0 {
            1.0
        } else {
            self.progress as f64 / self.size as f64
        }
    }
}

/// Jobs removed by one sweep pass
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Completed jobs reclaimed after the soft timeout
    pub completed: Vec<JobSnapshot>,
    /// Unfinished jobs force-evicted after the hard timeout
    pub abandoned: Vec<JobSnapshot>,
}

impl SweepReport {
    /// Total number of evicted jobs
    pub fn evicted(&self) -> usize {
        self.completed.len() + self.abandoned.len()
    }

    /// Whether the pass evicted nothing
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty() && self.abandoned.is_empty()
    }
}
