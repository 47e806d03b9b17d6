//! Job registry error types

use thiserror::Error;

/// Captured failure of a single work unit
///
/// A failing unit never aborts its siblings; its failure is recorded here and
/// the unit still counts towards the job's progress.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnitError {
    /// The unit returned an error
    #[error("work unit failed: {0}")]
    Failed(String),

    /// The unit panicked while running
    #[error("work unit panicked: {0}")]
    Panicked(String),

    /// The unit was aborted because its job was evicted
    #[error("work unit cancelled")]
    Cancelled,
}

impl UnitError {
    /// Check if the unit was stopped by eviction rather than failing on its own
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result of one work unit as seen by the registry
pub type UnitOutcome<T> = Result<T, UnitError>;

/// Errors surfaced by registry lookups
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// No job is registered under this id
    #[error("job not found: {0}")]
    NotFound(String),
}

/// Result type for registry lookups
pub type JobResult<T> = Result<T, JobError>;
