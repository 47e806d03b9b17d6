//! Idle-eviction policy

use std::time::Duration;

/// Default sweep interval in seconds
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;

/// Default grace period for completed jobs in seconds
const DEFAULT_SOFT_TIMEOUT_SECS: u64 = 30;

/// Default idle ceiling for any job in seconds
const DEFAULT_HARD_TIMEOUT_SECS: u64 = 180;

/// Timing rules applied by [`JobRegistry::sweep`]
///
/// [`JobRegistry::sweep`]: crate::JobRegistry::sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepPolicy {
    /// How often the background sweeper runs
    pub interval: Duration,
    /// Completed jobs idle for longer than this are evicted
    pub soft_timeout: Duration,
    /// Any job idle for longer than this is evicted
    pub hard_timeout: Duration,
}

impl SweepPolicy {
    pub fn new(interval: Duration, soft_timeout: Duration, hard_timeout: Duration) -> Self {
        Self {
            interval,
            soft_timeout,
            hard_timeout,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_soft_timeout(mut self, soft_timeout: Duration) -> Self {
        self.soft_timeout = soft_timeout;
        self
    }

    pub fn with_hard_timeout(mut self, hard_timeout: Duration) -> Self {
        self.hard_timeout = hard_timeout;
        self
    }
}

impl Default for SweepPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            soft_timeout: Duration::from_secs(DEFAULT_SOFT_TIMEOUT_SECS),
            hard_timeout: Duration::from_secs(DEFAULT_HARD_TIMEOUT_SECS),
        }
    }
}
