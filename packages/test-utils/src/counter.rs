//! Invocation counter shared between a test and spawned tasks

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Thread-safe call counter
///
/// All clones share the same count, so one clone can be moved into a
/// completion callback while the test keeps another.
#[derive(Debug, Clone, Default)]
pub struct CallCounter {
    calls: Arc<AtomicUsize>,
}

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one invocation
    pub fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of recorded invocations
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}
