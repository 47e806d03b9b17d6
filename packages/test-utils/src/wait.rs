//! Polling helper for eventually-consistent assertions

use std::future::Future;
use std::time::Duration;

/// Wait for a condition with timeout
///
/// Polls `condition` every `poll_interval_ms` and returns `true` as soon as it
/// holds, or `false` once `timeout_ms` has elapsed.
pub async fn wait_for<F, Fut>(condition: F, timeout_ms: u64, poll_interval_ms: u64) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    let timeout = Duration::from_millis(timeout_ms);
    let interval = Duration::from_millis(poll_interval_ms);

    loop {
        if condition().await {
            return true;
        }

        if start.elapsed() >= timeout {
            return false;
        }

        tokio::time::sleep(interval).await;
    }
}
