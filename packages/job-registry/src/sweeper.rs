//! Idle sweep and the periodic sweeper task

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::SweepReport;
use crate::registry::JobRegistry;

impl JobRegistry {
    /// Evict jobs that violate the idle policy, measured from now
    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(Instant::now())
    }

    /// Evict jobs that violate the idle policy, measured from `now`
    ///
    /// - completed jobs idle longer than the soft timeout are reclaimed
    /// - any job idle longer than the hard timeout is force-evicted
    ///
    /// The id list is snapshotted before iterating; jobs submitted meanwhile
    /// are either skipped or seen with zero idle time.
    pub fn sweep_at(&self, now: Instant) -> SweepReport {
        let policy = self.policy();
        let mut report = SweepReport::default();

        for job_id in self.job_ids() {
            // Idle time is re-read under the removal lock, so a lookup that
            // lands just before the check keeps the job.
            let mut verdict = None;
            let evicted = self.evict_if(job_id.as_str(), |entry| {
                let (idle, snapshot) = entry.idle_snapshot(now);
                if snapshot.status && idle > policy.soft_timeout {
                    verdict = Some((Eviction::Completed, idle, snapshot));
                } else if idle > policy.hard_timeout {
                    verdict = Some((Eviction::Abandoned, idle, snapshot));
                }
                verdict.is_some()
            });

            match verdict {
                Some((Eviction::Completed, _, snapshot)) if evicted => {
                    report.completed.push(snapshot)
                }
                Some((Eviction::Abandoned, idle, snapshot)) if evicted => {
                    warn!(
                        job_id = %job_id,
                        progress = snapshot.progress,
                        size = snapshot.size,
                        idle_secs = idle.as_secs(),
                        "Force-evicted idle unfinished job; results of its running units are discarded"
                    );
                    report.abandoned.push(snapshot);
                }
                _ => {}
            }
        }

        report
    }
}

/// Which timeout a swept job ran into
enum Eviction {
    Completed,
    Abandoned,
}

/// Spawn the periodic sweeper on the registry's runtime
///
/// Runs [`JobRegistry::sweep`] every `policy.interval` until `shutdown` is
/// cancelled.
pub fn spawn_sweeper(registry: JobRegistry, shutdown: CancellationToken) -> JoinHandle<()> {
    let period = registry.policy().interval;
    let executor = registry.executor().clone();

    executor.spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = period.as_secs(), "Job sweeper started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Job sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let report = registry.sweep();
                    if !report.is_empty() {
                        debug!(
                            completed = report.completed.len(),
                            abandoned = report.abandoned.len(),
                            remaining = registry.len(),
                            "Sweep evicted idle jobs"
                        );
                    }
                }
            }
        }
    })
}
