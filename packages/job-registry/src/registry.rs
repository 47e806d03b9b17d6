//! Job table and supervised execution of work units

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt};
use tokio::runtime::Handle;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{JobError, JobResult, UnitError, UnitOutcome};
use crate::models::{JobId, JobSnapshot};
use crate::policy::SweepPolicy;

/// Callback run once after every unit of a job has finished
///
/// Typically commits the job's results somewhere. Build one with
/// [`completion`].
pub type CompletionCallback = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// Wrap an async closure into a [`CompletionCallback`]
pub fn completion<F, Fut>(f: F) -> CompletionCallback
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Box::new(move || f().boxed())
}

/// Lock a mutex, recovering the data if a previous holder panicked
///
/// Every critical section in this module is plain bookkeeping that leaves
/// the state consistent, so a poisoned lock carries no torn data.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mutable part of a job, guarded by one lock
struct JobState {
    progress: usize,
    status: bool,
    last_used: Instant,
    last_used_at: DateTime<Utc>,
    on_complete: Option<CompletionCallback>,
}

impl JobState {
    fn touch(&mut self) {
        self.last_used = Instant::now();
        self.last_used_at = Utc::now();
    }
}

/// Outcome of recording one finished unit
enum Progress {
    Partial,
    Completed(Option<CompletionCallback>),
}

/// A registered job
pub(crate) struct JobEntry {
    id: JobId,
    size: usize,
    state: Mutex<JobState>,
    units: Mutex<Vec<AbortHandle>>,
}

impl JobEntry {
    fn new(id: JobId, size: usize, on_complete: Option<CompletionCallback>) -> Self {
        Self {
            id,
            size,
            state: Mutex::new(JobState {
                progress: 0,
                status: size == 0,
                last_used: Instant::now(),
                last_used_at: Utc::now(),
                on_complete,
            }),
            units: Mutex::new(Vec::with_capacity(size)),
        }
    }

    fn snapshot_of(&self, state: &JobState) -> JobSnapshot {
        JobSnapshot {
            id: self.id.clone(),
            size: self.size,
            progress: state.progress,
            status: state.status,
            last_used: state.last_used_at,
        }
    }

    fn snapshot(&self) -> JobSnapshot {
        let state = lock(&self.state);
        self.snapshot_of(&state)
    }

    fn touch(&self) -> JobSnapshot {
        let mut state = lock(&self.state);
        state.touch();
        self.snapshot_of(&state)
    }

    /// Idle time relative to `now` together with a consistent snapshot
    pub(crate) fn idle_snapshot(&self, now: Instant) -> (Duration, JobSnapshot) {
        let state = lock(&self.state);
        (
            now.saturating_duration_since(state.last_used),
            self.snapshot_of(&state),
        )
    }

    fn take_callback(&self) -> Option<CompletionCallback> {
        lock(&self.state).on_complete.take()
    }

    fn record_completion(&self) -> Progress {
        let mut state = lock(&self.state);
        debug_assert!(state.progress < self.size, "more completions than units");
        state.progress = (state.progress + 1).min(self.size);
        state.touch();

        if state.progress == self.size && !state.status {
            state.status = true;
            Progress::Completed(state.on_complete.take())
        } else {
            Progress::Partial
        }
    }

    /// Abort every unit task that has not finished yet
    fn abort_unfinished(&self) -> usize {
        let mut units = lock(&self.units);
        let mut aborted = 0;
        for handle in units.drain(..) {
            if !handle.is_finished() {
                handle.abort();
                aborted += 1;
            }
        }
        aborted
    }
}

/// Handle to a submitted job that also exposes per-unit results
pub struct JobTicket<T> {
    id: JobId,
    units: Vec<JoinHandle<UnitOutcome<T>>>,
}

impl<T> JobTicket<T> {
    /// Id of the submitted job
    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// Discard the result handles and keep only the id
    ///
    /// The units keep running; dropping a handle does not cancel its task.
    pub fn into_id(self) -> JobId {
        self.id
    }

    /// Number of work units in the job
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Wait for every unit and collect their outcomes in submission order
    ///
    /// Units aborted by eviction report [`UnitError::Cancelled`].
    pub async fn results(self) -> Vec<UnitOutcome<T>> {
        let mut outcomes = Vec::with_capacity(self.units.len());
        for handle in self.units {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => Err(UnitError::Cancelled),
                Err(e) => Err(UnitError::Panicked(e.to_string())),
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}

impl<T> fmt::Debug for JobTicket<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobTicket")
            .field("id", &self.id)
            .field("units", &self.units.len())
            .finish()
    }
}

struct RegistryInner {
    jobs: DashMap<JobId, Arc<JobEntry>>,
    executor: Handle,
    policy: SweepPolicy,
}

/// Registry of in-flight and recently finished jobs
///
/// Cloning is cheap and every clone shares the same job table. Work units are
/// spawned on the runtime handle given at construction.
#[derive(Clone)]
pub struct JobRegistry {
    inner: Arc<RegistryInner>,
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.inner.jobs.len())
            .field("policy", &self.inner.policy)
            .finish()
    }
}

impl JobRegistry {
    /// Create a registry that spawns work on the current tokio runtime
    ///
    /// # Panics
    /// Panics when called outside of a tokio runtime.
    pub fn new(policy: SweepPolicy) -> Self {
        Self::with_handle(Handle::current(), policy)
    }

    /// Create a registry that spawns work on the given runtime
    pub fn with_handle(executor: Handle, policy: SweepPolicy) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                jobs: DashMap::new(),
                executor,
                policy,
            }),
        }
    }

    /// Eviction policy this registry was built with
    pub fn policy(&self) -> SweepPolicy {
        self.inner.policy
    }

    pub(crate) fn executor(&self) -> &Handle {
        &self.inner.executor
    }

    /// Number of registered jobs
    pub fn len(&self) -> usize {
        self.inner.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.jobs.is_empty()
    }

    /// Check whether a job is registered, without refreshing it
    pub fn contains(&self, job_id: impl AsRef<str>) -> bool {
        self.inner.jobs.contains_key(job_id.as_ref())
    }

    /// Submit a batch of work units as one job
    ///
    /// The job is registered and every unit is spawned as soon as this is
    /// called; the returned future only resolves the id. For an empty batch
    /// the completion callback is spawned right away and the returned future
    /// waits for it. Dropping the future detaches the callback.
    pub fn submit<I, F, T, E>(
        &self,
        units: I,
        on_complete: Option<CompletionCallback>,
    ) -> impl Future<Output = JobId> + Send + 'static
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let ticket = self.submit_tracked(units, on_complete);
        async move { ticket.await.into_id() }
    }

    /// Like [`submit`](Self::submit), but also hands back each unit's result
    pub fn submit_tracked<I, F, T, E>(
        &self,
        units: I,
        on_complete: Option<CompletionCallback>,
    ) -> impl Future<Output = JobTicket<T>> + Send + 'static
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let units: Vec<F> = units.into_iter().collect();
        let size = units.len();
        let id = JobId::generate();
        let entry = Arc::new(JobEntry::new(id.clone(), size, on_complete));

        let mut handles = Vec::with_capacity(size);
        {
            // Held across registration so a concurrent evict sees every handle.
            let mut unit_handles = lock(&entry.units);
            self.inner.jobs.insert(id.clone(), Arc::clone(&entry));

            for (index, unit) in units.into_iter().enumerate() {
                let handle = self.inner.executor.spawn(supervise(
                    Arc::downgrade(&entry),
                    id.clone(),
                    index,
                    unit,
                ));
                unit_handles.push(handle.abort_handle());
                handles.push(handle);
            }
        }

        debug!(job_id = %id, size, "Job submitted");

        // Spawned now so the callback still runs if the caller never polls us.
        let callback = if size == 0 {
            entry
                .take_callback()
                .map(|callback| self.inner.executor.spawn(run_callback(id.clone(), callback)))
        } else {
            None
        };

        async move {
            if let Some(callback) = callback {
                if let Err(e) = callback.await {
                    error!(job_id = %id, error = %e, "Completion callback task did not finish");
                }
            }
            JobTicket { id, units: handles }
        }
    }

    /// Current state of a job
    ///
    /// A successful lookup counts as use and postpones idle eviction.
    pub fn get(&self, job_id: impl AsRef<str>) -> Option<JobSnapshot> {
        self.entry(job_id.as_ref()).map(|entry| entry.touch())
    }

    /// Like [`get`](Self::get), but reports an unknown id as an error
    pub fn require(&self, job_id: impl AsRef<str>) -> JobResult<JobSnapshot> {
        let job_id = job_id.as_ref();
        self.get(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }

    /// Current state of a job without refreshing its idle timer
    pub fn peek(&self, job_id: impl AsRef<str>) -> Option<JobSnapshot> {
        self.entry(job_id.as_ref()).map(|entry| entry.snapshot())
    }

    /// Snapshots of every registered job, without refreshing them
    pub fn snapshots(&self) -> Vec<JobSnapshot> {
        self.inner
            .jobs
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect()
    }

    /// Remove a job and abort its unfinished units
    ///
    /// Returns `false` when no such job exists.
    pub fn evict(&self, job_id: impl AsRef<str>) -> bool {
        let Some((id, entry)) = self.inner.jobs.remove(job_id.as_ref()) else {
            return false;
        };

        let aborted = entry.abort_unfinished();
        debug!(job_id = %id, aborted, "Job evicted");
        true
    }

    /// Evict a job only if `predicate` holds for it
    ///
    /// The predicate runs under the job table's shard lock, so the check and
    /// the removal are one step: any refresh that happened before the removal
    /// is visible to the predicate.
    pub(crate) fn evict_if<P>(&self, job_id: &str, predicate: P) -> bool
    where
        P: FnOnce(&JobEntry) -> bool,
    {
        let Some((id, entry)) = self
            .inner
            .jobs
            .remove_if(job_id, |_, entry| predicate(entry))
        else {
            return false;
        };

        let aborted = entry.abort_unfinished();
        debug!(job_id = %id, aborted, "Job evicted");
        true
    }

    pub(crate) fn job_ids(&self) -> Vec<JobId> {
        self.inner
            .jobs
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub(crate) fn entry(&self, job_id: &str) -> Option<Arc<JobEntry>> {
        self.inner
            .jobs
            .get(job_id)
            .map(|entry| Arc::clone(entry.value()))
    }
}

/// Run one work unit and record its completion on the owning job
async fn supervise<F, T, E>(job: Weak<JobEntry>, job_id: JobId, index: usize, unit: F) -> UnitOutcome<T>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let outcome = match AssertUnwindSafe(unit).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            debug!(job_id = %job_id, unit = index, error = %e, "Work unit failed");
            Err(UnitError::Failed(e.to_string()))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(job_id = %job_id, unit = index, panic = %message, "Work unit panicked");
            Err(UnitError::Panicked(message))
        }
    };

    let Some(entry) = job.upgrade() else {
        debug!(job_id = %job_id, unit = index, "Job already evicted, discarding unit completion");
        return outcome;
    };

    if let Progress::Completed(callback) = entry.record_completion() {
        info!(job_id = %job_id, size = entry.size, "Job completed");
        if let Some(callback) = callback {
            // Detached from the unit handles so eviction cannot cut it short.
            tokio::spawn(run_callback(job_id, callback));
        }
    }

    outcome
}

async fn run_callback(job_id: JobId, callback: CompletionCallback) {
    let result = AssertUnwindSafe(async move { callback().await })
        .catch_unwind()
        .await;

    match result {
        Ok(Ok(())) => debug!(job_id = %job_id, "Completion callback finished"),
        Ok(Err(e)) => error!(job_id = %job_id, error = %e, "Completion callback failed"),
        Err(payload) => error!(
            job_id = %job_id,
            panic = %panic_message(payload.as_ref()),
            "Completion callback panicked"
        ),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
