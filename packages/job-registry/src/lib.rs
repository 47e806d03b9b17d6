//! In-process background job registry for Btecify
//!
//! A job is a batch of independent asynchronous work units (for example one
//! download per song) submitted together and tracked as a unit:
//! - Units run concurrently as tokio tasks and may finish in any order
//! - Progress counts finished units, successful or not
//! - An optional completion callback fires exactly once, after the last unit
//! - Status can be polled by id; every poll keeps the job alive
//! - A periodic sweep evicts finished jobs after a grace period and
//!   force-evicts jobs that nobody has touched for too long
//!
//! # Example
//!
//! ```rust,no_run
//! use btecify_jobs::{completion, JobRegistry, SweepPolicy};
//!
//! # async fn example() {
//! let registry = JobRegistry::new(SweepPolicy::default());
//!
//! let units = (0..3).map(|n| async move { Ok::<_, std::io::Error>(n * 2) });
//! let job_id = registry
//!     .submit(units, Some(completion(|| async { Ok(()) })))
//!     .await;
//!
//! if let Some(snapshot) = registry.get(&job_id) {
//!     println!("{}/{}", snapshot.progress, snapshot.size);
//! }
//! # }
//! ```

mod error;
mod models;
mod policy;
mod registry;
mod sweeper;

pub use error::{JobError, JobResult, UnitError, UnitOutcome};
pub use models::{JobId, JobSnapshot, SweepReport};
pub use policy::SweepPolicy;
pub use registry::{completion, CompletionCallback, JobRegistry, JobTicket};
pub use sweeper::spawn_sweeper;
