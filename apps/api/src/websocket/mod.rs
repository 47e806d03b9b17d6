//! WebSocket handlers
//!
//! - Live job progress (`/api/jobs/:job_id/ws`)

pub mod job_progress;
pub mod messages;

pub use job_progress::{job_progress_ws, poll_step, stream_progress, PollStep};
pub use messages::{ErrorPayload, JobMessage};
