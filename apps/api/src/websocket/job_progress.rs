//! Push-style job progress over a WebSocket
//!
//! The server polls the registry every `poll_interval` and sends a
//! [`JobMessage::Progress`] whenever progress or status changed since the
//! last message. Each poll counts as use of the job. The socket is closed
//! after the completed snapshot has been sent, or after an error message if
//! the job is unknown or gets evicted while watched.

use std::borrow::Cow;
use std::time::Duration;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use btecify_jobs::JobRegistry;
use futures_util::{SinkExt, StreamExt};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::messages::{ErrorPayload, JobMessage};
use crate::routes::jobs::JobsState;

/// What to do after one poll of the registry
#[derive(Debug, Clone, PartialEq)]
pub enum PollStep {
    /// Nothing changed since the last message
    Unchanged,
    /// Send the message and keep watching
    Send(JobMessage),
    /// Send the message and close the socket
    Finish(JobMessage),
}

/// Poll the registry once, without refreshing the job's idle timer
///
/// `last_sent` holds the `(progress, status)` of the last progress message.
pub fn poll_step(
    registry: &JobRegistry,
    job_id: &str,
    last_sent: &mut Option<(usize, bool)>,
) -> PollStep {
    let Some(snapshot) = registry.peek(job_id) else {
        return PollStep::Finish(JobMessage::Error(ErrorPayload::job_not_found(job_id)));
    };

    let current = (snapshot.progress, snapshot.status);
    if *last_sent == Some(current) {
        return PollStep::Unchanged;
    }
    *last_sent = Some(current);

    if snapshot.status {
        PollStep::Finish(JobMessage::Progress(snapshot))
    } else {
        PollStep::Send(JobMessage::Progress(snapshot))
    }
}

/// `GET /api/jobs/:job_id/ws`
pub async fn job_progress_ws(
    ws: WebSocketUpgrade,
    State(state): State<JobsState>,
    Path(job_id): Path<String>,
) -> Response {
    ws.on_upgrade(move |socket| {
        stream_progress(socket, state.registry, job_id, state.poll_interval)
    })
}

/// Drive one progress socket until the job finishes or the client leaves
pub async fn stream_progress(
    socket: WebSocket,
    registry: JobRegistry,
    job_id: String,
    poll_interval: Duration,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_sent = None;
    let (mut sender, mut receiver) = socket.split();

    debug!(job_id = %job_id, "Progress socket opened");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let (message, finished) = match poll_step(&registry, &job_id, &mut last_sent) {
                    PollStep::Unchanged => continue,
                    PollStep::Send(message) => (message, false),
                    PollStep::Finish(message) => (message, true),
                };

                let json = match serde_json::to_string(&message) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(job_id = %job_id, error = %e, "Failed to serialize progress");
                        break;
                    }
                };

                if sender.send(Message::Text(json)).await.is_err() {
                    debug!(job_id = %job_id, "Progress socket send failed");
                    break;
                }

                if finished {
                    let reason = match message {
                        JobMessage::Progress(_) => "job complete",
                        JobMessage::Error(_) => "job not found",
                    };
                    let _ = sender
                        .send(Message::Close(Some(CloseFrame {
                            code: close_code::NORMAL,
                            reason: Cow::Borrowed(reason),
                        })))
                        .await;
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                    // Client messages carry nothing; pings are answered by the socket
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    debug!(job_id = %job_id, "Progress socket closed");
}
