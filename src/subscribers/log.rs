//! # LogWriter: events rendered through `tracing`
//!
//! A subscriber that turns every [`Event`] into one structured `tracing`
//! record. Install any `tracing` subscriber (e.g. `tracing-subscriber`'s
//! `fmt`) to see them.
//!
//! ## Levels
//! - `warn`: preemption, deadline, job failures, fatal session end, subscriber trouble
//! - `info`: resource lifecycle, attempts, session outcome, shutdown
//! - `debug`: name probes, preemption polls, state transitions

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Constructs a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let job = e.job.as_deref().unwrap_or("-");
        let resource = e.resource.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::NameProbed => debug!(resource, reason, "name probed"),
            EventKind::NameAllocated => info!(resource, "name allocated"),
            EventKind::ResourceCreateRequested => info!(resource, reason, "creating resource"),
            EventKind::ResourceReady => info!(resource, "resource ready"),
            EventKind::RecreateStarting => {
                info!(resource, round = ?e.attempt, "recreating resource")
            }
            EventKind::RecreateRetryScheduled => warn!(
                resource,
                round = ?e.attempt,
                delay_ms = ?e.delay_ms,
                reason,
                "recreate failed, retry scheduled"
            ),
            EventKind::ResourceRecreated => {
                info!(resource, rounds = ?e.attempt, "resource recreated")
            }
            EventKind::AttemptStarting => {
                info!(job, resource, attempt = ?e.attempt, "attempt starting")
            }
            EventKind::AttemptCompleted => {
                info!(job, resource, attempt = ?e.attempt, "attempt completed")
            }
            EventKind::AttemptFailed => {
                warn!(job, resource, attempt = ?e.attempt, reason, "attempt failed")
            }
            EventKind::DeadlineExceeded => warn!(
                job,
                resource,
                attempt = ?e.attempt,
                timeout_ms = ?e.timeout_ms,
                "restart deadline exceeded"
            ),
            EventKind::PreemptionPolled => {
                debug!(resource, poll = ?e.poll, reason, "preemption polled")
            }
            EventKind::PreemptionDetected => {
                warn!(job, resource, poll = ?e.poll, "resource preempted")
            }
            EventKind::ExecutionKilled => {
                info!(job, resource, attempt = ?e.attempt, reason, "execution killed")
            }
            EventKind::ErrorBackoff => warn!(
                job,
                attempt = ?e.attempt,
                delay_ms = ?e.delay_ms,
                reason,
                "job error, waiting before the next attempt"
            ),
            EventKind::StateChanged => {
                debug!(job, state = ?e.state, "session state changed")
            }
            EventKind::SessionDone => {
                info!(job, resource, attempts = ?e.attempt, "session done")
            }
            EventKind::SessionFatal => warn!(job, resource, reason, "session fatal"),
            EventKind::ShutdownRequested => info!(reason, "shutdown requested"),
            EventKind::SubscriberPanicked => {
                warn!(subscriber = job, info = reason, "subscriber panicked")
            }
            EventKind::SubscriberOverflow => {
                warn!(subscriber = job, reason, "subscriber queue overflow")
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
