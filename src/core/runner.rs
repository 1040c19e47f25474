//! # Run a single attempt of a job.
//!
//! Launches one [`Execution`], guards it with the restart deadline, and races
//! it against the preemption watcher and the supervisor token.
//!
//! ## Event flow
//! ```text
//! AttemptStarting
//!   └─► job.launch() ── Err ──────────────────────────────► AttemptFailed
//!           │
//!           ▼  select! (biased)
//!     ┌─ token cancelled ──► kill ─► ExecutionKilled         → Cancelled
//!     ├─ run_with_deadline
//!     │     ├─ Completed ──────────► AttemptCompleted        → Completed
//!     │     ├─ Failed(err) ────────► AttemptFailed           → Failed(err)
//!     │     └─ DeadlineExceeded ───► DeadlineExceeded
//!     │                              ExecutionKilled         → DeadlineExceeded
//!     └─ watch_preemption
//!           ├─ preempted ──► PreemptionDetected
//!           │                kill ─► ExecutionKilled         → Preempted
//!           └─ probe error ► kill ─► ExecutionKilled         → ProbeFailed(err)
//! ```
//!
//! ## Rules
//! - The execution is reaped before `run_attempt` returns, whatever the end
//! - The liveness gauge counts the execution from launch until it is reaped
//! - Polls start one `wait_interval` after launch

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::core::alive::LivenessGauge;
use crate::core::guard::{Outcome, run_with_deadline};
use crate::error::{ControllerError, JobError, SupervisorError};
use crate::events::{Bus, Event, EventKind};
use crate::jobs::{AttemptContext, Job};
use crate::resource::{ResourceController, ResourceSpec};

/// How one attempt ended.
#[derive(Debug)]
pub(crate) enum AttemptEnd {
    Completed,
    Failed(JobError),
    DeadlineExceeded,
    Preempted,
    ProbeFailed(ControllerError),
    Cancelled,
}

impl AttemptEnd {
    fn kill_reason(&self) -> Option<&'static str> {
        match self {
            AttemptEnd::DeadlineExceeded => Some("restart deadline"),
            AttemptEnd::Preempted => Some("resource preempted"),
            AttemptEnd::ProbeFailed(_) => Some("preemption probe failed"),
            AttemptEnd::Cancelled => Some("shutdown"),
            AttemptEnd::Completed | AttemptEnd::Failed(_) => None,
        }
    }
}

/// Shared machinery for running attempts.
#[derive(Clone)]
pub(crate) struct AttemptRunner {
    pub(crate) bus: Bus,
    pub(crate) controller: ResourceController,
    pub(crate) token: CancellationToken,
    pub(crate) gauge: Arc<LivenessGauge>,
    pub(crate) debug: bool,
}

impl AttemptRunner {
    /// Runs one attempt of `job` to its end.
    pub(crate) async fn run_attempt(
        &self,
        job: &dyn Job,
        ctx: AttemptContext,
        deadline: Option<Duration>,
        poll_every: Duration,
    ) -> AttemptEnd {
        let attempt = ctx.attempt;
        let resource = Arc::clone(&ctx.resource);

        self.bus.publish(
            Event::new(EventKind::AttemptStarting)
                .with_job(job.name())
                .with_resource(resource.name.as_str())
                .with_attempt(attempt),
        );

        let mut exec = match job.launch(ctx) {
            Ok(exec) => exec,
            Err(e) => {
                self.publish_failed(job.name(), &resource, attempt, &e);
                return AttemptEnd::Failed(e);
            }
        };
        let _alive = self.gauge.enter();

        let end = tokio::select! {
            biased;
            _ = self.token.cancelled() => AttemptEnd::Cancelled,
            out = run_with_deadline(exec.as_mut(), deadline) => match out {
                Outcome::Completed(()) => AttemptEnd::Completed,
                Outcome::Failed(e) => AttemptEnd::Failed(e),
                Outcome::DeadlineExceeded => AttemptEnd::DeadlineExceeded,
            },
            probe = self.watch_preemption(&resource, attempt, poll_every) => match probe {
                Ok(()) => AttemptEnd::Preempted,
                Err(e) => AttemptEnd::ProbeFailed(e),
            },
        };

        if !exec.is_finished() {
            exec.kill().await;
        }

        match &end {
            AttemptEnd::Completed => self.bus.publish(
                Event::new(EventKind::AttemptCompleted)
                    .with_job(job.name())
                    .with_resource(resource.name.as_str())
                    .with_attempt(attempt),
            ),
            AttemptEnd::Failed(e) => self.publish_failed(job.name(), &resource, attempt, e),
            AttemptEnd::DeadlineExceeded => {
                let limit = deadline.unwrap_or_default();
                self.bus.publish(
                    Event::new(EventKind::DeadlineExceeded)
                        .with_job(job.name())
                        .with_resource(resource.name.as_str())
                        .with_attempt(attempt)
                        .with_timeout(limit),
                );
            }
            AttemptEnd::ProbeFailed(e) => {
                tracing::warn!(resource = %resource.name, error = %e, "preemption probe failed");
            }
            AttemptEnd::Preempted | AttemptEnd::Cancelled => {}
        }

        if let Some(reason) = end.kill_reason() {
            self.bus.publish(
                Event::new(EventKind::ExecutionKilled)
                    .with_job(job.name())
                    .with_resource(resource.name.as_str())
                    .with_attempt(attempt)
                    .with_reason(reason),
            );
        }
        end
    }

    /// Polls the resource every `every` until it is reported preempted.
    async fn watch_preemption(
        &self,
        spec: &ResourceSpec,
        attempt: u32,
        every: Duration,
    ) -> Result<(), ControllerError> {
        let every = every.max(Duration::from_millis(1));
        let mut ticker = time::interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut poll: u32 = 0;
        loop {
            ticker.tick().await;
            poll += 1;

            let preempted = self.controller.is_preempted(spec).await?;
            if self.debug {
                self.bus.publish(
                    Event::new(EventKind::PreemptionPolled)
                        .with_resource(spec.name.as_str())
                        .with_poll(poll),
                );
            }
            if preempted {
                self.bus.publish(
                    Event::new(EventKind::PreemptionDetected)
                        .with_resource(spec.name.as_str())
                        .with_attempt(attempt)
                        .with_poll(poll),
                );
                return Ok(());
            }
        }
    }

    /// Sleeps for `d` unless the supervisor token is cancelled first.
    pub(crate) async fn pause(&self, d: Duration) -> Result<(), SupervisorError> {
        tokio::select! {
            _ = time::sleep(d) => Ok(()),
            _ = self.token.cancelled() => Err(SupervisorError::Interrupted),
        }
    }

    fn publish_failed(&self, job: &str, resource: &ResourceSpec, attempt: u32, err: &JobError) {
        self.bus.publish(
            Event::new(EventKind::AttemptFailed)
                .with_job(job)
                .with_resource(resource.name.as_str())
                .with_attempt(attempt)
                .with_reason(err.to_string()),
        );
    }
}
