//! # Supervision session: the state machine around one job.
//!
//! A [`Session`] keeps one job running on one resource until the job
//! completes or something fatal happens. It owns the attempt counter and the
//! state history, and decides after every attempt what comes next.
//!
//! ## Decisions
//! ```text
//! Running ── attempt ends ──┬─ Completed ───────────────► Done
//!                           ├─ Failed(err), retryable ──► HandlingError
//!                           │      sleep(wait_interval) (cancellable)
//!                           │      is_preempted? ── yes ─► recreate
//!                           │                    └─ no ──► (keep resource)
//!                           │      → Running
//!                           ├─ Failed(err), otherwise ──► Fatal (err unchanged)
//!                           ├─ DeadlineExceeded ────────► HandlingTimeout
//!                           │      recreate (always)     → Running
//!                           ├─ Preempted ───────────────► HandlingPreemption
//!                           │      recreate              → Running
//!                           ├─ ProbeFailed(err) ────────► Fatal
//!                           └─ Cancelled ───────────────► Fatal (Interrupted)
//! ```
//!
//! Every transition is recorded and published as `StateChanged`.

use std::sync::Arc;

use crate::core::runner::{AttemptEnd, AttemptRunner};
use crate::core::state::{SessionReport, SessionState};
use crate::error::{JobError, SupervisorError};
use crate::events::{Event, EventKind};
use crate::jobs::{AttemptContext, JobSpec};
use crate::policies::RecreatePolicy;
use crate::resource::ResourceSpec;

pub(crate) struct Session {
    job: JobSpec,
    runner: AttemptRunner,
    policy: RecreatePolicy,
    resource: Option<Arc<ResourceSpec>>,
    history: Vec<SessionState>,
    attempts: u32,
    recreations: u32,
}

impl Session {
    /// Creates a session in `Idle`.
    pub(crate) fn new(job: JobSpec, runner: AttemptRunner, policy: RecreatePolicy) -> Self {
        let mut session = Self {
            job,
            runner,
            policy,
            resource: None,
            history: Vec::new(),
            attempts: 0,
            recreations: 0,
        };
        session.enter(SessionState::Idle);
        session
    }

    pub(crate) fn enter(&mut self, state: SessionState) {
        self.history.push(state);
        self.runner.bus.publish(
            Event::new(EventKind::StateChanged)
                .with_job(self.job.name())
                .with_state(state),
        );
    }

    /// Records a recreation done outside the attempt loop.
    pub(crate) fn count_recreation(&mut self) {
        self.recreations += 1;
    }

    /// Moves to `Fatal` and hands the error back.
    pub(crate) fn fail(&mut self, err: SupervisorError) -> SupervisorError {
        self.enter(SessionState::Fatal);
        let mut ev = Event::new(EventKind::SessionFatal)
            .with_job(self.job.name())
            .with_reason(err.to_string());
        if let Some(res) = &self.resource {
            ev = ev.with_resource(res.name.as_str());
        }
        self.runner.bus.publish(ev);
        err
    }

    /// Runs attempts on `resource` until the session is over.
    pub(crate) async fn drive(
        mut self,
        resource: ResourceSpec,
    ) -> Result<SessionReport, SupervisorError> {
        let resource = Arc::new(resource);
        self.resource = Some(Arc::clone(&resource));

        loop {
            self.enter(SessionState::Running);
            self.attempts += 1;

            let ctx = AttemptContext {
                attempt: self.attempts,
                resource: Arc::clone(&resource),
            };
            let end = self
                .runner
                .run_attempt(
                    self.job.job().as_ref(),
                    ctx,
                    self.job.restart_after(),
                    self.job.wait_interval(),
                )
                .await;

            match end {
                AttemptEnd::Completed => return Ok(self.finish(&resource)),
                AttemptEnd::Failed(err) if self.job.retry_on().matches(&err) => {
                    self.enter(SessionState::HandlingError);
                    self.handle_error(&resource, err).await?;
                }
                AttemptEnd::Failed(err) => return Err(self.fail(SupervisorError::Job(err))),
                AttemptEnd::DeadlineExceeded => {
                    self.enter(SessionState::HandlingTimeout);
                    self.recreate(&resource).await?;
                }
                AttemptEnd::Preempted => {
                    self.enter(SessionState::HandlingPreemption);
                    self.recreate(&resource).await?;
                }
                AttemptEnd::ProbeFailed(e) => return Err(self.fail(e.into())),
                AttemptEnd::Cancelled => return Err(self.fail(SupervisorError::Interrupted)),
            }
        }
    }

    async fn handle_error(
        &mut self,
        resource: &ResourceSpec,
        err: JobError,
    ) -> Result<(), SupervisorError> {
        let wait = self.job.wait_interval();
        self.runner.bus.publish(
            Event::new(EventKind::ErrorBackoff)
                .with_job(self.job.name())
                .with_attempt(self.attempts)
                .with_delay(wait)
                .with_reason(err.to_string()),
        );
        if let Err(e) = self.runner.pause(wait).await {
            return Err(self.fail(e));
        }

        match self.runner.controller.is_preempted(resource).await {
            Ok(true) => self.recreate(resource).await,
            Ok(false) => {
                tracing::debug!(
                    job = %self.job.name(),
                    resource = %resource.name,
                    "resource healthy after job error, retrying in place"
                );
                Ok(())
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    async fn recreate(&mut self, resource: &ResourceSpec) -> Result<(), SupervisorError> {
        match self.runner.controller.recreate(resource, &self.policy).await {
            Ok(_rounds) => {
                self.recreations += 1;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn finish(mut self, resource: &Arc<ResourceSpec>) -> SessionReport {
        self.enter(SessionState::Done);
        self.runner.bus.publish(
            Event::new(EventKind::SessionDone)
                .with_job(self.job.name())
                .with_resource(resource.name.as_str())
                .with_attempt(self.attempts),
        );
        SessionReport {
            resource: ResourceSpec::clone(resource),
            attempts: self.attempts,
            recreations: self.recreations,
            history: self.history,
        }
    }
}
