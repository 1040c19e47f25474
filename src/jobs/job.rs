//! # Job abstraction.
//!
//! A [`Job`] is the user's workload. Each attempt calls [`Job::launch`], which
//! starts the work in an isolated execution context and hands back an
//! [`Execution`] handle. The supervisor only ever talks to that handle: it
//! waits for completion, or kills it.
//!
//! Jobs are never asked to cooperate with cancellation. [`Execution::kill`]
//! must terminate the work unconditionally and return only once nothing of
//! the attempt is left running.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::JobError;
use crate::resource::ResourceSpec;

/// Shared handle to a job.
pub type JobRef = Arc<dyn Job>;

/// What a job learns about the attempt it is launched for.
#[derive(Clone, Debug)]
pub struct AttemptContext {
    /// Attempt number within the session (1-based).
    pub attempt: u32,
    /// The resource backing this attempt.
    pub resource: Arc<ResourceSpec>,
}

/// # Restartable workload.
///
/// # Example
/// ```
/// use tpuvisor::{AttemptContext, Job, JobError, JobFn};
///
/// // Most callers use `JobFn` or `CommandJob` rather than implementing `Job` by hand.
/// let job = JobFn::arc("hello", |ctx: AttemptContext| async move {
///     println!("attempt {} on {}", ctx.attempt, ctx.resource.name);
///     Ok::<_, JobError>(())
/// });
/// assert_eq!(job.name(), "hello");
/// ```
pub trait Job: Send + Sync + 'static {
    /// Returns a stable, human-readable job name.
    fn name(&self) -> &str;

    /// Starts one attempt. Must not block; the work runs in the returned execution.
    fn launch(&self, ctx: AttemptContext) -> Result<Box<dyn Execution>, JobError>;
}

/// # One running attempt.
#[async_trait]
pub trait Execution: Send {
    /// Waits for the attempt to end.
    ///
    /// Must be cancel-safe: dropping the future leaves the execution running
    /// and a later `wait` or `kill` still works.
    async fn wait(&mut self) -> Result<(), JobError>;

    /// Terminates the attempt unconditionally and reaps it.
    ///
    /// A no-op if the attempt already ended.
    async fn kill(&mut self);

    /// Returns `true` once the attempt ended and was reaped.
    fn is_finished(&self) -> bool;
}
