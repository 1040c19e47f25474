//! # Jobs and their executions.
//!
//! - [`Job`] - a restartable workload, launched once per attempt
//! - [`Execution`] - handle to one running attempt (wait / kill)
//! - [`JobFn`] - async closure run in its own tokio task
//! - [`CommandJob`] - external program run as a child process
//! - [`JobSpec`] - job bundled with its supervision knobs

mod command;
mod job;
mod job_fn;
mod spec;

pub use command::CommandJob;
pub use job::{AttemptContext, Execution, Job, JobRef};
pub use job_fn::JobFn;
pub(crate) use job_fn::panic_message;
pub use spec::JobSpec;
