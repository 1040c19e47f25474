//! # Deadline guard for one execution.
//!
//! [`run_with_deadline`] waits for an [`Execution`] under a hard wall-clock
//! deadline. When the deadline fires first the execution is killed and
//! reaped before the guard returns, and the caller sees
//! [`Outcome::DeadlineExceeded`] instead of an error.
//!
//! ```text
//! run_with_deadline(exec, Some(d))
//!   ├─ exec.wait() first ──► Ok  → Completed
//!   │                    └─► Err → Failed(err)
//!   └─ d elapsed first   ──► exec.kill().await → DeadlineExceeded
//! ```
//!
//! `None` (or a zero duration) disables the deadline.

use std::time::Duration;

use tokio::time;

use crate::error::JobError;
use crate::jobs::Execution;

/// Result of a guarded wait.
#[derive(Debug)]
pub enum Outcome<T = (), E = JobError> {
    /// The work finished normally.
    Completed(T),
    /// The work finished with an error.
    Failed(E),
    /// The deadline fired; the work was terminated.
    DeadlineExceeded,
}

impl<T, E> Outcome<T, E> {
    /// `true` for [`Outcome::DeadlineExceeded`].
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Outcome::DeadlineExceeded)
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T, E> {
    fn from(res: Result<T, E>) -> Self {
        match res {
            Ok(v) => Outcome::Completed(v),
            Err(e) => Outcome::Failed(e),
        }
    }
}

/// Waits for `exec` until it ends or `deadline` elapses.
///
/// Cancel-safe as long as [`Execution::wait`] is: dropping the returned future
/// leaves the execution running.
pub async fn run_with_deadline(
    exec: &mut dyn Execution,
    deadline: Option<Duration>,
) -> Outcome<(), JobError> {
    let Some(limit) = deadline.filter(|d| !d.is_zero()) else {
        return exec.wait().await.into();
    };

    match time::timeout(limit, exec.wait()).await {
        Ok(res) => res.into(),
        Err(_elapsed) => {
            exec.kill().await;
            Outcome::DeadlineExceeded
        }
    }
}
