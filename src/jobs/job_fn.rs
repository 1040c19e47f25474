//! # Function-backed job (`JobFn`)
//!
//! [`JobFn`] wraps a closure `F: Fn(AttemptContext) -> Fut` and runs a fresh
//! future per attempt in its own tokio task. Termination aborts that task.
//!
//! Abort takes effect at the next `.await` inside the job. Work that blocks a
//! thread without yielding cannot be interrupted this way; run such work as a
//! [`CommandJob`](crate::CommandJob) instead.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tpuvisor::{AttemptContext, JobError, JobFn, JobRef};
//!
//! let train: JobRef = JobFn::arc("train", |ctx: AttemptContext| async move {
//!     tokio::time::sleep(Duration::from_millis(10)).await;
//!     if ctx.attempt > 3 {
//!         return Err(JobError::Fatal { error: "giving up".into() });
//!     }
//!     Ok(())
//! });
//! assert_eq!(train.name(), "train");
//! ```

use std::any::Any;
use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::error::JobError;
use crate::jobs::job::{AttemptContext, Execution, Job};

/// Function-backed job.
#[derive(Debug)]
pub struct JobFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> JobFn<F> {
    /// Creates a new function-backed job.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the job and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<F, Fut> Job for JobFn<F>
where
    F: Fn(AttemptContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn launch(&self, ctx: AttemptContext) -> Result<Box<dyn Execution>, JobError> {
        let join = tokio::spawn((self.f)(ctx));
        Ok(Box::new(TaskExecution { join, done: false }))
    }
}

/// A job attempt running as a tokio task.
struct TaskExecution {
    join: JoinHandle<Result<(), JobError>>,
    done: bool,
}

#[async_trait]
impl Execution for TaskExecution {
    async fn wait(&mut self) -> Result<(), JobError> {
        if self.done {
            return Err(JobError::Canceled);
        }
        let res = (&mut self.join).await;
        self.done = true;
        match res {
            Ok(r) => r,
            Err(e) if e.is_panic() => Err(JobError::Panicked {
                error: panic_message(e.into_panic()),
            }),
            Err(_) => Err(JobError::Canceled),
        }
    }

    async fn kill(&mut self) {
        if self.done {
            return;
        }
        self.join.abort();
        // Resolves once the task has been dropped.
        let _ = (&mut self.join).await;
        self.done = true;
    }

    fn is_finished(&self) -> bool {
        self.done
    }
}

impl Drop for TaskExecution {
    fn drop(&mut self) {
        if !self.done {
            self.join.abort();
        }
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ResourceSpec, TopologySize};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn ctx() -> AttemptContext {
        AttemptContext {
            attempt: 1,
            resource: Arc::new(ResourceSpec::for_tests("chonk", TopologySize::V8)),
        }
    }

    #[tokio::test]
    async fn test_result_is_forwarded() {
        let job = JobFn::new("fails", |_ctx: AttemptContext| async {
            Err::<(), _>(JobError::Fail {
                error: "boom".into(),
            })
        });
        let mut exec = job.launch(ctx()).unwrap();
        assert!(matches!(exec.wait().await, Err(JobError::Fail { .. })));
        assert!(exec.is_finished());
    }

    #[tokio::test]
    async fn test_panic_becomes_error() {
        let job = JobFn::new("panics", |ctx: AttemptContext| async move {
            if ctx.attempt > 0 {
                panic!("kaboom");
            }
            Ok::<(), JobError>(())
        });
        let mut exec = job.launch(ctx()).unwrap();
        match exec.wait().await {
            Err(JobError::Panicked { error }) => assert_eq!(error, "kaboom"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_kill_drops_the_future() {
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = dropped.clone();
        let job = JobFn::new("forever", move |_ctx: AttemptContext| {
            let guard = SetOnDrop(flag.clone());
            async move {
                let _guard = guard;
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<(), JobError>(())
            }
        });

        let mut exec = job.launch(ctx()).unwrap();
        tokio::task::yield_now().await;
        exec.kill().await;

        assert!(exec.is_finished());
        assert!(dropped.load(Ordering::SeqCst));
        // Killing twice is fine.
        exec.kill().await;
    }
}
