//! # Job specification for supervised execution.
//!
//! [`JobSpec`] bundles a job with the per-session knobs the supervisor reads:
//! which errors are retryable, the preemption poll interval, and the restart
//! deadline.
//!
//! A spec can be created:
//! - **Explicitly** with [`JobSpec::new`]
//! - **From config** with [`JobSpec::with_defaults`]

use std::time::Duration;

use crate::{config::Config, jobs::job::JobRef, policies::RetryOn};

/// Specification for running a job under supervision.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use tpuvisor::{CommandJob, Config, JobSpec, RetryOn};
///
/// let cfg = Config::default();
/// let spec = JobSpec::with_defaults(CommandJob::shell("train", "python3 train.py").arc(), &cfg)
///     .with_retry_on(RetryOn::Labels(vec!["job_exit"]))
///     .with_restart_after(Some(Duration::from_secs(12 * 3600)));
///
/// assert_eq!(spec.wait_interval(), Duration::from_secs(60));
/// assert_eq!(spec.restart_after(), Some(Duration::from_secs(12 * 3600)));
/// ```
#[derive(Clone)]
pub struct JobSpec {
    job: JobRef,
    retry_on: RetryOn,
    wait_interval: Duration,
    restart_after: Option<Duration>,
}

impl JobSpec {
    /// Creates a job specification with explicit parameters.
    ///
    /// - `wait_interval` is clamped to at least 1ms
    /// - `restart_after = None` disables the restart deadline
    pub fn new(
        job: JobRef,
        retry_on: RetryOn,
        wait_interval: Duration,
        restart_after: Option<Duration>,
    ) -> Self {
        Self {
            job,
            retry_on,
            wait_interval: wait_interval.max(Duration::from_millis(1)),
            restart_after: restart_after.filter(|d| *d > Duration::ZERO),
        }
    }

    /// Creates a job specification inheriting defaults from the config.
    pub fn with_defaults(job: JobRef, cfg: &Config) -> Self {
        Self {
            job,
            retry_on: cfg.retry_on.clone(),
            wait_interval: cfg.poll_interval(),
            restart_after: cfg.restart_deadline(),
        }
    }

    /// Returns the job.
    pub fn job(&self) -> &JobRef {
        &self.job
    }

    /// Convenience: returns the job name.
    pub fn name(&self) -> &str {
        self.job.name()
    }

    /// Returns the retryable error set.
    pub fn retry_on(&self) -> &RetryOn {
        &self.retry_on
    }

    /// Returns the preemption poll interval.
    pub fn wait_interval(&self) -> Duration {
        self.wait_interval
    }

    /// Returns the restart deadline, if any.
    pub fn restart_after(&self) -> Option<Duration> {
        self.restart_after
    }

    /// Returns a new spec with an updated retryable set.
    pub fn with_retry_on(mut self, retry_on: RetryOn) -> Self {
        self.retry_on = retry_on;
        self
    }

    /// Returns a new spec with an updated poll interval.
    pub fn with_wait_interval(mut self, wait_interval: Duration) -> Self {
        self.wait_interval = wait_interval.max(Duration::from_millis(1));
        self
    }

    /// Returns a new spec with an updated restart deadline.
    pub fn with_restart_after(mut self, restart_after: Option<Duration>) -> Self {
        self.restart_after = restart_after.filter(|d| *d > Duration::ZERO);
        self
    }
}
