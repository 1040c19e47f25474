//! Error types used by the supervisor, the resource controller and jobs.
//!
//! Three enums split the failure space by who owns the failure:
//!
//! - [`SupervisorError`]: what a supervision session surfaces to its caller.
//! - [`ControllerError`]: failures talking to the resource provider.
//! - [`JobError`]: failures of one job attempt.
//!
//! Each type provides `as_label` for logs/metrics, like the event kinds do.

use std::time::Duration;
use thiserror::Error;

/// # Errors surfaced by a supervision session.
///
/// Every variant is terminal for the session. Recoverable situations
/// (preemption, deadline, retryable job errors) never show up here.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// No name was given and the name pool is empty.
    #[error("no resource name given and the name pool is empty")]
    EmptyPool,

    /// Every name in the pool is already in use.
    #[error("every candidate name is already taken: {tried:?}")]
    ExhaustedPool {
        /// Names confirmed taken during this allocation.
        tried: Vec<String>,
    },

    /// Talking to the resource provider failed.
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// The recreate retry budget ran out.
    #[error("resource {name:?} not recreated after {attempts} attempts: {last}")]
    RecreateFailed {
        /// Resource name.
        name: String,
        /// Number of rounds tried.
        attempts: u32,
        /// Error of the last round.
        #[source]
        last: ControllerError,
    },

    /// The job failed with an error outside the retryable set.
    #[error(transparent)]
    Job(JobError),

    /// The configuration cannot produce a usable resource spec.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The supervisor token was cancelled while a session was running.
    #[error("supervision interrupted")]
    Interrupted,
}

impl SupervisorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use tpuvisor::SupervisorError;
    ///
    /// assert_eq!(SupervisorError::EmptyPool.as_label(), "names_empty_pool");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SupervisorError::EmptyPool => "names_empty_pool",
            SupervisorError::ExhaustedPool { .. } => "names_exhausted_pool",
            SupervisorError::Controller(e) => e.as_label(),
            SupervisorError::RecreateFailed { .. } => "resource_recreate_failed",
            SupervisorError::Job(e) => e.as_label(),
            SupervisorError::Config(_) => "config_invalid",
            SupervisorError::Interrupted => "session_interrupted",
        }
    }
}

/// # Errors from the resource provider.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ControllerError {
    /// The provider command could not be started at all.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        /// Rendered command line.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The provider command exited unsuccessfully.
    #[error("`{command}` exited with {code:?}: {stderr}")]
    Command {
        /// Rendered command line.
        command: String,
        /// Exit code (`None` if killed by a signal).
        code: Option<i32>,
        /// Captured standard error (trimmed).
        stderr: String,
    },

    /// The provider answered with something we could not understand.
    #[error("cannot parse output of `{command}`: {reason}")]
    Parse {
        /// Rendered command line.
        command: String,
        /// What went wrong.
        reason: String,
    },

    /// The resource did not report ready in time.
    #[error("resource {name:?} not ready after {waited:?}")]
    NotReady {
        /// Resource name.
        name: String,
        /// How long we waited.
        waited: Duration,
    },

    /// Free-form provider failure (used by non-CLI fleets).
    #[error("provider error: {0}")]
    Provider(String),
}

impl ControllerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ControllerError::Spawn { .. } => "controller_spawn",
            ControllerError::Command { .. } => "controller_command",
            ControllerError::Parse { .. } => "controller_parse",
            ControllerError::NotReady { .. } => "controller_not_ready",
            ControllerError::Provider(_) => "controller_provider",
        }
    }
}

/// # Errors produced by a single job attempt.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum JobError {
    /// Job failed; may succeed if retried.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable error; never retried whatever the retry policy says.
    #[error("fatal error (no retry): {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// Subprocess exited with a non-zero status.
    #[error("process exited with {code:?}")]
    Exit {
        /// Exit code (`None` if killed by a signal).
        code: Option<i32>,
    },

    /// The job could not be launched.
    #[error("failed to launch: {error}")]
    Spawn {
        /// The underlying error message.
        error: String,
    },

    /// In-process job panicked.
    #[error("job panicked: {error}")]
    Panicked {
        /// Panic payload, if it was a string.
        error: String,
    },

    /// Execution context went away without a result.
    #[error("execution cancelled")]
    Canceled,
}

impl JobError {
    /// Returns a short stable label (snake_case) for use in logs/metrics and
    /// for [`RetryOn::Labels`](crate::RetryOn::Labels).
    ///
    /// # Example
    /// ```
    /// use tpuvisor::JobError;
    ///
    /// let err = JobError::Exit { code: Some(1) };
    /// assert_eq!(err.as_label(), "job_exit");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            JobError::Fail { .. } => "job_failed",
            JobError::Fatal { .. } => "job_fatal",
            JobError::Exit { .. } => "job_exit",
            JobError::Spawn { .. } => "job_spawn",
            JobError::Panicked { .. } => "job_panicked",
            JobError::Canceled => "job_canceled",
        }
    }

    /// Errors that are never retried.
    ///
    /// # Example
    /// ```
    /// use tpuvisor::JobError;
    ///
    /// assert!(JobError::Fatal { error: "bad input".into() }.is_fatal());
    /// assert!(!JobError::Fail { error: "flaky".into() }.is_fatal());
    /// ```
    pub fn is_fatal(&self) -> bool {
        matches!(self, JobError::Fatal { .. })
    }
}
