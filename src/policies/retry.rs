//! # Which job errors are worth another attempt.
//!
//! [`RetryOn`] is the caller-declared retryable set. An attempt that ends with
//! an error matching it is retried (after a `wait_interval` pause and a
//! preemption check); any other error ends the session.
//!
//! ```text
//! RetryOn::Never          → every job error is fatal
//! RetryOn::Any            → every job error is retried (default)
//! RetryOn::Labels([..])   → retried when JobError::as_label() is listed
//! RetryOn::Matching(f)    → retried when f(&err) is true
//! ```
//!
//! [`JobError::Fatal`] is never retried, whatever the policy.

use std::fmt;
use std::sync::Arc;

use crate::error::JobError;

/// Predicate deciding whether an error is retryable.
pub type RetryPredicate = Arc<dyn Fn(&JobError) -> bool + Send + Sync>;

/// Caller-declared set of retryable job errors.
#[derive(Clone, Default)]
pub enum RetryOn {
    /// Nothing is retried.
    Never,
    /// Everything except [`JobError::Fatal`] is retried.
    #[default]
    Any,
    /// Errors whose [`JobError::as_label`] is in the list.
    Labels(Vec<&'static str>),
    /// Errors accepted by a custom predicate.
    Matching(RetryPredicate),
}

impl RetryOn {
    /// Wraps a predicate.
    pub fn matching<F>(f: F) -> Self
    where
        F: Fn(&JobError) -> bool + Send + Sync + 'static,
    {
        RetryOn::Matching(Arc::new(f))
    }

    /// Returns `true` when `err` should be retried.
    ///
    /// # Example
    /// ```
    /// use tpuvisor::{JobError, RetryOn};
    ///
    /// let only_exits = RetryOn::Labels(vec!["job_exit"]);
    /// assert!(only_exits.matches(&JobError::Exit { code: Some(137) }));
    /// assert!(!only_exits.matches(&JobError::Fail { error: "x".into() }));
    /// ```
    pub fn matches(&self, err: &JobError) -> bool {
        if err.is_fatal() {
            return false;
        }
        match self {
            RetryOn::Never => false,
            RetryOn::Any => true,
            RetryOn::Labels(labels) => labels.contains(&err.as_label()),
            RetryOn::Matching(f) => f(err),
        }
    }
}

impl fmt::Debug for RetryOn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryOn::Never => f.write_str("Never"),
            RetryOn::Any => f.write_str("Any"),
            RetryOn::Labels(l) => f.debug_tuple("Labels").field(l).finish(),
            RetryOn::Matching(_) => f.write_str("Matching(..)"),
        }
    }
}
