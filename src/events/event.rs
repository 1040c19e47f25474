//! # Events emitted while supervising a job.
//!
//! The [`EventKind`] enum classifies events into four groups:
//! - **Resource events**: naming, creation, readiness, recreation
//! - **Attempt events**: one job execution from launch to termination
//! - **Session events**: state transitions and terminal outcome
//! - **Runtime events**: shutdown and subscriber health
//!
//! The [`Event`] struct carries the metadata (job, resource, attempt, reason, delays).
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tpuvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::DeadlineExceeded)
//!     .with_job("train")
//!     .with_resource("chonk")
//!     .with_attempt(3)
//!     .with_timeout(Duration::from_secs(86_400));
//!
//! assert_eq!(ev.kind, EventKind::DeadlineExceeded);
//! assert_eq!(ev.resource.as_deref(), Some("chonk"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::core::SessionState;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of supervisor events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Resource events ===
    /// A pool name was checked against the provider (debug mode only).
    ///
    /// Sets: `resource` (candidate), `reason` (`"taken"` or `"free"`)
    NameProbed,
    /// A free name was picked from the pool.
    ///
    /// Sets: `resource`
    NameAllocated,
    /// A creation request was issued.
    ///
    /// Sets: `resource`, `reason` (accelerator and topology)
    ResourceCreateRequested,
    /// The resource reported ready.
    ///
    /// Sets: `resource`
    ResourceReady,
    /// Delete-and-create of the resource started.
    ///
    /// Sets: `resource`, `attempt` (round, 1-based)
    RecreateStarting,
    /// A recreate round failed; another one is scheduled.
    ///
    /// Sets: `resource`, `attempt`, `delay_ms`, `reason`
    RecreateRetryScheduled,
    /// The resource was recreated and is ready.
    ///
    /// Sets: `resource`, `attempt` (rounds used)
    ResourceRecreated,

    // === Attempt events ===
    /// A job attempt is being launched.
    ///
    /// Sets: `job`, `resource`, `attempt`
    AttemptStarting,
    /// The attempt finished successfully.
    ///
    /// Sets: `job`, `attempt`
    AttemptCompleted,
    /// The attempt ended with a job error.
    ///
    /// Sets: `job`, `attempt`, `reason`
    AttemptFailed,
    /// The attempt hit its restart deadline and was terminated.
    ///
    /// Sets: `job`, `attempt`, `timeout_ms`
    DeadlineExceeded,
    /// The resource was polled for preemption (debug mode only).
    ///
    /// Sets: `resource`, `poll`
    PreemptionPolled,
    /// The provider reclaimed the resource.
    ///
    /// Sets: `resource`, `attempt`, `poll`
    PreemptionDetected,
    /// The execution context was forcibly terminated.
    ///
    /// Sets: `job`, `attempt`, `reason`
    ExecutionKilled,
    /// A retryable job error; waiting before checking the resource again.
    ///
    /// Sets: `job`, `attempt`, `delay_ms`, `reason`
    ErrorBackoff,

    // === Session events ===
    /// The session state machine moved.
    ///
    /// Sets: `job`, `state`
    StateChanged,
    /// The job completed; the session is over.
    ///
    /// Sets: `job`, `resource`, `attempt` (attempts used)
    SessionDone,
    /// The session ended with an error.
    ///
    /// Sets: `job`, `resource`, `reason`
    SessionFatal,

    // === Runtime events ===
    /// Shutdown requested (OS signal observed).
    ShutdownRequested,
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `job` (subscriber name), `reason`
    SubscriberPanicked,
    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `job` (subscriber name), `reason`
    SubscriberOverflow,
}

/// Supervisor event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Job name, if applicable.
    pub job: Option<Arc<str>>,
    /// Resource name, if applicable.
    pub resource: Option<Arc<str>>,
    /// Attempt or round number (1-based).
    pub attempt: Option<u32>,
    /// Preemption poll counter within the attempt.
    pub poll: Option<u32>,
    /// Human-readable reason.
    pub reason: Option<Arc<str>>,
    /// Delay before the next step in milliseconds.
    pub delay_ms: Option<u32>,
    /// Deadline in milliseconds.
    pub timeout_ms: Option<u32>,
    /// New session state (for `StateChanged`).
    pub state: Option<SessionState>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            job: None,
            resource: None,
            attempt: None,
            poll: None,
            reason: None,
            delay_ms: None,
            timeout_ms: None,
            state: None,
        }
    }

    /// Attaches a job name.
    #[inline]
    pub fn with_job(mut self, job: impl Into<Arc<str>>) -> Self {
        self.job = Some(job.into());
        self
    }

    /// Attaches a resource name.
    #[inline]
    pub fn with_resource(mut self, resource: impl Into<Arc<str>>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Attaches an attempt number.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a poll counter.
    #[inline]
    pub fn with_poll(mut self, n: u32) -> Self {
        self.poll = Some(n);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(millis_u32(d));
        self
    }

    /// Attaches a deadline (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(millis_u32(d));
        self
    }

    /// Attaches a session state.
    #[inline]
    pub fn with_state(mut self, state: SessionState) -> Self {
        self.state = Some(state);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_job(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_job(subscriber)
            .with_reason(info)
    }
}

fn millis_u32(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}
