//! # Recreate policy.
//!
//! [`RecreatePolicy`] controls how [`ResourceController::recreate`](crate::ResourceController::recreate)
//! retries a failed delete-and-create round and how long it waits for the
//! resource to report ready.
//!
//! The delay before round `n + 1` is `retry × factor^n`, clamped to `max`, then
//! jittered. The base is derived from the round number only, so jitter output
//! never feeds back into later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use tpuvisor::{JitterPolicy, RecreatePolicy};
//!
//! let policy = RecreatePolicy {
//!     retry: Duration::from_secs(60),
//!     jitter: JitterPolicy::None,
//!     ..RecreatePolicy::default()
//! };
//!
//! // Constant by default (factor = 1.0).
//! assert_eq!(policy.next(0), Duration::from_secs(60));
//! assert_eq!(policy.next(5), Duration::from_secs(60));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Retry budget and readiness wait for resource recreation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecreatePolicy {
    /// Base delay between failed rounds.
    pub retry: Duration,
    /// Multiplicative growth factor (`1.0` = constant).
    pub factor: f64,
    /// Delay cap.
    pub max: Duration,
    /// Randomization applied to each delay.
    pub jitter: JitterPolicy,
    /// Rounds before giving up (`0` is treated as `1`).
    pub max_attempts: u32,
    /// How long one round waits for the resource to become ready.
    pub ready_timeout: Duration,
    /// State polling period while waiting for readiness.
    pub ready_poll: Duration,
}

impl Default for RecreatePolicy {
    /// - `retry = 60s`, `factor = 1.0`, `max = 30min`
    /// - `jitter = Spread { ratio: 1.5 }`
    /// - `max_attempts = 10`
    /// - `ready_timeout = 15min`, `ready_poll = 10s`
    fn default() -> Self {
        Self {
            retry: Duration::from_secs(60),
            factor: 1.0,
            max: Duration::from_secs(30 * 60),
            jitter: JitterPolicy::Spread { ratio: 1.5 },
            max_attempts: 10,
            ready_timeout: Duration::from_secs(15 * 60),
            ready_poll: Duration::from_secs(10),
        }
    }
}

impl RecreatePolicy {
    /// Constant policy with base `retry` and an upward spread of `retry_randomness`.
    pub fn with_retry(retry: Duration, retry_randomness: f64) -> Self {
        Self {
            retry,
            jitter: JitterPolicy::Spread {
                ratio: retry_randomness,
            },
            ..Self::default()
        }
    }

    /// Delay to wait after failed round `attempt` (0-indexed).
    pub fn next(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.retry.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };
        self.jitter.apply(base)
    }

    /// Effective number of rounds.
    #[inline]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Readiness polling period, never zero.
    #[inline]
    pub fn ready_poll_clamped(&self) -> Duration {
        self.ready_poll.max(Duration::from_millis(1))
    }
}
