//! # Jitter policy for recreate delays.
//!
//! [`JitterPolicy`] adds randomness to retry delays so that many workers evicted
//! at the same moment do not hammer the provider in lockstep.
//!
//! - [`JitterPolicy::None`] no randomization, predictable delays
//! - [`JitterPolicy::Full`] random delay in `[0, d]`
//! - [`JitterPolicy::Equal`] `d/2 + random[0, d/2]`
//! - [`JitterPolicy::Spread`] random delay in `[d, d × ratio]` (never shorter than `d`)

use rand::Rng;
use std::time::Duration;

/// Policy controlling randomization of retry delays.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum JitterPolicy {
    /// No jitter: use the exact delay.
    #[default]
    None,

    /// Full jitter: random delay in `[0, d]`.
    Full,

    /// Equal jitter: `d/2 + random[0, d/2]`.
    Equal,

    /// Upward spread: random delay in `[d, d × ratio]`.
    ///
    /// A `ratio` of `1.5` waits between 1× and 1.5× the base delay.
    /// Ratios `<= 1.0` (or non-finite) disable the spread.
    Spread {
        /// Upper bound as a multiple of the base delay.
        ratio: f64,
    },
}

impl JitterPolicy {
    /// Applies jitter to the given delay.
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Full => full_jitter(delay),
            JitterPolicy::Equal => equal_jitter(delay),
            JitterPolicy::Spread { ratio } => spread_jitter(delay, *ratio),
        }
    }
}

fn full_jitter(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=ms))
}

fn equal_jitter(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    let half = ms / 2;
    let jitter = if half == 0 {
        0
    } else {
        rand::rng().random_range(0..=half)
    };
    Duration::from_millis(half + jitter)
}

fn spread_jitter(delay: Duration, ratio: f64) -> Duration {
    if !ratio.is_finite() || ratio <= 1.0 {
        return delay;
    }
    let lo = delay.as_secs_f64();
    let hi = lo * ratio;
    if !hi.is_finite() || hi <= lo {
        return delay;
    }
    Duration::from_secs_f64(rand::rng().random_range(lo..=hi))
}
