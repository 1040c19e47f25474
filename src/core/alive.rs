//! # Live execution gauge.
//!
//! Counts job executions that were launched and not yet reaped. The runner
//! holds an [`AliveGuard`] for the whole life of an execution, so the gauge
//! drops back only after `kill`/`wait` returned.
//!
//! ## Rules
//! - `current` is the number of guards alive right now
//! - `peak` is the highest `current` ever observed (never decreases)

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Shared counter of live executions.
#[derive(Debug, Default)]
pub struct LivenessGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl LivenessGauge {
    /// Creates a gauge at zero.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers one live execution until the guard is dropped.
    pub fn enter(self: &Arc<Self>) -> AliveGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        AliveGuard {
            gauge: Arc::clone(self),
        }
    }

    /// Executions alive right now.
    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously alive executions.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Keeps one execution counted while alive.
#[derive(Debug)]
pub struct AliveGuard {
    gauge: Arc<LivenessGauge>,
}

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.gauge.current.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_and_peak() {
        let gauge = LivenessGauge::new();
        {
            let _a = gauge.enter();
            let _b = gauge.enter();
            assert_eq!(gauge.current(), 2);
        }
        let _c = gauge.enter();
        assert_eq!(gauge.current(), 1);
        assert_eq!(gauge.peak(), 2);
    }
}
