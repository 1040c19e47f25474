//! # Supervisor configuration.
//!
//! [`Config`] holds the defaults every session starts from:
//! 1. **Resource defaults**: project, zone, software version, accelerator type, name pool.
//! 2. **Session timing**: preemption poll interval and restart deadline.
//! 3. **Policies**: which job errors are retried, how recreation retries.
//!
//! Per-job values can be overridden through [`JobSpec`](crate::JobSpec), per-resource
//! values through [`ResourceRequest`](crate::ResourceRequest).
//!
//! ## Sentinel values
//! - `restart_after = 0s` → no restart deadline
//! - `wait_interval = 0s` → clamped to 1ms

use std::time::Duration;

use crate::policies::{RecreatePolicy, RetryOn};

/// Names tried, in random order, when a resource is requested without a name.
pub const DEFAULT_NAMES: [&str; 10] = [
    "wheatley", "chonk", "gerard", "simon", "goose", "megatron", "james", "jill", "anna", "pietro",
];

/// Software version used when neither the request nor the config names one.
pub const DEFAULT_SOFTWARE_VERSION: &str = "1.15.2";

/// Accelerator generation used when neither the request nor the config names one.
pub const DEFAULT_ACCELERATOR_TYPE: &str = "v3";

/// Global configuration for the supervisor.
///
/// ## Field semantics
/// - `project` / `zone`: required before any resource can be addressed
/// - `name_pool`: candidates for [`NameAllocator`](crate::NameAllocator)
/// - `debug_mode`: also publish per-poll and per-probe events
/// - `allow_preemptible_smallest`: lift the provider restriction on preemptible 8-core slices
/// - `wait_interval`: preemption poll period, and pause after a retryable job error
/// - `restart_after`: per-attempt deadline after which the resource is cycled
#[derive(Clone, Debug)]
pub struct Config {
    /// Default cloud project.
    pub project: Option<String>,
    /// Default zone.
    pub zone: Option<String>,
    /// Default software (runtime image) version.
    pub software_version: String,
    /// Default accelerator generation, e.g. `v3`.
    pub accelerator_type: String,
    /// Candidate names for unnamed resources.
    pub name_pool: Vec<String>,
    /// Publish chatty events (name probes, preemption polls).
    pub debug_mode: bool,
    /// Allow preemptible resources at the smallest topology.
    pub allow_preemptible_smallest: bool,
    /// Preemption poll period.
    pub wait_interval: Duration,
    /// Per-attempt restart deadline (`0s` = none).
    pub restart_after: Duration,
    /// Default retryable job errors.
    pub retry_on: RetryOn,
    /// Recreate retry budget.
    pub recreate: RecreatePolicy,
    /// Event bus ring buffer size (min 1).
    pub bus_capacity: usize,
    /// How long [`Supervisor::shutdown`](crate::Supervisor::shutdown) waits for subscribers to drain.
    pub grace: Duration,
}

impl Config {
    /// Returns the restart deadline as an `Option`.
    ///
    /// - `None` → attempts run until they end or the resource is preempted
    /// - `Some(d)` → every attempt is cut off after `d`
    #[inline]
    pub fn restart_deadline(&self) -> Option<Duration> {
        if self.restart_after == Duration::ZERO {
            None
        } else {
            Some(self.restart_after)
        }
    }

    /// Returns the poll interval, never zero.
    #[inline]
    pub fn poll_interval(&self) -> Duration {
        self.wait_interval.max(Duration::from_millis(1))
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Sets the default project.
    pub fn set_project(&mut self, project: impl Into<String>) {
        self.project = Some(project.into());
    }

    /// Sets the default zone.
    pub fn set_zone(&mut self, zone: impl Into<String>) {
        self.zone = Some(zone.into());
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - no project, no zone
    /// - `software_version = "1.15.2"`, `accelerator_type = "v3"`
    /// - `name_pool` = [`DEFAULT_NAMES`]
    /// - `debug_mode = true`, `allow_preemptible_smallest = false`
    /// - `wait_interval = 60s`, `restart_after = 24h`
    /// - `retry_on = RetryOn::Any`, `recreate = RecreatePolicy::default()`
    /// - `bus_capacity = 1024`, `grace = 5s`
    fn default() -> Self {
        Self {
            project: None,
            zone: None,
            software_version: DEFAULT_SOFTWARE_VERSION.to_string(),
            accelerator_type: DEFAULT_ACCELERATOR_TYPE.to_string(),
            name_pool: DEFAULT_NAMES.iter().map(|n| n.to_string()).collect(),
            debug_mode: true,
            allow_preemptible_smallest: false,
            wait_interval: Duration::from_secs(60),
            restart_after: Duration::from_secs(86_400),
            retry_on: RetryOn::default(),
            recreate: RecreatePolicy::default(),
            bus_capacity: 1024,
            grace: Duration::from_secs(5),
        }
    }
}
