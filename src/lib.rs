//! # tpuvisor
//!
//! **Tpuvisor** keeps a long-running job alive on a preemptible TPU.
//!
//! Preemptible accelerators are cheap but can be reclaimed by the provider at
//! any time. The supervisor runs the job, polls the resource for preemption,
//! enforces an optional restart deadline and, whenever the resource is gone or
//! the deadline hits, kills the job, recreates the resource and starts over.
//!
//! ## Architecture
//! ```text
//!        JobSpec + ResourceRequest
//!                  │
//!                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor                                                       │
//! │  - Bus (broadcast events)                                         │
//! │  - SubscriberSet (fans out to user subscribers)                   │
//! │  - NameAllocator (names for unnamed resources)                    │
//! │  - ResourceController (ensure / recreate on top of FleetControl)  │
//! │  - LivenessGauge (at most one live execution)                     │
//! └──────┬───────────────────────────────────────────────────┬────────┘
//!        ▼                                                   │
//!   ┌──────────────────────┐        ┌─────────────────────┐  │
//!   │ Session (state loop) │───────►│ AttemptRunner       │  │
//!   │ Idle → Ensuring →    │        │ select! {           │  │
//!   │ Running → Handling*  │        │   deadline guard,   │  │
//!   │ → Done | Fatal       │        │   preemption watch, │  │
//!   └──────────┬───────────┘        │   runtime token }   │  │
//!              │                    └──────────┬──────────┘  │
//!              │ recreate                      │ launch/kill │
//!              ▼                               ▼             │
//!   ┌──────────────────────┐        ┌─────────────────────┐  │
//!   │ FleetControl         │        │ Job / Execution     │  │
//!   │ GcloudFleet,         │        │ JobFn, CommandJob   │  │
//!   │ InMemoryFleet        │        └─────────────────────┘  │
//!   └──────────────────────┘                                 ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │                   (capacity: Config::bus_capacity)                │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                         subscriber_listener ──► SubscriberSet
//!                                              ┌─────────┼─────────┐
//!                                              ▼         ▼         ▼
//!                                           worker1   worker2   workerN
//! ```
//!
//! ## Features
//! | Area              | Description                                                    | Key types / traits                        |
//! |-------------------|----------------------------------------------------------------|-------------------------------------------|
//! | **Supervision**   | One session per job: run, watch, recreate, relaunch.           | [`Supervisor`], [`SessionReport`]         |
//! | **Jobs**          | Async closures or external commands, killable per attempt.     | [`Job`], [`JobFn`], [`CommandJob`]        |
//! | **Fleet**         | Provider seam for existence, state, create, delete, recreate.  | [`FleetControl`], [`GcloudFleet`]         |
//! | **Resources**     | Topology, naming and resolved resource descriptions.           | [`ResourceRequest`], [`ResourceSpec`]     |
//! | **Policies**      | Which job errors retry; how recreation retries.                | [`RetryOn`], [`RecreatePolicy`]           |
//! | **Subscriber API**| Hook into lifecycle events (logging, metrics, alerts).         | [`Subscribe`], [`Event`]                  |
//! | **Errors**        | Typed errors for supervision, provider and job failures.       | [`SupervisorError`], [`JobError`]         |
//!
//! ## Optional features
//! - `logging` (default): exports [`LogWriter`], rendering events through `tracing`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use tpuvisor::{
//!     CommandJob, Config, InMemoryFleet, JobSpec, ResourceRequest, Supervisor, TopologySize,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = Config::default();
//!     cfg.set_project("research");
//!     cfg.set_zone("europe-west4-a");
//!
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn tpuvisor::Subscribe>> = vec![Arc::new(tpuvisor::LogWriter::new())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn tpuvisor::Subscribe>> = Vec::new();
//!
//!     let sup = Supervisor::builder(cfg.clone(), Arc::new(InMemoryFleet::new()))
//!         .with_subscribers(subs)
//!         .build();
//!
//!     let job = CommandJob::shell("train", "echo training on $TPU_NAME").arc();
//!     let report = sup
//!         .run(JobSpec::with_defaults(job, &cfg), ResourceRequest::new(TopologySize::V8))
//!         .await?;
//!     println!("done after {} attempt(s) on {}", report.attempts, report.resource.name);
//!     sup.shutdown().await;
//!     Ok(())
//! }
//! ```
mod config;
mod core;
mod error;
mod events;
mod fleet;
mod jobs;
mod policies;
mod resource;
mod subscribers;

// ---- Public re-exports ----

pub use config::{Config, DEFAULT_ACCELERATOR_TYPE, DEFAULT_NAMES, DEFAULT_SOFTWARE_VERSION};
pub use core::{Outcome, SessionReport, SessionState, Supervisor, SupervisorBuilder, run_with_deadline};
pub use error::{ControllerError, JobError, SupervisorError};
pub use events::{Bus, Event, EventKind};
pub use fleet::{FleetCalls, FleetControl, GcloudFleet, InMemoryFleet, ResourceState};
pub use jobs::{AttemptContext, CommandJob, Execution, Job, JobFn, JobRef, JobSpec};
pub use policies::{JitterPolicy, RecreatePolicy, RetryOn, RetryPredicate};
pub use resource::{Ensured, NameAllocator, ResourceController, ResourceRequest, ResourceSpec, TopologySize};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: built-in subscriber rendering events through `tracing`.
// Enable with: `--features logging` (on by default)
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
