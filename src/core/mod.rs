//! Runtime core: supervision sessions and their lifecycle.
//!
//! The public surface of this module is [`Supervisor`] (with its builder),
//! the session types and the deadline guard.
//!
//! Internal modules:
//! - [`supervisor`]: owns bus, subscribers, name pool and controller; runs sessions;
//! - [`session`]: the per-job state machine (retry / recreate decisions);
//! - [`runner`]: runs one attempt, racing deadline, preemption watch and shutdown;
//! - [`guard`]: waits for an execution under a hard deadline;
//! - [`alive`]: counts live executions;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod alive;
mod builder;
mod guard;
mod runner;
mod session;
mod shutdown;
mod state;
mod supervisor;

pub use builder::SupervisorBuilder;
pub use guard::{Outcome, run_with_deadline};
pub use state::{SessionReport, SessionState};
pub use supervisor::Supervisor;
