//! # Event subscribers.
//!
//! The [`Subscribe`] trait plus the fan-out machinery that feeds it.
//!
//! ```text
//!   session / runner / controller ── publish(Event) ──► Bus
//!                                                        │
//!                              Supervisor::subscriber_listener
//!                                                        │
//!                                                        ▼
//!                                                 SubscriberSet::emit
//!                                        ┌───────────────┼───────────────┐
//!                                        ▼               ▼               ▼
//!                                    LogWriter        Metrics          Custom
//! ```
//!
//! - [`Subscribe`]: extension point for event handlers
//! - [`SubscriberSet`]: per-subscriber bounded queues with panic isolation
//! - [`LogWriter`]: built-in `tracing` renderer (feature `logging`)

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscriber;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
