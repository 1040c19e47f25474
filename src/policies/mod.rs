//! Retry and recreate policies.
//!
//! ## Contents
//! - [`RetryOn`] which job errors get another attempt
//! - [`RecreatePolicy`] how resource recreation retries (base / factor / max + jitter, attempts, readiness wait)
//! - [`JitterPolicy`] randomization to avoid thundering-herd recreation
//!
//! ## Defaults
//! - `RetryOn::Any`
//! - `RecreatePolicy::default()` → retry=60s, constant, jitter=Spread{1.5}, 10 rounds.

mod jitter;
mod recreate;
mod retry;

pub use jitter::JitterPolicy;
pub use recreate::RecreatePolicy;
pub use retry::{RetryOn, RetryPredicate};
