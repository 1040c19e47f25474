//! Resource description, naming and lifecycle.
//!
//! - [`spec`]: [`ResourceRequest`] and the resolved [`ResourceSpec`];
//! - [`names`]: [`NameAllocator`] for unnamed resources;
//! - [`controller`]: [`ResourceController`], creation/recreation on top of a fleet.

mod controller;
mod names;
mod spec;

pub use controller::{Ensured, ResourceController};
pub use names::NameAllocator;
pub use spec::{ResourceRequest, ResourceSpec, TopologySize};
