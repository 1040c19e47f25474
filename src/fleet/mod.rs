//! # Fleet control: the resource provider seen from the supervisor.
//!
//! [`FleetControl`] is the seam between the supervision core and whatever
//! actually provisions accelerators. Two implementations ship with the crate:
//!
//! - [`GcloudFleet`] drives the `gcloud compute tpus` CLI
//! - [`InMemoryFleet`] keeps resources in memory (dry runs, tests)
//!
//! ## Contract
//! - `resource_exists` / `resource_state` never fail for "not found"
//! - `create_resource` only *requests* creation; readiness is observed via `resource_state`
//! - `recreate_resource` is one delete-if-present plus create round; the
//!   retry budget around it belongs to [`ResourceController`](crate::ResourceController)
//! - `is_resource_preempted` is polled on every supervision tick and must stay cheap

mod gcloud;
mod memory;

pub use gcloud::GcloudFleet;
pub use memory::{FleetCalls, InMemoryFleet};

use std::fmt;

use async_trait::async_trait;

use crate::error::ControllerError;
use crate::resource::ResourceSpec;

/// Provider-reported lifecycle state of a resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceState {
    Creating,
    Ready,
    Restarting,
    Repairing,
    Preempted,
    Terminated,
    Stopped,
    Deleting,
    /// Anything the provider reports that we do not model.
    Other(String),
}

impl ResourceState {
    /// Parses a provider state string (case-insensitive).
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "CREATING" | "STARTING" => ResourceState::Creating,
            "READY" => ResourceState::Ready,
            "RESTARTING" => ResourceState::Restarting,
            "REPAIRING" => ResourceState::Repairing,
            "PREEMPTED" => ResourceState::Preempted,
            "TERMINATED" => ResourceState::Terminated,
            "STOPPED" | "STOPPING" => ResourceState::Stopped,
            "DELETING" => ResourceState::Deleting,
            other => ResourceState::Other(other.to_string()),
        }
    }

    /// `true` when the provider took the resource away from us.
    pub fn is_reclaimed(&self) -> bool {
        matches!(
            self,
            ResourceState::Preempted | ResourceState::Terminated | ResourceState::Stopped
        )
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceState::Creating => "CREATING",
            ResourceState::Ready => "READY",
            ResourceState::Restarting => "RESTARTING",
            ResourceState::Repairing => "REPAIRING",
            ResourceState::Preempted => "PREEMPTED",
            ResourceState::Terminated => "TERMINATED",
            ResourceState::Stopped => "STOPPED",
            ResourceState::Deleting => "DELETING",
            ResourceState::Other(s) => s,
        };
        f.write_str(s)
    }
}

/// # Resource provider operations consumed by the supervisor.
#[async_trait]
pub trait FleetControl: Send + Sync + 'static {
    /// Returns `true` if a resource with this name exists in the project (any zone).
    async fn resource_exists(&self, name: &str, project: &str) -> Result<bool, ControllerError>;

    /// Requests creation of the resource. Does not wait for readiness.
    async fn create_resource(&self, spec: &ResourceSpec) -> Result<(), ControllerError>;

    /// Deletes the resource and waits for the deletion to finish.
    async fn delete_resource(
        &self,
        name: &str,
        zone: &str,
        project: &str,
    ) -> Result<(), ControllerError>;

    /// Current state, or `None` if the resource does not exist.
    async fn resource_state(
        &self,
        name: &str,
        zone: &str,
        project: &str,
    ) -> Result<Option<ResourceState>, ControllerError>;

    /// Returns `true` if the resource was reclaimed out-of-band.
    ///
    /// A resource that vanished counts as reclaimed.
    async fn is_resource_preempted(
        &self,
        name: &str,
        zone: &str,
        project: &str,
    ) -> Result<bool, ControllerError> {
        Ok(match self.resource_state(name, zone, project).await? {
            None => true,
            Some(state) => state.is_reclaimed(),
        })
    }

    /// One recreate round: delete if present, then request creation.
    async fn recreate_resource(&self, spec: &ResourceSpec) -> Result<(), ControllerError> {
        if self
            .resource_state(&spec.name, &spec.zone, &spec.project)
            .await?
            .is_some()
        {
            self.delete_resource(&spec.name, &spec.zone, &spec.project)
                .await?;
        }
        self.create_resource(spec).await
    }
}
