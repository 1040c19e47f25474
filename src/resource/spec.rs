//! # Resource description.
//!
//! - [`TopologySize`] the slice size of an accelerator instance
//! - [`ResourceRequest`] what a caller asks for (anything left unset falls back to [`Config`])
//! - [`ResourceSpec`] the fully resolved, immutable description handed to the fleet
//!
//! ## Invariant
//! The provider does not offer preemptible slices at the smallest topology by
//! default, so [`ResourceRequest::resolve`] forces `preemptible = false` for
//! [`TopologySize::V8`] unless [`Config::allow_preemptible_smallest`] is set.

use std::fmt;

use crate::config::Config;
use crate::error::SupervisorError;

/// Accelerator slice size (number of cores).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TopologySize {
    V8,
    V32,
    V64,
    V128,
    V256,
    V512,
    V1024,
    V2048,
}

impl TopologySize {
    /// Every supported size, smallest first.
    pub const ALL: [TopologySize; 8] = [
        TopologySize::V8,
        TopologySize::V32,
        TopologySize::V64,
        TopologySize::V128,
        TopologySize::V256,
        TopologySize::V512,
        TopologySize::V1024,
        TopologySize::V2048,
    ];

    /// Core count.
    pub fn cores(self) -> u32 {
        match self {
            TopologySize::V8 => 8,
            TopologySize::V32 => 32,
            TopologySize::V64 => 64,
            TopologySize::V128 => 128,
            TopologySize::V256 => 256,
            TopologySize::V512 => 512,
            TopologySize::V1024 => 1024,
            TopologySize::V2048 => 2048,
        }
    }

    /// `true` for the smallest slice.
    pub fn is_smallest(self) -> bool {
        self == TopologySize::V8
    }
}

impl TryFrom<u32> for TopologySize {
    type Error = SupervisorError;

    fn try_from(cores: u32) -> Result<Self, Self::Error> {
        TopologySize::ALL
            .into_iter()
            .find(|s| s.cores() == cores)
            .ok_or_else(|| SupervisorError::Config(format!("unsupported topology size {cores}")))
    }
}

impl fmt::Display for TopologySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cores())
    }
}

/// Fully resolved resource description.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceSpec {
    /// Resource name, unique within the project.
    pub name: String,
    /// Slice size.
    pub size: TopologySize,
    /// Accelerator generation, e.g. `v3`.
    pub accelerator_type: String,
    /// Software (runtime image) version.
    pub software_version: String,
    /// Zone.
    pub zone: String,
    /// Cloud project.
    pub project: String,
    /// Whether the provider may reclaim the resource.
    pub preemptible: bool,
}

impl ResourceSpec {
    /// Provider accelerator identifier, e.g. `v3-32`.
    pub fn accelerator(&self) -> String {
        format!("{}-{}", self.accelerator_type, self.size)
    }

    #[cfg(test)]
    pub(crate) fn for_tests(name: &str, size: TopologySize) -> Self {
        Self {
            name: name.to_string(),
            size,
            accelerator_type: "v3".to_string(),
            software_version: "1.15.2".to_string(),
            zone: "europe-west4-a".to_string(),
            project: "research".to_string(),
            preemptible: !size.is_smallest(),
        }
    }
}

/// Caller overrides for a resource; unset fields come from [`Config`].
///
/// ## Example
/// ```rust
/// use tpuvisor::{Config, ResourceRequest, TopologySize};
///
/// let mut cfg = Config::default();
/// cfg.set_project("research");
/// cfg.set_zone("europe-west4-a");
///
/// let spec = ResourceRequest::new(TopologySize::V8)
///     .named("chonk")
///     .resolve("chonk".into(), &cfg)
///     .unwrap();
///
/// assert_eq!(spec.accelerator(), "v3-8");
/// assert!(!spec.preemptible); // smallest topology
/// ```
#[derive(Clone, Debug)]
pub struct ResourceRequest {
    size: TopologySize,
    name: Option<String>,
    accelerator_type: Option<String>,
    software_version: Option<String>,
    zone: Option<String>,
    project: Option<String>,
    preemptible: bool,
}

impl ResourceRequest {
    /// Requests a preemptible resource of the given size.
    pub fn new(size: TopologySize) -> Self {
        Self {
            size,
            name: None,
            accelerator_type: None,
            software_version: None,
            zone: None,
            project: None,
            preemptible: true,
        }
    }

    /// Uses a fixed name instead of allocating one from the pool.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Overrides the accelerator generation.
    pub fn with_accelerator_type(mut self, accelerator_type: impl Into<String>) -> Self {
        self.accelerator_type = Some(accelerator_type.into());
        self
    }

    /// Overrides the software version.
    pub fn with_software_version(mut self, version: impl Into<String>) -> Self {
        self.software_version = Some(version.into());
        self
    }

    /// Overrides the zone.
    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    /// Overrides the project.
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Requests a preemptible (default) or on-demand resource.
    pub fn preemptible(mut self, preemptible: bool) -> Self {
        self.preemptible = preemptible;
        self
    }

    /// Requested size.
    pub fn size(&self) -> TopologySize {
        self.size
    }

    /// Fixed name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Effective project.
    pub fn project<'a>(&'a self, cfg: &'a Config) -> Result<&'a str, SupervisorError> {
        self.project.as_deref().or(cfg.project.as_deref()).ok_or_else(|| {
            SupervisorError::Config(
                "no project set: pass one in the request or set Config::project".into(),
            )
        })
    }

    /// Effective zone.
    pub fn zone<'a>(&'a self, cfg: &'a Config) -> Result<&'a str, SupervisorError> {
        self.zone.as_deref().or(cfg.zone.as_deref()).ok_or_else(|| {
            SupervisorError::Config("no zone set: pass one in the request or set Config::zone".into())
        })
    }

    /// Merges the request with config defaults under the given name.
    pub fn resolve(&self, name: String, cfg: &Config) -> Result<ResourceSpec, SupervisorError> {
        let project = self.project(cfg)?.to_string();
        let zone = self.zone(cfg)?.to_string();

        let mut preemptible = self.preemptible;
        if preemptible && self.size.is_smallest() && !cfg.allow_preemptible_smallest {
            tracing::debug!(
                resource = %name,
                "smallest topology cannot be preemptible in this project, requesting on-demand"
            );
            preemptible = false;
        }

        Ok(ResourceSpec {
            name,
            size: self.size,
            accelerator_type: self
                .accelerator_type
                .clone()
                .unwrap_or_else(|| cfg.accelerator_type.clone()),
            software_version: self
                .software_version
                .clone()
                .unwrap_or_else(|| cfg.software_version.clone()),
            zone,
            project,
            preemptible,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Config {
        Config {
            project: Some("research".into()),
            zone: Some("us-central1-f".into()),
            ..Config::default()
        }
    }

    #[test]
    fn test_smallest_topology_is_not_preemptible() {
        let spec = ResourceRequest::new(TopologySize::V8)
            .resolve("anna".into(), &cfg())
            .unwrap();
        assert!(!spec.preemptible);

        let allowed = Config {
            allow_preemptible_smallest: true,
            ..cfg()
        };
        let spec = ResourceRequest::new(TopologySize::V8)
            .resolve("anna".into(), &allowed)
            .unwrap();
        assert!(spec.preemptible);
    }

    #[test]
    fn test_larger_topologies_keep_preemptible() {
        let spec = ResourceRequest::new(TopologySize::V128)
            .resolve("jill".into(), &cfg())
            .unwrap();
        assert!(spec.preemptible);
        assert_eq!(spec.accelerator(), "v3-128");
        assert_eq!(spec.software_version, "1.15.2");
    }

    #[test]
    fn test_overrides_win_over_config() {
        let spec = ResourceRequest::new(TopologySize::V32)
            .with_zone("europe-west4-a")
            .with_project("other")
            .with_accelerator_type("v2")
            .with_software_version("2.4.0")
            .preemptible(false)
            .resolve("simon".into(), &cfg())
            .unwrap();
        assert_eq!(spec.zone, "europe-west4-a");
        assert_eq!(spec.project, "other");
        assert_eq!(spec.accelerator(), "v2-32");
        assert_eq!(spec.software_version, "2.4.0");
        assert!(!spec.preemptible);
    }

    #[test]
    fn test_missing_project_or_zone() {
        let no_project = Config {
            project: None,
            ..cfg()
        };
        let err = ResourceRequest::new(TopologySize::V32)
            .resolve("x".into(), &no_project)
            .unwrap_err();
        assert_eq!(err.as_label(), "config_invalid");

        let no_zone = Config {
            zone: None,
            ..cfg()
        };
        assert!(
            ResourceRequest::new(TopologySize::V32)
                .resolve("x".into(), &no_zone)
                .is_err()
        );
    }

    #[test]
    fn test_topology_from_cores() {
        assert_eq!(TopologySize::try_from(512).unwrap(), TopologySize::V512);
        assert!(TopologySize::try_from(16).is_err());
    }
}
