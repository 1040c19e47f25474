use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{alive::LivenessGauge, supervisor::Supervisor};
use crate::{
    config::Config,
    events::Bus,
    fleet::FleetControl,
    resource::{NameAllocator, ResourceController},
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for constructing a [`Supervisor`].
pub struct SupervisorBuilder {
    cfg: Config,
    fleet: Arc<dyn FleetControl>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    names: Option<NameAllocator>,
}

impl SupervisorBuilder {
    /// Creates a new builder over the given fleet.
    pub fn new(cfg: Config, fleet: Arc<dyn FleetControl>) -> Self {
        Self {
            cfg,
            fleet,
            subscribers: Vec::new(),
            names: None,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive every published event through dedicated workers
    /// with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Replaces the allocator built from [`Config::name_pool`].
    pub fn with_name_allocator(mut self, names: NameAllocator) -> Self {
        self.names = Some(names);
        self
    }

    /// Builds the supervisor and starts its event fan-out.
    ///
    /// Call [`Supervisor::shutdown`] before exiting to flush subscribers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Arc<Supervisor> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = SubscriberSet::new(self.subscribers, bus.clone());
        let runtime_token = CancellationToken::new();

        let names = self
            .names
            .unwrap_or_else(|| NameAllocator::new(self.cfg.name_pool.iter().cloned()));
        let controller = ResourceController::new(self.fleet, bus.clone(), runtime_token.clone());

        Arc::new(Supervisor::new_internal(
            self.cfg,
            bus,
            subs,
            names,
            controller,
            runtime_token,
            LivenessGauge::new(),
        ))
    }
}
