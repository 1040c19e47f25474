//! # In-memory fleet.
//!
//! [`InMemoryFleet`] keeps resources in a map and answers the [`FleetControl`]
//! operations instantly. Created resources are `READY` at once. Preemption is
//! scripted: either immediately with [`preempt`](InMemoryFleet::preempt), or
//! on the n-th preemption poll of a resource incarnation with
//! [`preempt_on_poll`](InMemoryFleet::preempt_on_poll).
//!
//! Every call is counted, see [`calls`](InMemoryFleet::calls).

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{FleetControl, ResourceState};
use crate::error::ControllerError;
use crate::resource::ResourceSpec;

/// Number of calls per fleet operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FleetCalls {
    pub exists: u32,
    pub create: u32,
    pub delete: u32,
    pub recreate: u32,
    pub state: u32,
    pub preempted_polls: u32,
}

#[derive(Debug)]
struct Node {
    spec: ResourceSpec,
    state: ResourceState,
    polls: u32,
    preempt_at: Option<u32>,
}

#[derive(Debug, Default)]
struct Inner {
    nodes: HashMap<String, Node>,
    preempt_plan: HashMap<String, VecDeque<u32>>,
    failing_recreates: u32,
    calls: FleetCalls,
}

impl Inner {
    fn insert(&mut self, spec: &ResourceSpec) {
        let preempt_at = self
            .preempt_plan
            .get_mut(&spec.name)
            .and_then(VecDeque::pop_front);
        self.nodes.insert(
            spec.name.clone(),
            Node {
                spec: spec.clone(),
                state: ResourceState::Ready,
                polls: 0,
                preempt_at,
            },
        );
    }
}

/// Fleet backed by a map, for dry runs and tests.
#[derive(Debug, Default)]
pub struct InMemoryFleet {
    inner: Mutex<Inner>,
}

impl InMemoryFleet {
    /// Creates an empty fleet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a ready resource, as if someone created it before us.
    pub fn with_resource(self, spec: ResourceSpec) -> Self {
        self.lock().insert(&spec);
        self
    }

    /// Marks the resource as preempted now.
    pub fn preempt(&self, name: &str) {
        if let Some(node) = self.lock().nodes.get_mut(name) {
            node.state = ResourceState::Preempted;
        }
    }

    /// Schedules a preemption on poll `n` (1-based) of the next resource
    /// incarnation named `name`. Queued calls apply to successive incarnations.
    pub fn preempt_on_poll(&self, name: &str, n: u32) {
        let n = n.max(1);
        let mut inner = self.lock();
        if let Some(node) = inner
            .nodes
            .get_mut(name)
            .filter(|node| node.preempt_at.is_none() && node.state == ResourceState::Ready)
        {
            node.preempt_at = Some(n);
            return;
        }
        inner
            .preempt_plan
            .entry(name.to_string())
            .or_default()
            .push_back(n);
    }

    /// Makes the next `n` recreate rounds fail.
    pub fn fail_next_recreates(&self, n: u32) {
        self.lock().failing_recreates = n;
    }

    /// Returns a snapshot of the call counters.
    pub fn calls(&self) -> FleetCalls {
        self.lock().calls
    }

    /// Returns the current state of a resource.
    pub fn state_of(&self, name: &str) -> Option<ResourceState> {
        self.lock().nodes.get(name).map(|n| n.state.clone())
    }

    /// Returns the spec a resource was created with.
    pub fn spec_of(&self, name: &str) -> Option<ResourceSpec> {
        self.lock().nodes.get(name).map(|n| n.spec.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Poison-tolerant: every update is a single step.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl FleetControl for InMemoryFleet {
    async fn resource_exists(&self, name: &str, _project: &str) -> Result<bool, ControllerError> {
        let mut inner = self.lock();
        inner.calls.exists += 1;
        Ok(inner.nodes.contains_key(name))
    }

    async fn create_resource(&self, spec: &ResourceSpec) -> Result<(), ControllerError> {
        let mut inner = self.lock();
        inner.calls.create += 1;
        if inner.nodes.contains_key(&spec.name) {
            return Err(ControllerError::Provider(format!(
                "resource {:?} already exists",
                spec.name
            )));
        }
        inner.insert(spec);
        Ok(())
    }

    async fn delete_resource(
        &self,
        name: &str,
        _zone: &str,
        _project: &str,
    ) -> Result<(), ControllerError> {
        let mut inner = self.lock();
        inner.calls.delete += 1;
        inner.nodes.remove(name);
        Ok(())
    }

    async fn resource_state(
        &self,
        name: &str,
        _zone: &str,
        _project: &str,
    ) -> Result<Option<ResourceState>, ControllerError> {
        let mut inner = self.lock();
        inner.calls.state += 1;
        Ok(inner.nodes.get(name).map(|n| n.state.clone()))
    }

    async fn is_resource_preempted(
        &self,
        name: &str,
        _zone: &str,
        _project: &str,
    ) -> Result<bool, ControllerError> {
        let mut inner = self.lock();
        inner.calls.preempted_polls += 1;
        let Some(node) = inner.nodes.get_mut(name) else {
            return Ok(true);
        };
        node.polls += 1;
        if node.preempt_at.is_some_and(|at| node.polls >= at) {
            node.preempt_at = None;
            node.state = ResourceState::Preempted;
        }
        Ok(node.state.is_reclaimed())
    }

    async fn recreate_resource(&self, spec: &ResourceSpec) -> Result<(), ControllerError> {
        let mut inner = self.lock();
        inner.calls.recreate += 1;
        if inner.failing_recreates > 0 {
            inner.failing_recreates -= 1;
            return Err(ControllerError::Provider("no capacity in zone".into()));
        }
        inner.nodes.remove(&spec.name);
        inner.insert(spec);
        Ok(())
    }
}
