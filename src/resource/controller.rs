//! # Resource controller.
//!
//! [`ResourceController`] is the supervisor's view of one resource provider.
//! It wraps a [`FleetControl`] and adds what the raw provider calls lack:
//! - events for creation, readiness and recreation
//! - waiting until a resource reports `READY`
//! - the jittered retry budget around delete-and-create rounds
//!
//! ## Recreate flow
//! ```text
//! round = 1..=policy.attempts()
//!   ├─► publish RecreateStarting{ resource, round }
//!   ├─► fleet.recreate_resource(spec)        (delete if present, create)
//!   ├─► wait_ready(spec)                     (poll state every ready_poll)
//!   │       ├─ Ok  ──► publish ResourceRecreated, return rounds used
//!   │       └─ Err ──► last round? ──► RecreateFailed{ attempts, last }
//!   │                           └──► publish RecreateRetryScheduled{ delay }
//!   │                                sleep(policy.next(round - 1)) (cancellable)
//!   └─ loop
//! ```
//!
//! All waits observe the supervisor token and end with
//! [`SupervisorError::Interrupted`] when it is cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::{ControllerError, SupervisorError};
use crate::events::{Bus, Event, EventKind};
use crate::fleet::{FleetControl, ResourceState};
use crate::policies::RecreatePolicy;
use crate::resource::spec::ResourceSpec;

/// What [`ResourceController::ensure`] had to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ensured {
    /// The resource existed and was usable.
    Existing,
    /// A creation request was issued.
    Created,
    /// The resource existed but was reclaimed; it was recreated.
    Recreated { rounds: u32 },
}

/// Creates, recreates and watches resources through a [`FleetControl`].
#[derive(Clone)]
pub struct ResourceController {
    fleet: Arc<dyn FleetControl>,
    bus: Bus,
    token: CancellationToken,
}

impl ResourceController {
    /// Creates a controller publishing into `bus` and stopping waits on `token`.
    pub fn new(fleet: Arc<dyn FleetControl>, bus: Bus, token: CancellationToken) -> Self {
        Self { fleet, bus, token }
    }

    /// Returns the underlying fleet.
    pub fn fleet(&self) -> &Arc<dyn FleetControl> {
        &self.fleet
    }

    /// Returns `true` if the name denotes a live resource.
    pub async fn exists(&self, name: &str, project: &str) -> Result<bool, ControllerError> {
        self.fleet.resource_exists(name, project).await
    }

    /// Issues a creation request without waiting for readiness.
    pub async fn create(&self, spec: &ResourceSpec) -> Result<(), ControllerError> {
        self.bus.publish(
            Event::new(EventKind::ResourceCreateRequested)
                .with_resource(spec.name.as_str())
                .with_reason(format!(
                    "accelerator={} preemptible={} zone={}",
                    spec.accelerator(),
                    spec.preemptible,
                    spec.zone
                )),
        );
        self.fleet.create_resource(spec).await
    }

    /// Returns `true` if the provider reclaimed the resource.
    pub async fn is_preempted(&self, spec: &ResourceSpec) -> Result<bool, ControllerError> {
        self.fleet
            .is_resource_preempted(&spec.name, &spec.zone, &spec.project)
            .await
    }

    /// Makes sure the resource is usable: creates it if absent, recreates it
    /// if it exists but was reclaimed, then waits until it is ready.
    pub async fn ensure(
        &self,
        spec: &ResourceSpec,
        policy: &RecreatePolicy,
    ) -> Result<Ensured, SupervisorError> {
        if !self.exists(&spec.name, &spec.project).await? {
            self.create(spec).await?;
            self.wait_ready(spec, policy).await?;
            return Ok(Ensured::Created);
        }
        if self.is_preempted(spec).await? {
            tracing::info!(resource = %spec.name, "existing resource was reclaimed, recreating");
            let rounds = self.recreate(spec, policy).await?;
            return Ok(Ensured::Recreated { rounds });
        }
        tracing::debug!(resource = %spec.name, "resource already exists");
        self.wait_ready(spec, policy).await?;
        Ok(Ensured::Existing)
    }

    /// Polls the resource state until it reports `READY`.
    ///
    /// ### Errors
    /// - [`ControllerError::NotReady`] after `policy.ready_timeout`
    /// - [`ControllerError::Provider`] if the resource is reclaimed while starting
    /// - [`SupervisorError::Interrupted`] on cancellation
    pub async fn wait_ready(
        &self,
        spec: &ResourceSpec,
        policy: &RecreatePolicy,
    ) -> Result<(), SupervisorError> {
        let started = Instant::now();
        loop {
            let state = self
                .fleet
                .resource_state(&spec.name, &spec.zone, &spec.project)
                .await?;
            match state {
                Some(ResourceState::Ready) => {
                    self.bus.publish(
                        Event::new(EventKind::ResourceReady).with_resource(spec.name.as_str()),
                    );
                    return Ok(());
                }
                Some(s) if s.is_reclaimed() => {
                    return Err(ControllerError::Provider(format!(
                        "resource {:?} went {s} while starting",
                        spec.name
                    ))
                    .into());
                }
                _ => {}
            }

            let waited = started.elapsed();
            if waited >= policy.ready_timeout {
                return Err(ControllerError::NotReady {
                    name: spec.name.clone(),
                    waited,
                }
                .into());
            }
            self.pause(policy.ready_poll_clamped()).await?;
        }
    }

    /// Deletes and recreates the resource, retrying failed rounds per `policy`.
    ///
    /// Returns the number of rounds used. Exhaustion is
    /// [`SupervisorError::RecreateFailed`] carrying the last round's error.
    pub async fn recreate(
        &self,
        spec: &ResourceSpec,
        policy: &RecreatePolicy,
    ) -> Result<u32, SupervisorError> {
        let rounds = policy.attempts();
        let mut round: u32 = 0;

        loop {
            round += 1;
            self.bus.publish(
                Event::new(EventKind::RecreateStarting)
                    .with_resource(spec.name.as_str())
                    .with_attempt(round),
            );

            let res = match self.fleet.recreate_resource(spec).await {
                Ok(()) => self.wait_ready(spec, policy).await,
                Err(e) => Err(e.into()),
            };

            let last = match res {
                Ok(()) => {
                    self.bus.publish(
                        Event::new(EventKind::ResourceRecreated)
                            .with_resource(spec.name.as_str())
                            .with_attempt(round),
                    );
                    return Ok(round);
                }
                Err(SupervisorError::Controller(e)) => e,
                Err(other) => return Err(other),
            };

            if round >= rounds {
                return Err(SupervisorError::RecreateFailed {
                    name: spec.name.clone(),
                    attempts: round,
                    last,
                });
            }

            let delay = policy.next(round - 1);
            self.bus.publish(
                Event::new(EventKind::RecreateRetryScheduled)
                    .with_resource(spec.name.as_str())
                    .with_attempt(round)
                    .with_delay(delay)
                    .with_reason(last.to_string()),
            );
            self.pause(delay).await?;
        }
    }

    async fn pause(&self, d: Duration) -> Result<(), SupervisorError> {
        tokio::select! {
            _ = time::sleep(d) => Ok(()),
            _ = self.token.cancelled() => Err(SupervisorError::Interrupted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::InMemoryFleet;
    use crate::policies::JitterPolicy;
    use crate::resource::spec::TopologySize;
    use async_trait::async_trait;
    use tokio::sync::broadcast;

    fn spec() -> ResourceSpec {
        ResourceSpec::for_tests("wheatley", TopologySize::V64)
    }

    fn policy(attempts: u32) -> RecreatePolicy {
        RecreatePolicy {
            retry: Duration::from_secs(60),
            jitter: JitterPolicy::None,
            max_attempts: attempts,
            ..RecreatePolicy::default()
        }
    }

    fn controller(fleet: Arc<dyn FleetControl>) -> (ResourceController, broadcast::Receiver<Event>) {
        let bus = Bus::new(64);
        let rx = bus.subscribe();
        (
            ResourceController::new(fleet, bus, CancellationToken::new()),
            rx,
        )
    }

    fn kinds(rx: &mut broadcast::Receiver<Event>) -> Vec<EventKind> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev.kind);
        }
        out
    }

    /// Fleet whose resources never leave `CREATING`.
    struct StuckFleet;

    #[async_trait]
    impl FleetControl for StuckFleet {
        async fn resource_exists(&self, _: &str, _: &str) -> Result<bool, ControllerError> {
            Ok(false)
        }
        async fn create_resource(&self, _: &ResourceSpec) -> Result<(), ControllerError> {
            Ok(())
        }
        async fn delete_resource(&self, _: &str, _: &str, _: &str) -> Result<(), ControllerError> {
            Ok(())
        }
        async fn resource_state(
            &self,
            _: &str,
            _: &str,
            _: &str,
        ) -> Result<Option<ResourceState>, ControllerError> {
            Ok(Some(ResourceState::Creating))
        }
    }

    #[tokio::test]
    async fn test_ensure_existing_does_not_create() {
        let fleet = Arc::new(InMemoryFleet::new().with_resource(spec()));
        let (ctl, mut rx) = controller(fleet.clone());

        let ensured = ctl.ensure(&spec(), &policy(3)).await.unwrap();
        assert_eq!(ensured, Ensured::Existing);
        assert_eq!(fleet.calls().create, 0);
        assert_eq!(kinds(&mut rx), vec![EventKind::ResourceReady]);
    }

    #[tokio::test]
    async fn test_ensure_absent_creates_once() {
        let fleet = Arc::new(InMemoryFleet::new());
        let (ctl, mut rx) = controller(fleet.clone());

        assert_eq!(ctl.ensure(&spec(), &policy(3)).await.unwrap(), Ensured::Created);
        assert_eq!(ctl.ensure(&spec(), &policy(3)).await.unwrap(), Ensured::Existing);
        assert_eq!(fleet.calls().create, 1);
        assert_eq!(
            kinds(&mut rx),
            vec![
                EventKind::ResourceCreateRequested,
                EventKind::ResourceReady,
                EventKind::ResourceReady
            ]
        );
    }

    #[tokio::test]
    async fn test_ensure_reclaimed_existing_recreates() {
        let fleet = Arc::new(InMemoryFleet::new().with_resource(spec()));
        fleet.preempt("wheatley");
        let (ctl, mut rx) = controller(fleet.clone());

        let ensured = ctl.ensure(&spec(), &policy(3)).await.unwrap();
        assert_eq!(ensured, Ensured::Recreated { rounds: 1 });
        assert_eq!(fleet.calls().create, 0);
        assert_eq!(fleet.calls().recreate, 1);
        assert_eq!(fleet.state_of("wheatley"), Some(ResourceState::Ready));
        assert_eq!(kinds(&mut rx).last(), Some(&EventKind::ResourceRecreated));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recreate_retries_transient_failures() {
        let fleet = Arc::new(InMemoryFleet::new().with_resource(spec()));
        fleet.preempt("wheatley");
        fleet.fail_next_recreates(2);
        let (ctl, mut rx) = controller(fleet.clone());

        let started = Instant::now();
        let rounds = ctl.recreate(&spec(), &policy(5)).await.unwrap();
        assert_eq!(rounds, 3);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(120) && waited < Duration::from_secs(121));
        assert_eq!(fleet.state_of("wheatley"), Some(ResourceState::Ready));

        let kinds = kinds(&mut rx);
        let retries = kinds
            .iter()
            .filter(|k| **k == EventKind::RecreateRetryScheduled)
            .count();
        assert_eq!(retries, 2);
        assert_eq!(kinds.last(), Some(&EventKind::ResourceRecreated));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recreate_exhaustion() {
        let fleet = Arc::new(InMemoryFleet::new());
        fleet.fail_next_recreates(10);
        let (ctl, _rx) = controller(fleet.clone());

        match ctl.recreate(&spec(), &policy(3)).await {
            Err(SupervisorError::RecreateFailed { name, attempts, last }) => {
                assert_eq!(name, "wheatley");
                assert_eq!(attempts, 3);
                assert_eq!(last.as_label(), "controller_provider");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(fleet.calls().recreate, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_ready_times_out() {
        let (ctl, _rx) = controller(Arc::new(StuckFleet));
        let p = RecreatePolicy {
            ready_timeout: Duration::from_secs(30),
            ready_poll: Duration::from_secs(10),
            ..policy(1)
        };
        let err = ctl.wait_ready(&spec(), &p).await.unwrap_err();
        assert_eq!(err.as_label(), "controller_not_ready");

        // Inside recreate, a stuck round counts against the budget.
        let err = ctl.recreate(&spec(), &p).await.unwrap_err();
        assert_eq!(err.as_label(), "resource_recreate_failed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_retry_pause() {
        let fleet = Arc::new(InMemoryFleet::new());
        fleet.fail_next_recreates(10);
        let token = CancellationToken::new();
        let ctl = ResourceController::new(fleet, Bus::new(8), token.clone());

        let cancel = tokio::spawn(async move {
            time::sleep(Duration::from_secs(5)).await;
            token.cancel();
        });
        let err = ctl.recreate(&spec(), &policy(10)).await.unwrap_err();
        assert!(matches!(err, SupervisorError::Interrupted));
        cancel.await.unwrap();
    }
}
