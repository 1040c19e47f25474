//! # Supervisor: keeps one job alive on one preemptible resource.
//!
//! The [`Supervisor`] owns the event bus, the [`SubscriberSet`], the name pool
//! and the [`ResourceController`]. Each [`run`](Supervisor::run) is one
//! supervision session.
//!
//! ## Key responsibilities
//! - subscribe to the [`Bus`] and **fan-out** events via [`SubscriberSet`]
//! - allocate a resource name when the request has none
//! - make sure the resource exists and is ready before the first attempt
//! - run attempts, watch preemption, enforce the restart deadline
//! - recreate the resource on preemption or deadline before relaunching
//! - stop everything when the runtime token is cancelled (OS signal)
//!
//! ## High-level architecture
//! ```text
//! run(JobSpec, ResourceRequest)
//!   │
//!   ├─► Idle
//!   ├─► EnsuringResource
//!   │      ├─ name given?  no ─► NameAllocator::allocate(exists)
//!   │      ├─ ResourceRequest::resolve(name, cfg) ─► ResourceSpec
//!   │      └─ ResourceController::ensure(spec)   (create if absent, wait ready)
//!   │
//!   └─► Session::drive(spec)
//!          loop {
//!            Running ─► AttemptRunner::run_attempt()
//!                          select! { deadline guard | preemption watch | token }
//!            └─► Done | HandlingTimeout | HandlingPreemption | HandlingError | Fatal
//!          }
//!
//! Event flow:
//!   Session / Runner / Controller ── publish(Event) ──► Bus ──► subscriber_listener
//!                                                                  └─► SubscriberSet::emit
//! Shutdown path:
//!   spawn_signal_listener() ─► ShutdownRequested ─► runtime_token.cancel()
//!                                                      └─► in-flight execution killed,
//!                                                          run() returns Interrupted
//!   shutdown() ─► listener forwards what is queued ─► SubscriberSet drained (≤ grace)
//! ```
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tpuvisor::{
//!     AttemptContext, Config, InMemoryFleet, JobError, JobFn, JobSpec, ResourceRequest,
//!     SessionState, Supervisor, TopologySize,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = Config::default();
//!     cfg.set_project("research");
//!     cfg.set_zone("europe-west4-a");
//!
//!     let fleet = Arc::new(InMemoryFleet::new());
//!     let sup = Supervisor::builder(cfg.clone(), fleet.clone()).build();
//!
//!     let job = JobFn::arc("train", |ctx: AttemptContext| async move {
//!         println!("training on {}", ctx.resource.name);
//!         Ok::<(), JobError>(())
//!     });
//!     let spec = JobSpec::with_defaults(job, &cfg);
//!
//!     let report = sup.run(spec, ResourceRequest::new(TopologySize::V32)).await?;
//!     assert_eq!(report.history.last(), Some(&SessionState::Done));
//!     assert_eq!(fleet.calls().create, 1);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use super::{
    alive::LivenessGauge,
    builder::SupervisorBuilder,
    runner::AttemptRunner,
    session::Session,
    shutdown,
    state::{SessionReport, SessionState},
};
use crate::{
    config::Config,
    error::{ControllerError, SupervisorError},
    events::{Bus, Event, EventKind},
    fleet::FleetControl,
    jobs::JobSpec,
    resource::{Ensured, NameAllocator, ResourceController, ResourceRequest, ResourceSpec},
    subscribers::SubscriberSet,
};

/// Keeps jobs running on preemptible resources.
pub struct Supervisor {
    cfg: Config,
    bus: Bus,
    listener: Mutex<Option<JoinHandle<()>>>,
    listener_stop: CancellationToken,
    names: Mutex<NameAllocator>,
    controller: ResourceController,
    runtime_token: CancellationToken,
    gauge: Arc<LivenessGauge>,
}

impl Supervisor {
    /// Creates a builder for the given configuration and fleet.
    pub fn builder(cfg: Config, fleet: Arc<dyn FleetControl>) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg, fleet)
    }

    pub(crate) fn new_internal(
        cfg: Config,
        bus: Bus,
        subs: SubscriberSet,
        names: NameAllocator,
        controller: ResourceController,
        runtime_token: CancellationToken,
        gauge: Arc<LivenessGauge>,
    ) -> Self {
        let listener_stop = CancellationToken::new();
        let listener = Self::subscriber_listener(&bus, subs, listener_stop.clone());
        Self {
            cfg,
            bus,
            listener: Mutex::new(Some(listener)),
            listener_stop,
            names: Mutex::new(names),
            controller,
            runtime_token,
            gauge,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Returns the event bus (subscribe to observe events directly).
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Returns the resource controller.
    pub fn controller(&self) -> &ResourceController {
        &self.controller
    }

    /// Returns the runtime token; cancelling it stops every session.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.runtime_token.clone()
    }

    /// Executions launched and not yet reaped.
    pub fn live_executions(&self) -> usize {
        self.gauge.current()
    }

    /// Highest number of simultaneously live executions so far.
    pub fn peak_live_executions(&self) -> usize {
        self.gauge.peak()
    }

    /// Adds a candidate to the name pool.
    pub async fn add_name(&self, name: impl Into<String>) {
        self.names.lock().await.add(name);
    }

    /// Picks a free name from the pool.
    pub async fn allocate_name(&self, project: &str) -> Result<String, SupervisorError> {
        let debug = self.cfg.debug_mode;
        let mut names = self.names.lock().await;

        let name = names
            .allocate(|candidate: String| {
                let controller = self.controller.clone();
                let bus = self.bus.clone();
                let project = project.to_string();
                async move {
                    let taken = controller.exists(&candidate, &project).await?;
                    if debug {
                        bus.publish(
                            Event::new(EventKind::NameProbed)
                                .with_resource(candidate)
                                .with_reason(if taken { "taken" } else { "free" }),
                        );
                    }
                    Ok::<bool, ControllerError>(taken)
                }
            })
            .await?;

        self.bus
            .publish(Event::new(EventKind::NameAllocated).with_resource(name.as_str()));
        Ok(name)
    }

    /// Resolves a request into a full spec, allocating a name if needed.
    pub async fn resolve(&self, request: &ResourceRequest) -> Result<ResourceSpec, SupervisorError> {
        // Fail on missing project/zone before probing any names.
        let project = request.project(&self.cfg)?;
        request.zone(&self.cfg)?;

        let name = match request.name() {
            Some(name) => name.to_string(),
            None => self.allocate_name(project).await?,
        };
        request.resolve(name, &self.cfg)
    }

    /// Makes sure the requested resource exists and is ready, without running anything.
    ///
    /// A resource that exists but was reclaimed is recreated.
    pub async fn provision(&self, request: &ResourceRequest) -> Result<ResourceSpec, SupervisorError> {
        self.provision_inner(request).await.map(|(spec, _)| spec)
    }

    async fn provision_inner(
        &self,
        request: &ResourceRequest,
    ) -> Result<(ResourceSpec, Ensured), SupervisorError> {
        let spec = self.resolve(request).await?;
        let ensured = self.controller.ensure(&spec, &self.cfg.recreate).await?;
        Ok((spec, ensured))
    }

    /// Deletes and recreates a resource; returns the rounds used.
    pub async fn recreate(&self, spec: &ResourceSpec) -> Result<u32, SupervisorError> {
        self.controller.recreate(spec, &self.cfg.recreate).await
    }

    /// Supervises `job` on the requested resource until it completes.
    ///
    /// Preemptions, deadlines and retryable job errors are handled internally.
    /// Returns an error only for fatal conditions: a non-retryable job error
    /// (unchanged), resource management failures, or cancellation.
    pub async fn run(
        &self,
        job: JobSpec,
        request: ResourceRequest,
    ) -> Result<SessionReport, SupervisorError> {
        let runner = AttemptRunner {
            bus: self.bus.clone(),
            controller: self.controller.clone(),
            token: self.runtime_token.clone(),
            gauge: Arc::clone(&self.gauge),
            debug: self.cfg.debug_mode,
        };
        let mut session = Session::new(job, runner, self.cfg.recreate);

        session.enter(SessionState::EnsuringResource);
        let spec = match self.provision_inner(&request).await {
            Ok((spec, Ensured::Recreated { .. })) => {
                session.count_recreation();
                spec
            }
            Ok((spec, _)) => spec,
            Err(e) => return Err(session.fail(e)),
        };
        session.drive(spec).await
    }

    /// Cancels the runtime token on the first OS termination signal.
    pub fn spawn_signal_listener(&self) -> JoinHandle<()> {
        let bus = self.bus.clone();
        let token = self.runtime_token.clone();
        tokio::spawn(async move {
            tokio::select! {
                res = shutdown::wait_for_signal() => match res {
                    Ok(signal) => {
                        bus.publish(Event::new(EventKind::ShutdownRequested).with_reason(signal));
                        token.cancel();
                    }
                    Err(e) => tracing::warn!(error = %e, "cannot install signal handlers"),
                },
                _ = token.cancelled() => {}
            }
        })
    }

    /// Stops event delivery after forwarding what was already published,
    /// then waits up to `Config::grace` for subscribers to drain their queues.
    ///
    /// Events published afterwards are not delivered to subscribers.
    pub async fn shutdown(&self) {
        self.listener_stop.cancel();
        let Some(listener) = self.listener.lock().await.take() else {
            return;
        };
        if time::timeout(self.cfg.grace, listener).await.is_err() {
            tracing::warn!(grace = ?self.cfg.grace, "subscribers not drained within grace");
        }
    }

    /// Forwards bus events to the subscriber set until `stop` is cancelled.
    fn subscriber_listener(bus: &Bus, set: SubscriberSet, stop: CancellationToken) -> JoinHandle<()> {
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    res = rx.recv() => match res {
                        Ok(ev) => set.emit(&ev),
                        Err(RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "subscriber listener lagged behind the bus");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = stop.cancelled() => {
                        loop {
                            match rx.try_recv() {
                                Ok(ev) => set.emit(&ev),
                                Err(TryRecvError::Lagged(_)) => continue,
                                Err(_) => break,
                            }
                        }
                        break;
                    }
                }
            }
            set.shutdown().await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JobError;
    use crate::fleet::{InMemoryFleet, ResourceState};
    use crate::subscribers::Subscribe;
    use async_trait::async_trait;
    use crate::jobs::{AttemptContext, JobFn, JobRef};
    use crate::policies::{JitterPolicy, RecreatePolicy, RetryOn};
    use crate::resource::TopologySize;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time;

    use crate::core::state::SessionState::*;

    fn cfg() -> Config {
        Config {
            project: Some("research".into()),
            zone: Some("europe-west4-a".into()),
            wait_interval: Duration::from_secs(60),
            restart_after: Duration::ZERO,
            recreate: RecreatePolicy {
                retry: Duration::from_secs(60),
                jitter: JitterPolicy::None,
                max_attempts: 3,
                ..RecreatePolicy::default()
            },
            ..Config::default()
        }
    }

    fn supervisor(cfg: Config, fleet: &Arc<InMemoryFleet>) -> Arc<Supervisor> {
        supervisor_on(cfg, fleet.clone())
    }

    fn supervisor_on(cfg: Config, fleet: Arc<dyn FleetControl>) -> Arc<Supervisor> {
        Supervisor::builder(cfg, fleet)
            .with_name_allocator(NameAllocator::with_seed(["chonk", "goose"], 1))
            .build()
    }

    /// Session states seen on the bus so far.
    fn states(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<SessionState> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if let Some(state) = ev.state {
                out.push(state);
            }
        }
        out
    }

    /// In-memory fleet whose preemption check always fails.
    struct FailingCheckFleet(InMemoryFleet);

    #[async_trait]
    impl FleetControl for FailingCheckFleet {
        async fn resource_exists(&self, name: &str, project: &str) -> Result<bool, ControllerError> {
            self.0.resource_exists(name, project).await
        }
        async fn create_resource(&self, spec: &ResourceSpec) -> Result<(), ControllerError> {
            self.0.create_resource(spec).await
        }
        async fn delete_resource(
            &self,
            name: &str,
            zone: &str,
            project: &str,
        ) -> Result<(), ControllerError> {
            self.0.delete_resource(name, zone, project).await
        }
        async fn resource_state(
            &self,
            name: &str,
            zone: &str,
            project: &str,
        ) -> Result<Option<ResourceState>, ControllerError> {
            self.0.resource_state(name, zone, project).await
        }
        async fn is_resource_preempted(
            &self,
            _: &str,
            _: &str,
            _: &str,
        ) -> Result<bool, ControllerError> {
            Err(ControllerError::Provider("permission denied".into()))
        }
    }

    #[derive(Default)]
    struct Recorder(std::sync::Mutex<Vec<EventKind>>);

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, ev: &Event) {
            self.0.lock().unwrap().push(ev.kind);
        }
    }

    fn request() -> ResourceRequest {
        ResourceRequest::new(TopologySize::V32).named("chonk")
    }

    /// Job that sleeps `secs[attempt - 1]` (last value repeats) and counts launches.
    fn sleeper(secs: Vec<u64>, launches: Arc<AtomicU32>) -> JobRef {
        JobFn::arc("sleeper", move |ctx: AttemptContext| {
            launches.fetch_add(1, Ordering::SeqCst);
            let idx = (ctx.attempt as usize - 1).min(secs.len() - 1);
            let d = Duration::from_secs(secs[idx]);
            async move {
                time::sleep(d).await;
                Ok::<(), JobError>(())
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success() {
        let fleet = Arc::new(InMemoryFleet::new());
        let sup = supervisor(cfg(), &fleet);
        let launches = Arc::new(AtomicU32::new(0));
        let job = JobSpec::with_defaults(sleeper(vec![30], launches.clone()), &cfg());

        let report = sup.run(job, request()).await.unwrap();
        assert_eq!(report.history, vec![Idle, EnsuringResource, Running, Done]);
        assert_eq!(report.attempts, 1);
        assert_eq!(report.recreations, 0);
        assert_eq!(fleet.calls().create, 1);
        assert_eq!(fleet.calls().recreate, 0);
        assert_eq!(launches.load(Ordering::SeqCst), 1);
        assert_eq!(sup.live_executions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_resource_is_not_created() {
        let spec = request().resolve("chonk".into(), &cfg()).unwrap();
        let fleet = Arc::new(InMemoryFleet::new().with_resource(spec));
        let sup = supervisor(cfg(), &fleet);
        let job = JobSpec::with_defaults(sleeper(vec![1], Arc::default()), &cfg());

        sup.run(job, request()).await.unwrap();
        assert_eq!(fleet.calls().create, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reclaimed_existing_resource_is_recreated_before_first_attempt() {
        let spec = request().resolve("chonk".into(), &cfg()).unwrap();
        let fleet = Arc::new(InMemoryFleet::new().with_resource(spec));
        fleet.preempt("chonk");
        let sup = supervisor(cfg(), &fleet);
        let launches = Arc::new(AtomicU32::new(0));
        let job = JobSpec::with_defaults(sleeper(vec![10], launches.clone()), &cfg());

        let report = sup.run(job, request()).await.unwrap();
        assert_eq!(report.history, vec![Idle, EnsuringResource, Running, Done]);
        assert_eq!(report.recreations, 1);
        assert_eq!(fleet.calls().create, 0);
        assert_eq!(fleet.calls().recreate, 1);
        assert_eq!(launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_preemption_on_third_poll() {
        let fleet = Arc::new(InMemoryFleet::new());
        fleet.preempt_on_poll("chonk", 3);
        let sup = supervisor(cfg(), &fleet);
        let launches = Arc::new(AtomicU32::new(0));
        // First attempt would run forever, the relaunch finishes quickly.
        let job = JobSpec::with_defaults(sleeper(vec![1_000_000, 10], launches.clone()), &cfg());
        let mut rx = sup.bus().subscribe();

        let report = sup.run(job, request()).await.unwrap();
        assert_eq!(
            report.history,
            vec![
                Idle,
                EnsuringResource,
                Running,
                HandlingPreemption,
                Running,
                Done
            ]
        );
        assert_eq!(fleet.calls().recreate, 1);
        assert_eq!(launches.load(Ordering::SeqCst), 2);
        assert_eq!(report.recreations, 1);

        let mut detected = None;
        let mut killed = 0;
        while let Ok(ev) = rx.try_recv() {
            match ev.kind {
                EventKind::PreemptionDetected => detected = ev.poll,
                EventKind::ExecutionKilled => {
                    assert_eq!(ev.resource.as_deref(), Some("chonk"));
                    killed += 1;
                }
                _ => {}
            }
        }
        assert_eq!(detected, Some(3));
        assert_eq!(killed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_deadline_takes_timeout_path() {
        let cfg = Config {
            restart_after: Duration::from_secs(9),
            ..cfg()
        };
        let fleet = Arc::new(InMemoryFleet::new());
        let sup = supervisor(cfg.clone(), &fleet);
        let launches = Arc::new(AtomicU32::new(0));
        let job = JobSpec::with_defaults(sleeper(vec![20, 5], launches.clone()), &cfg);
        let mut rx = sup.bus().subscribe();

        let report = sup.run(job, request()).await.unwrap();
        assert_eq!(
            report.history,
            vec![
                Idle,
                EnsuringResource,
                Running,
                HandlingTimeout,
                Running,
                Done
            ]
        );
        assert!(!report.history.contains(&HandlingError));
        assert_eq!(fleet.calls().recreate, 1);
        assert_eq!(launches.load(Ordering::SeqCst), 2);

        let mut deadline = false;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::DeadlineExceeded {
                assert_eq!(ev.timeout_ms, Some(9_000));
                deadline = true;
            }
            assert_ne!(ev.kind, EventKind::AttemptFailed);
        }
        assert!(deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_is_fatal_and_unchanged() {
        let cfg = Config {
            retry_on: RetryOn::Labels(vec!["job_exit"]),
            ..cfg()
        };
        let fleet = Arc::new(InMemoryFleet::new());
        let sup = supervisor(cfg.clone(), &fleet);
        let job = JobFn::arc("bad", |_ctx: AttemptContext| async {
            Err::<(), _>(JobError::Fail {
                error: "corrupt checkpoint".into(),
            })
        });

        let err = sup
            .run(JobSpec::with_defaults(job, &cfg), request())
            .await
            .unwrap_err();
        match err {
            SupervisorError::Job(JobError::Fail { error }) => assert_eq!(error, "corrupt checkpoint"),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(fleet.calls().recreate, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_job_error_ignores_retry_policy() {
        let fleet = Arc::new(InMemoryFleet::new());
        let sup = supervisor(cfg(), &fleet);
        let job = JobFn::arc("fatal", |_ctx: AttemptContext| async {
            Err::<(), _>(JobError::Fatal {
                error: "bad input".into(),
            })
        });
        let err = sup
            .run(JobSpec::with_defaults(job, &cfg()), request())
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "job_fatal");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_error_without_preemption_keeps_resource() {
        let fleet = Arc::new(InMemoryFleet::new());
        let sup = supervisor(cfg(), &fleet);
        let job = JobFn::arc("flaky", |ctx: AttemptContext| async move {
            if ctx.attempt < 3 {
                return Err(JobError::Exit { code: Some(1) });
            }
            Ok(())
        });

        let started = time::Instant::now();
        let report = sup
            .run(JobSpec::with_defaults(job, &cfg()), request())
            .await
            .unwrap();
        assert_eq!(report.attempts, 3);
        assert_eq!(report.recreations, 0);
        assert_eq!(fleet.calls().recreate, 0);
        assert_eq!(
            report.history.iter().filter(|s| **s == HandlingError).count(),
            2
        );
        // Two wait_interval pauses.
        assert!(started.elapsed() >= Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_error_on_preempted_resource_recreates() {
        let fleet = Arc::new(InMemoryFleet::new());
        let sup = supervisor(cfg(), &fleet);
        let fleet_in_job = fleet.clone();
        let job = JobFn::arc("crashes", move |ctx: AttemptContext| {
            let fleet = fleet_in_job.clone();
            async move {
                if ctx.attempt == 1 {
                    // The job notices first: the resource went away under it.
                    fleet.preempt(&ctx.resource.name);
                    return Err(JobError::Fail {
                        error: "device lost".into(),
                    });
                }
                Ok(())
            }
        });

        let report = sup
            .run(JobSpec::with_defaults(job, &cfg()), request())
            .await
            .unwrap();
        assert_eq!(
            report.history,
            vec![Idle, EnsuringResource, Running, HandlingError, Running, Done]
        );
        assert_eq!(report.recreations, 1);
        assert_eq!(fleet.calls().recreate, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_preemption_check_error_while_running_is_fatal() {
        let fleet = Arc::new(FailingCheckFleet(InMemoryFleet::new()));
        let sup = supervisor_on(cfg(), fleet);
        let launches = Arc::new(AtomicU32::new(0));
        let job = JobSpec::with_defaults(sleeper(vec![1_000_000], launches.clone()), &cfg());
        let mut rx = sup.bus().subscribe();

        let err = sup.run(job, request()).await.unwrap_err();
        match err {
            SupervisorError::Controller(ControllerError::Provider(msg)) => {
                assert_eq!(msg, "permission denied")
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(states(&mut rx), vec![Idle, EnsuringResource, Running, Fatal]);
        assert_eq!(launches.load(Ordering::SeqCst), 1);
        assert_eq!(sup.live_executions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_preemption_check_error_after_job_error_is_fatal() {
        let fleet = Arc::new(FailingCheckFleet(InMemoryFleet::new()));
        let sup = supervisor_on(cfg(), fleet);
        let job = JobFn::arc("flaky", |_ctx: AttemptContext| async {
            Err::<(), _>(JobError::Exit { code: Some(1) })
        });
        let mut rx = sup.bus().subscribe();

        let err = sup
            .run(JobSpec::with_defaults(job, &cfg()), request())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SupervisorError::Controller(ControllerError::Provider(_))
        ));
        assert_eq!(
            states(&mut rx),
            vec![Idle, EnsuringResource, Running, HandlingError, Fatal]
        );
        assert_eq!(sup.live_executions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_final_events_to_subscribers() {
        let fleet = Arc::new(InMemoryFleet::new());
        let recorder = Arc::new(Recorder::default());
        let sup = Supervisor::builder(cfg(), fleet as Arc<dyn FleetControl>)
            .with_subscribers(vec![recorder.clone() as Arc<dyn Subscribe>])
            .build();
        let job = JobSpec::with_defaults(sleeper(vec![5], Arc::default()), &cfg());

        sup.run(job, request()).await.unwrap();
        sup.shutdown().await;
        // Idempotent.
        sup.shutdown().await;

        let seen = recorder.0.lock().unwrap().clone();
        assert_eq!(seen.first(), Some(&EventKind::StateChanged));
        assert!(seen.contains(&EventKind::AttemptCompleted));
        assert_eq!(seen.last(), Some(&EventKind::SessionDone));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recreate_exhaustion_is_fatal() {
        let fleet = Arc::new(InMemoryFleet::new());
        fleet.preempt_on_poll("chonk", 1);
        fleet.fail_next_recreates(u32::MAX);
        let sup = supervisor(cfg(), &fleet);
        let job = JobSpec::with_defaults(sleeper(vec![1_000_000], Arc::default()), &cfg());

        let err = sup.run(job, request()).await.unwrap_err();
        match err {
            SupervisorError::RecreateFailed { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(sup.live_executions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_name_is_allocated_when_missing() {
        let taken = ResourceRequest::new(TopologySize::V8)
            .resolve("chonk".into(), &cfg())
            .unwrap();
        let fleet = Arc::new(InMemoryFleet::new().with_resource(taken));
        let sup = supervisor(cfg(), &fleet);

        let spec = sup
            .provision(&ResourceRequest::new(TopologySize::V8))
            .await
            .unwrap();
        assert_eq!(spec.name, "goose");
        assert!(!spec.preemptible);
        assert_eq!(fleet.calls().create, 1);

        // Only taken names (or none) are left.
        let err = sup
            .provision(&ResourceRequest::new(TopologySize::V8))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SupervisorError::EmptyPool | SupervisorError::ExhaustedPool { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_project_fails_before_probing() {
        let cfg = Config {
            project: None,
            ..cfg()
        };
        let fleet = Arc::new(InMemoryFleet::new());
        let sup = supervisor(cfg.clone(), &fleet);
        let job = JobSpec::with_defaults(sleeper(vec![1], Arc::default()), &cfg);

        let err = sup
            .run(job, ResourceRequest::new(TopologySize::V32))
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "config_invalid");
        assert_eq!(fleet.calls().exists, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_kills_and_interrupts() {
        let fleet = Arc::new(InMemoryFleet::new());
        let sup = supervisor(cfg(), &fleet);
        let job = JobSpec::with_defaults(sleeper(vec![1_000_000], Arc::default()), &cfg());

        let token = sup.cancellation_token();
        tokio::spawn(async move {
            time::sleep(Duration::from_secs(90)).await;
            token.cancel();
        });
        let err = sup.run(job, request()).await.unwrap_err();
        assert!(matches!(err, SupervisorError::Interrupted));
        assert_eq!(sup.live_executions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_more_than_one_live_execution() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..8 {
            let cfg = Config {
                restart_after: Duration::from_secs(rng.random_range(30..600)),
                wait_interval: Duration::from_secs(rng.random_range(5..60)),
                ..cfg()
            };
            let fleet = Arc::new(InMemoryFleet::new());
            for _ in 0..rng.random_range(0..4) {
                fleet.preempt_on_poll("chonk", rng.random_range(1..6));
            }
            let sup = supervisor(cfg.clone(), &fleet);

            // The last run is short, so the session always ends.
            let mut runs: Vec<u64> = (0..3).map(|_| rng.random_range(1..900)).collect();
            runs.push(1);
            let job = JobSpec::with_defaults(sleeper(runs, Arc::default()), &cfg);

            let report = sup.run(job, request()).await.unwrap();
            assert_eq!(report.history.last(), Some(&Done));
            assert_eq!(sup.peak_live_executions(), 1);
            assert_eq!(sup.live_executions(), 0);
        }
    }
}
