//! Keeps a shell command alive on a preemptible TPU.
//!
//! ```text
//! TPUVISOR_PROJECT=research TPUVISOR_ZONE=europe-west4-a \
//!     cargo run --example keepalive -- 'python train.py --resume'
//! ```
//!
//! Environment:
//! - `TPUVISOR_PROJECT`, `TPUVISOR_ZONE`: required for `gcloud`, defaulted for `memory`
//! - `TPUVISOR_FLEET`: `memory` (default, simulated preemptions) or `gcloud`
//! - `TPUVISOR_CORES`: topology size, default 32
//! - `TPUVISOR_NAME`: resource name; one is picked from the pool when unset
//! - `RUST_LOG`: log filter, default `info`

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use tpuvisor::{
    CommandJob, Config, FleetControl, GcloudFleet, InMemoryFleet, JobSpec, LogWriter,
    ResourceRequest, RetryOn, Subscribe, Supervisor, SupervisorError, TopologySize,
};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let fleet_kind = std::env::var("TPUVISOR_FLEET").unwrap_or_else(|_| "memory".into());
    let simulated = fleet_kind != "gcloud";

    let mut cfg = Config::default();
    cfg.wait_interval = Duration::from_secs(if simulated { 2 } else { 60 });
    cfg.restart_after = Duration::from_secs(if simulated { 30 } else { 0 });
    cfg.retry_on = RetryOn::Any;
    match std::env::var("TPUVISOR_PROJECT") {
        Ok(p) => cfg.set_project(p),
        Err(_) if simulated => cfg.set_project("demo-project"),
        Err(_) => anyhow::bail!("TPUVISOR_PROJECT is required with the gcloud fleet"),
    }
    match std::env::var("TPUVISOR_ZONE") {
        Ok(z) => cfg.set_zone(z),
        Err(_) if simulated => cfg.set_zone("europe-west4-a"),
        Err(_) => anyhow::bail!("TPUVISOR_ZONE is required with the gcloud fleet"),
    }

    let cores: u32 = match std::env::var("TPUVISOR_CORES") {
        Ok(v) => v.parse()?,
        Err(_) => 32,
    };
    let mut request = ResourceRequest::new(TopologySize::try_from(cores)?).preemptible(true);
    if let Ok(name) = std::env::var("TPUVISOR_NAME") {
        request = request.named(name);
    }

    let memory = Arc::new(InMemoryFleet::new());
    let fleet: Arc<dyn FleetControl> = if simulated {
        memory.clone()
    } else {
        Arc::new(GcloudFleet::new())
    };

    let sup = Supervisor::builder(cfg.clone(), fleet)
        .with_subscribers(vec![Arc::new(LogWriter::new()) as Arc<dyn Subscribe>])
        .build();
    let signals = sup.spawn_signal_listener();

    let line = std::env::args()
        .nth(1)
        .unwrap_or_else(|| r#"echo "attempt $TPUVISOR_ATTEMPT on $TPU_NAME"; sleep 10"#.into());
    let job = CommandJob::shell("keepalive", line).arc();

    if simulated {
        // The provider reclaims the first two incarnations mid-run.
        let name = match request.name() {
            Some(n) => n.to_string(),
            None => sup.allocate_name(&request.project(&cfg)?.to_string()).await?,
        };
        request = request.named(name.clone());
        memory.preempt_on_poll(&name, 2);
        memory.preempt_on_poll(&name, 3);
    }

    let result = sup.run(JobSpec::with_defaults(job, &cfg), request).await;
    signals.abort();
    sup.shutdown().await;

    match result {
        Ok(report) => {
            tracing::info!(
                resource = %report.resource.name,
                attempts = report.attempts,
                recreations = report.recreations,
                "job finished"
            );
            Ok(())
        }
        Err(SupervisorError::Interrupted) => {
            tracing::info!("interrupted by signal");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
