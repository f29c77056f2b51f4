use anyhow::Context as _;
use lease::{
    bus::LocalBus,
    message::LeaseRoutes,
    time::Clock,
    with_lease, Context, LeaseConfig, LeaseService, LeaseStore, RemoteLeaseClient, TenantId,
};
use std::{env, sync::Arc, time::Duration};
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_WORKERS: usize = 4;
const DEFAULT_KEY: &str = "demo-job";
const DEMO_TTL: Duration = Duration::from_millis(600);
const DEMO_WORK: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = LeaseConfig::from_env().context("invalid lease configuration")?;
    let workers = match env::var("LEASE_DEMO_WORKERS") {
        Ok(value) => value
            .parse::<usize>()
            .with_context(|| format!("LEASE_DEMO_WORKERS must be a count, got {value:?}"))?,
        Err(_) => DEFAULT_WORKERS,
    };
    let key = env::var("LEASE_DEMO_KEY").unwrap_or_else(|_| DEFAULT_KEY.to_string());

    info!("Lease host starting...");
    info!(?config, workers, key = %key, "configuration loaded");

    let clock = Arc::new(Clock::new());
    let routes = LeaseRoutes::default();
    let bus = Arc::new(LocalBus::new());

    let store = Arc::new(LeaseStore::new(Arc::clone(&clock), config));
    LeaseService::new(Arc::clone(&store), routes.clone()).start(bus.as_ref())?;
    let client = Arc::new(RemoteLeaseClient::new(bus.clone(), routes, clock, &config));

    let root = Context::new().with_tenant(TenantId::new());
    let shutdown = root.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            shutdown.cancel();
        }
    });

    // Enough attempts for every worker to get a turn
    let max_attempts = u32::try_from(workers.saturating_mul(4)).unwrap_or(u32::MAX).max(1);

    let mut tasks = JoinSet::new();
    for worker in 0..workers {
        let ctx = root.child();
        let client = Arc::clone(&client);
        let key = key.clone();
        tasks.spawn(async move {
            let result: lease::Result<()> = with_lease(&ctx, client.as_ref(), &key, DEMO_TTL, max_attempts, move |work_ctx| async move {
                info!(worker, "holding lease, working");
                tokio::select! {
                    () = work_ctx.cancelled() => Err(lease::Error::Canceled),
                    () = tokio::time::sleep(DEMO_WORK) => Ok(()),
                }
            })
            .await;
            (worker, result)
        });
    }

    let mut failed = 0usize;
    while let Some(joined) = tasks.join_next().await {
        let (worker, result) = joined?;
        match result {
            Ok(()) => info!(worker, "worker finished"),
            Err(err) => {
                failed += 1;
                warn!(worker, error = %err, "worker failed");
            }
        }
    }

    bus.close();
    info!(workers, failed, active = store.active_count(), "Lease host stopped");
    Ok(())
}
