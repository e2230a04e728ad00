//! stellar cluster agent.
//!
//! One process per node hosting the full control-plane service set behind a
//! single RPC listener. Gossip membership, the replicated datastore, the
//! event bus and the container runtime are pluggable; this binary wires the
//! local reference implementations, suitable for a single-node cluster and
//! for development against the full RPC surface.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use stellar_agent::services::application::ApplicationService;
use stellar_agent::services::cluster::ClusterService;
use stellar_agent::services::events::EventsService;
use stellar_agent::services::health::HealthService;
use stellar_agent::services::network::NetworkService;
use stellar_agent::services::proxy::ProxyService;
use stellar_agent::services::scheduler::SchedulerService;
use stellar_agent::{heartbeat::Heartbeat, Config, MockRuntime, ServiceHost};
use stellar_datastore::MemoryDatastore;
use stellar_events::MemoryBroker;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting stellar agent");

    let config = Config::from_env()?;
    info!(
        node_id = %config.node_id,
        listen_addr = %config.listen_addr,
        subnet = %config.subnet,
        peers = config.peers.len(),
        "configuration loaded"
    );

    let membership = Arc::new(config.membership());
    let datastore = Arc::new(MemoryDatastore::new());
    let broker = Arc::new(MemoryBroker::default());
    let runtime = Arc::new(MockRuntime::new());

    let mut host = ServiceHost::new(config.listen_addr);
    host.register(ClusterService::new(membership.clone()))?;
    host.register(HealthService::new())?;
    host.register(EventsService::new(broker.clone()))?;
    host.register(SchedulerService::new())?;
    host.register(NetworkService::new(config.subnet, datastore.clone()))?;
    host.register(ProxyService::new(broker.clone()))?;
    host.register(ApplicationService::new(
        membership.clone(),
        datastore,
        broker,
        runtime,
    ))?;

    let addr = host.start().await?;
    info!(addr = %addr, "agent ready");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let heartbeat = Heartbeat::new(
        membership,
        Duration::from_secs(config.heartbeat_interval_secs),
    )
    .spawn(shutdown_rx);

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    let _ = shutdown_tx.send(true);
    let _ = heartbeat.await;
    host.stop().await;

    Ok(())
}
