//! Peer heartbeat loop.
//!
//! Every tick the agent probes each peer in turn: health first, then the
//! container inventory, both logged as structured diagnostics for operators.
//! The loop changes no cluster state. A failing peer is logged and skipped;
//! nothing a peer does can stop the loop or affect the probes of the other
//! peers. Probes run sequentially within a tick, and a slow tick delays the
//! next one rather than overlapping it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::membership::MembershipOracle;
use stellar_types::Peer;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// The peer heartbeat loop.
pub struct Heartbeat {
    membership: Arc<dyn MembershipOracle>,
    interval: Duration,
}

impl Heartbeat {
    pub fn new(membership: Arc<dyn MembershipOracle>, interval: Duration) -> Self {
        Self {
            membership,
            interval,
        }
    }

    /// Run until `shutdown` flips to true.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "starting heartbeat loop"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => self.tick().await,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("heartbeat loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn tick(&self) {
        for peer in self.membership.peers() {
            if let Err(e) = probe_peer(&peer).await {
                warn!(peer = %peer.id, error = %e, "peer probe failed");
            }
        }
    }
}

/// Probe one peer with a fresh client scoped to this probe.
async fn probe_peer(peer: &Peer) -> anyhow::Result<()> {
    let client = Client::with_timeout(&peer.address, PROBE_TIMEOUT)?;

    let health = client.health().await?;
    debug!(
        peer = %peer.id,
        os_name = %health.os_name,
        os_version = %health.os_version,
        uptime = health.uptime,
        cpus = health.cpus,
        memory_total = health.memory_total,
        memory_free = health.memory_free,
        memory_used = health.memory_used,
        "peer health"
    );

    let containers = client.containers().await?;
    let ids: Vec<&str> = containers.iter().map(|c| c.id.as_str()).collect();
    debug!(
        peer = %peer.id,
        containers = %ids.join(", "),
        "peer containers"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::StaticMembership;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_tick_survives_unreachable_peers() {
        let dead = |id: &str| Peer {
            id: id.to_string(),
            address: "127.0.0.1:1".to_string(),
            labels: BTreeMap::new(),
        };
        let membership = Arc::new(StaticMembership::new(
            dead("node-00"),
            vec![dead("node-01"), dead("node-02")],
        ));

        // Both probes fail; the tick itself must not.
        let heartbeat = Heartbeat::new(membership, Duration::from_secs(10));
        heartbeat.tick().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop() {
        let membership = Arc::new(StaticMembership::new(
            Peer {
                id: "node-00".to_string(),
                address: "127.0.0.1:1".to_string(),
                labels: BTreeMap::new(),
            },
            Vec::new(),
        ));

        let (tx, rx) = watch::channel(false);
        let handle = Heartbeat::new(membership, Duration::from_secs(60)).spawn(rx);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop should stop promptly")
            .unwrap();
    }
}
