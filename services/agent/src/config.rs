//! Agent configuration, loaded once from the environment.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use anyhow::{bail, Context, Result};
use stellar_types::{Cidr, Peer};

use crate::membership::StaticMembership;

#[derive(Debug, Clone)]
pub struct Config {
    /// This node's identifier within the cluster.
    pub node_id: String,

    /// Address the RPC server binds.
    pub listen_addr: SocketAddr,

    /// Address other nodes dial to reach this one.
    pub advertise_addr: String,

    /// Container runtime endpoint.
    pub containerd_addr: String,

    /// Container runtime namespace.
    pub namespace: String,

    /// Local state directory.
    pub data_dir: String,

    /// Cluster network from which per-node subnets are carved.
    pub subnet: Cidr,

    /// Seconds between peer heartbeat probes.
    pub heartbeat_interval_secs: u64,

    /// Labels this node advertises for scheduling.
    pub node_labels: BTreeMap<String, String>,

    /// Seed peers as `id@host:port`.
    pub peers: Vec<Peer>,

    /// Optional TLS material, forwarded to the transport layer when set.
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let node_id = std::env::var("STELLAR_NODE_ID")
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_else(|_| "stellar-node".to_string());

        let listen_addr = std::env::var("STELLAR_LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:9000".to_string())
            .parse()
            .context("invalid STELLAR_LISTEN_ADDR")?;

        let advertise_addr =
            std::env::var("STELLAR_ADVERTISE_ADDR").unwrap_or_else(|_| "127.0.0.1:9000".to_string());

        let containerd_addr = std::env::var("STELLAR_CONTAINERD_ADDR")
            .unwrap_or_else(|_| "/run/containerd/containerd.sock".to_string());

        let namespace = std::env::var("STELLAR_NAMESPACE").unwrap_or_else(|_| "default".to_string());

        let data_dir =
            std::env::var("STELLAR_DATA_DIR").unwrap_or_else(|_| "/var/lib/stellar".to_string());

        let subnet = std::env::var("STELLAR_SUBNET")
            .unwrap_or_else(|_| "10.0.0.0/16".to_string())
            .parse()
            .context("invalid STELLAR_SUBNET")?;

        let heartbeat_interval_secs = std::env::var("STELLAR_HEARTBEAT_INTERVAL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let node_labels = parse_labels(
            &std::env::var("STELLAR_NODE_LABELS").unwrap_or_default(),
        )?;

        let peers = parse_peers(&std::env::var("STELLAR_PEERS").unwrap_or_default())?;

        let tls_cert = std::env::var("STELLAR_TLS_CERT").ok();
        let tls_key = std::env::var("STELLAR_TLS_KEY").ok();

        Ok(Self {
            node_id,
            listen_addr,
            advertise_addr,
            containerd_addr,
            namespace,
            data_dir,
            subnet,
            heartbeat_interval_secs,
            node_labels,
            peers,
            tls_cert,
            tls_key,
        })
    }

    /// This node's own membership record.
    pub fn self_peer(&self) -> Peer {
        Peer {
            id: self.node_id.clone(),
            address: self.advertise_addr.clone(),
            labels: self.node_labels.clone(),
        }
    }

    /// A membership view seeded from the configured peer list.
    pub fn membership(&self) -> StaticMembership {
        StaticMembership::new(self.self_peer(), self.peers.clone())
    }
}

/// Parse `key=value,key=value` label lists.
fn parse_labels(raw: &str) -> Result<BTreeMap<String, String>> {
    let mut labels = BTreeMap::new();
    for part in raw.split(',').filter(|p| !p.trim().is_empty()) {
        let Some((k, v)) = part.split_once('=') else {
            bail!("invalid label {part:?}; expected key=value");
        };
        labels.insert(k.trim().to_string(), v.trim().to_string());
    }
    Ok(labels)
}

/// Parse `id@host:port,id@host:port` seed peer lists.
fn parse_peers(raw: &str) -> Result<Vec<Peer>> {
    let mut peers = Vec::new();
    for part in raw.split(',').filter(|p| !p.trim().is_empty()) {
        let Some((id, address)) = part.trim().split_once('@') else {
            bail!("invalid peer {part:?}; expected id@host:port");
        };
        peers.push(Peer {
            id: id.to_string(),
            address: address.to_string(),
            labels: BTreeMap::new(),
        });
    }
    Ok(peers)
}
