//! Node and peer identities as observed through cluster membership.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A cluster member as reported by the membership layer.
///
/// Labels ride on the gossip metadata for the peer, so every observer sees
/// the same label set the peer advertised when it joined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// Opaque identifier, unique within the cluster.
    pub id: String,

    /// RPC address in `host:port` form.
    pub address: String,

    /// Scheduling labels advertised by the peer.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// A node in the cluster, the unit of placement.
///
/// Nodes are snapshots: immutable within a single membership observation and
/// replaced wholesale when gossip reports a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Opaque identifier, unique within the cluster.
    pub id: String,

    /// RPC address in `host:port` form.
    pub address: String,

    /// Scheduling labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl From<Peer> for Node {
    fn from(peer: Peer) -> Self {
        Self {
            id: peer.id,
            address: peer.address,
            labels: peer.labels,
        }
    }
}

impl Node {
    /// True if the node carries every given label with an equal value.
    pub fn matches_labels(&self, labels: &BTreeMap<String, String>) -> bool {
        labels
            .iter()
            .all(|(k, v)| self.labels.get(k).is_some_and(|have| have == v))
    }
}
