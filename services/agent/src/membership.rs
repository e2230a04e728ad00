//! Cluster membership as consumed by the agent.
//!
//! Gossip transport and failure detection live outside this crate; the
//! services only ever ask "who am I" and "who else is alive right now".
//! Answers may be stale, and peers disappear without notice when gossip
//! declares them dead.

use stellar_types::Peer;

/// The membership view the agent consumes.
pub trait MembershipOracle: Send + Sync {
    /// This node's own identity and advertised address.
    fn self_peer(&self) -> Peer;

    /// All other live cluster members. Excludes self; may be stale.
    fn peers(&self) -> Vec<Peer>;
}

/// A fixed membership view seeded from configuration.
///
/// Stands in for the gossip adapter in single-node deployments and tests.
#[derive(Debug, Clone)]
pub struct StaticMembership {
    self_peer: Peer,
    peers: Vec<Peer>,
}

impl StaticMembership {
    pub fn new(self_peer: Peer, peers: Vec<Peer>) -> Self {
        Self { self_peer, peers }
    }
}

impl MembershipOracle for StaticMembership {
    fn self_peer(&self) -> Peer {
        self.self_peer.clone()
    }

    fn peers(&self) -> Vec<Peer> {
        self.peers.clone()
    }
}
