//! Per-node subnet allocation over the replicated datastore.

use std::sync::Arc;

use stellar_datastore::{Datastore, StoreError};
use stellar_types::{Cidr, CidrError, ErrorKind};
use thiserror::Error;
use tracing::{debug, warn};

/// Additional prefix bits carving the cluster network into per-node subnets.
/// A /16 cluster network yields 256 /24 node subnets.
pub const SUBNET_MASK_BITS: u8 = 8;

/// Datastore bucket holding network state.
pub const NETWORK_BUCKET: &str = "stellar.v1.services.network";

const SUBNETS_PREFIX: &str = "subnets.";

fn subnet_key(node: &str) -> String {
    format!("{}{}", SUBNETS_PREFIX, node)
}

/// Errors from subnet allocation.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("no available subnets in network configuration")]
    NoAvailableSubnets,

    #[error("subnet not found")]
    SubnetNotFound,

    #[error("no available subnet for node {node}; {assigned} of {capacity} subnets assigned")]
    SubnetsExhausted {
        node: String,
        assigned: usize,
        capacity: usize,
    },

    #[error("stored subnet is not a valid CIDR: {0}")]
    StoredSubnet(String),

    #[error(transparent)]
    Cidr(#[from] CidrError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl NetworkError {
    /// The structural kind for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            NetworkError::NoAvailableSubnets | NetworkError::SubnetsExhausted { .. } => {
                ErrorKind::Exhausted
            }
            NetworkError::SubnetNotFound => ErrorKind::NotFound,
            NetworkError::StoredSubnet(_) | NetworkError::Cidr(_) => ErrorKind::InvalidArgument,
            NetworkError::Store(e) => e.kind(),
        }
    }
}

/// A candidate subnet with its gateway address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetLease {
    pub cidr: Cidr,
    pub gateway: std::net::Ipv4Addr,
}

/// Assigns each node a subnet of the cluster network.
///
/// The allocator keeps no in-process state: the datastore is the single
/// source of truth and assignments survive restarts. Selection is
/// next-by-count: a new node takes the candidate at the index equal to the
/// number of existing assignments. Two nodes allocating at the same moment
/// can both observe the same count and collide on one candidate; the window
/// is bounded by datastore convergence and allocation happens once per node
/// lifetime, so no guard is taken here yet. A compare-and-set on the
/// `subnets.<node>` key is the intended refinement once the datastore
/// supports it.
pub struct SubnetAllocator {
    cluster_cidr: Cidr,
    datastore: Arc<dyn Datastore>,
}

impl SubnetAllocator {
    pub fn new(cluster_cidr: Cidr, datastore: Arc<dyn Datastore>) -> Self {
        Self {
            cluster_cidr,
            datastore,
        }
    }

    /// All candidate subnets of the cluster network, in address order, each
    /// with its gateway. Pure function of configuration.
    pub fn subnets(&self) -> Result<Vec<SubnetLease>, NetworkError> {
        let subnets = self.cluster_cidr.divide(SUBNET_MASK_BITS)?;
        Ok(subnets
            .into_iter()
            .map(|cidr| SubnetLease {
                gateway: cidr.gateway(),
                cidr,
            })
            .collect())
    }

    /// Assign a subnet to `node`, or return its existing assignment.
    pub async fn allocate_subnet(&self, node: &str) -> Result<Cidr, NetworkError> {
        let candidates = self.subnets()?;
        if candidates.is_empty() {
            return Err(NetworkError::NoAvailableSubnets);
        }

        let key = subnet_key(node);
        let mut current = match self.datastore.get(NETWORK_BUCKET, &key).await {
            Ok(bytes) => Some(parse_stored_subnet(&bytes)?),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };

        // A stored subnet from a previous cluster network is stale; widen it
        // back to its parent and compare against the configured network.
        if let Some(stored) = current {
            let stored_cluster = stored.parent(SUBNET_MASK_BITS)?;
            if stored_cluster != self.cluster_cidr {
                warn!(
                    node,
                    cluster_subnet = %stored_cluster,
                    config_subnet = %self.cluster_cidr,
                    "cluster network configuration changed; reassigning subnet"
                );
                current = None;
            }
        }

        let subnet = match current {
            Some(subnet) => subnet,
            None => {
                debug!(node, "no subnet assigned; selecting next candidate");

                let existing = self.datastore.search(NETWORK_BUCKET, SUBNETS_PREFIX).await?;
                let assigned = existing.len();
                if assigned >= candidates.len() {
                    return Err(NetworkError::SubnetsExhausted {
                        node: node.to_string(),
                        assigned,
                        capacity: candidates.len(),
                    });
                }

                let subnet = candidates[assigned].cidr;
                self.datastore
                    .set(
                        NETWORK_BUCKET,
                        &key,
                        subnet.to_string().into_bytes(),
                        true,
                    )
                    .await?;

                debug!(node, subnet = %subnet, "assigned subnet");
                subnet
            }
        };

        Ok(subnet)
    }

    /// The subnet assigned to `node`.
    pub async fn get_subnet(&self, node: &str) -> Result<Cidr, NetworkError> {
        let key = subnet_key(node);
        match self.datastore.get(NETWORK_BUCKET, &key).await {
            Ok(bytes) => parse_stored_subnet(&bytes),
            Err(e) if e.is_not_found() => Err(NetworkError::SubnetNotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Release the subnet assigned to `node`, best-effort.
    ///
    /// Removes the datastore record; withdrawing the gateway alias and peer
    /// routes belongs to the network fabric and is not done here.
    pub async fn deallocate_subnet(&self, node: &str) -> Result<(), NetworkError> {
        let key = subnet_key(node);
        match self.datastore.delete(NETWORK_BUCKET, &key).await {
            Ok(()) => {
                debug!(node, "released subnet assignment");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn parse_stored_subnet(bytes: &[u8]) -> Result<Cidr, NetworkError> {
    let s = std::str::from_utf8(bytes)
        .map_err(|_| NetworkError::StoredSubnet("not utf-8".to_string()))?;
    s.parse()
        .map_err(|_| NetworkError::StoredSubnet(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stellar_datastore::MemoryDatastore;

    fn allocator(cidr: &str) -> SubnetAllocator {
        SubnetAllocator::new(cidr.parse().unwrap(), Arc::new(MemoryDatastore::new()))
    }

    #[test]
    fn test_subnets_division() {
        let allocator = allocator("10.0.0.0/16");
        let subnets = allocator.subnets().unwrap();

        assert_eq!(subnets.len(), 256);
        assert_eq!(subnets[0].cidr.to_string(), "10.0.0.0/24");
        assert_eq!(subnets[0].gateway.to_string(), "10.0.0.1");
        assert_eq!(subnets[42].cidr.to_string(), "10.0.42.0/24");
        assert_eq!(subnets[42].gateway.to_string(), "10.0.42.1");
    }

    #[tokio::test]
    async fn test_allocate_is_idempotent() {
        let allocator = allocator("10.0.0.0/16");

        let first = allocator.allocate_subnet("node-00").await.unwrap();
        assert_eq!(first.to_string(), "10.0.0.0/24");

        let again = allocator.allocate_subnet("node-00").await.unwrap();
        assert_eq!(again, first);

        let second = allocator.allocate_subnet("node-01").await.unwrap();
        assert_eq!(second.to_string(), "10.0.1.0/24");
    }

    #[tokio::test]
    async fn test_allocate_survives_allocator_restart() {
        let datastore = Arc::new(MemoryDatastore::new());
        let cidr: Cidr = "10.0.0.0/16".parse().unwrap();

        let first = SubnetAllocator::new(cidr, datastore.clone())
            .allocate_subnet("node-00")
            .await
            .unwrap();

        let fresh = SubnetAllocator::new(cidr, datastore);
        assert_eq!(fresh.allocate_subnet("node-00").await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_allocate_reassigns_after_config_change() {
        let datastore = Arc::new(MemoryDatastore::new());

        let old = SubnetAllocator::new("10.0.0.0/16".parse().unwrap(), datastore.clone());
        let stored = old.allocate_subnet("node-00").await.unwrap();
        assert_eq!(stored.to_string(), "10.0.0.0/24");

        let new = SubnetAllocator::new("192.168.0.0/16".parse().unwrap(), datastore);
        let reassigned = new.allocate_subnet("node-00").await.unwrap();
        let cluster: Cidr = "192.168.0.0/16".parse().unwrap();
        assert!(cluster.contains(&reassigned));
    }

    #[tokio::test]
    async fn test_allocate_exhaustion() {
        // A /24 divided by eight more bits yields 256 /32 candidates.
        let datastore = Arc::new(MemoryDatastore::new());
        let cidr: Cidr = "10.0.0.0/24".parse().unwrap();
        let allocator = SubnetAllocator::new(cidr, datastore);

        for i in 0..256 {
            allocator
                .allocate_subnet(&format!("node-{i:03}"))
                .await
                .unwrap();
        }

        let err = allocator.allocate_subnet("node-256").await.unwrap_err();
        assert!(matches!(err, NetworkError::SubnetsExhausted { .. }));
        assert_eq!(err.kind(), ErrorKind::Exhausted);
    }

    #[tokio::test]
    async fn test_get_subnet_not_found() {
        let allocator = allocator("10.0.0.0/16");
        let err = allocator.get_subnet("node-00").await.unwrap_err();
        assert!(matches!(err, NetworkError::SubnetNotFound));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_deallocate_then_get() {
        let allocator = allocator("10.0.0.0/16");
        allocator.allocate_subnet("node-00").await.unwrap();

        allocator.deallocate_subnet("node-00").await.unwrap();
        assert!(allocator.get_subnet("node-00").await.is_err());

        // Releasing twice is fine.
        allocator.deallocate_subnet("node-00").await.unwrap();
    }
}
