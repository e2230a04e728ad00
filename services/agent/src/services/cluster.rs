//! Cluster service: the membership view over RPC.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use stellar_types::Node;

use crate::api::ApiError;
use crate::host::{Service, ServiceType};
use crate::membership::MembershipOracle;

const SERVICE_ID: &str = "stellar.services.cluster.v1";

#[derive(Debug, Serialize, Deserialize)]
pub struct NodesResponse {
    pub nodes: Vec<Node>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeResponse {
    pub node: Node,
}

/// The cluster RPC service. A thin view over the membership oracle: self
/// first, then every live peer.
pub struct ClusterService {
    membership: Arc<dyn MembershipOracle>,
}

impl ClusterService {
    pub fn new(membership: Arc<dyn MembershipOracle>) -> Arc<Self> {
        Arc::new(Self { membership })
    }

    /// The current cluster membership snapshot as nodes.
    pub fn nodes(&self) -> Vec<Node> {
        let mut nodes = vec![Node::from(self.membership.self_peer())];
        nodes.extend(self.membership.peers().into_iter().map(Node::from));
        nodes
    }
}

#[async_trait]
impl Service for ClusterService {
    fn id(&self) -> &'static str {
        SERVICE_ID
    }

    fn service_type(&self) -> ServiceType {
        ServiceType::Cluster
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/v1/cluster/nodes", get(list_nodes))
            .route("/v1/cluster/nodes/{id}", get(get_node))
            .with_state(self.membership.clone())
    }
}

async fn list_nodes(State(membership): State<Arc<dyn MembershipOracle>>) -> Json<NodesResponse> {
    let mut nodes = vec![Node::from(membership.self_peer())];
    nodes.extend(membership.peers().into_iter().map(Node::from));
    Json(NodesResponse { nodes })
}

async fn get_node(
    State(membership): State<Arc<dyn MembershipOracle>>,
    Path(id): Path<String>,
) -> Result<Json<NodeResponse>, ApiError> {
    let node = std::iter::once(membership.self_peer())
        .chain(membership.peers())
        .find(|p| p.id == id)
        .map(Node::from)
        .ok_or_else(|| ApiError::not_found(format!("node {id} not in cluster")))?;
    Ok(Json(NodeResponse { node }))
}
