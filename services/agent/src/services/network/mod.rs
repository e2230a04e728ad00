//! Cluster network service: per-node subnet assignment.

mod subnet;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::Path,
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use stellar_datastore::Datastore;
use stellar_types::Cidr;

use crate::api::ApiError;
use crate::host::{Service, ServiceType};

pub use subnet::{NetworkError, SubnetAllocator, SubnetLease, NETWORK_BUCKET, SUBNET_MASK_BITS};

const SERVICE_ID: &str = "stellar.services.network.v1";

#[derive(Debug, Serialize, Deserialize)]
pub struct Subnet {
    pub cidr: String,
    pub gateway: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubnetsResponse {
    pub subnets: Vec<Subnet>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AllocateSubnetRequest {
    pub node: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AllocateSubnetResponse {
    pub subnet_cidr: String,
    pub node: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetSubnetResponse {
    pub subnet_cidr: String,
}

/// The network RPC service.
pub struct NetworkService {
    allocator: Arc<SubnetAllocator>,
}

impl NetworkService {
    pub fn new(cluster_cidr: Cidr, datastore: Arc<dyn Datastore>) -> Arc<Self> {
        Arc::new(Self {
            allocator: Arc::new(SubnetAllocator::new(cluster_cidr, datastore)),
        })
    }
}

#[async_trait]
impl Service for NetworkService {
    fn id(&self) -> &'static str {
        SERVICE_ID
    }

    fn service_type(&self) -> ServiceType {
        ServiceType::Network
    }

    fn requires(&self) -> Vec<ServiceType> {
        vec![ServiceType::Cluster]
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/v1/network/subnets", get(list_subnets))
            .route("/v1/network/subnets/allocate", post(allocate_subnet))
            .route(
                "/v1/network/subnets/{node}",
                get(get_subnet).delete(deallocate_subnet),
            )
            .with_state(self.allocator.clone())
    }
}

impl From<NetworkError> for ApiError {
    fn from(err: NetworkError) -> Self {
        ApiError::new(err.kind(), err.to_string())
    }
}

async fn list_subnets(
    State(allocator): State<Arc<SubnetAllocator>>,
) -> Result<Json<SubnetsResponse>, ApiError> {
    let subnets = allocator
        .subnets()?
        .into_iter()
        .map(|lease| Subnet {
            cidr: lease.cidr.to_string(),
            gateway: lease.gateway.to_string(),
        })
        .collect();
    Ok(Json(SubnetsResponse { subnets }))
}

async fn allocate_subnet(
    State(allocator): State<Arc<SubnetAllocator>>,
    Json(req): Json<AllocateSubnetRequest>,
) -> Result<Json<AllocateSubnetResponse>, ApiError> {
    let subnet = allocator.allocate_subnet(&req.node).await?;
    Ok(Json(AllocateSubnetResponse {
        subnet_cidr: subnet.to_string(),
        node: req.node,
    }))
}

async fn get_subnet(
    State(allocator): State<Arc<SubnetAllocator>>,
    Path(node): Path<String>,
) -> Result<Json<GetSubnetResponse>, ApiError> {
    let subnet = allocator.get_subnet(&node).await?;
    Ok(Json(GetSubnetResponse {
        subnet_cidr: subnet.to_string(),
    }))
}

async fn deallocate_subnet(
    State(allocator): State<Arc<SubnetAllocator>>,
    Path(node): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    allocator.deallocate_subnet(&node).await?;
    Ok(Json(serde_json::json!({})))
}
