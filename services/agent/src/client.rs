//! Typed RPC client for a single node.
//!
//! Clients are cheap and short-lived: callers build one per logical
//! operation against one peer address and drop it when the operation ends.
//! No connection outlives the operation, so gossip churn never leaves a
//! caller holding a connection to a node that moved.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use stellar_events::Envelope;
use stellar_types::{App, ErrorKind, Node, ServiceSpec};
use thiserror::Error;

use crate::api::ErrorBody;
use crate::runtime::Container;
use crate::services::application::{
    AppResponse, AppsResponse, ContainerResponse, ContainersResponse, CreateContainerRequest,
    DeployResponse,
};
use crate::services::cluster::{NodeResponse, NodesResponse};
use crate::services::health::HealthResponse;
use crate::services::network::{
    AllocateSubnetRequest, AllocateSubnetResponse, GetSubnetResponse, Subnet, SubnetsResponse,
};
use crate::services::proxy::ProxyInfoResponse;
use crate::services::scheduler::{ScheduleRequest, ScheduleResponse};

/// Errors from RPC calls.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The peer address could not be turned into a URL.
    #[error("invalid peer address: {0}")]
    Address(String),

    /// The peer answered with a structured error.
    #[error("{kind}: {message}")]
    Api { kind: ErrorKind, message: String },

    /// The peer could not be reached or the response was not understood.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ClientError {
    /// The structural kind for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Address(_) => ErrorKind::InvalidArgument,
            ClientError::Api { kind, .. } => *kind,
            ClientError::Transport(_) => ErrorKind::Unavailable,
        }
    }
}

fn kind_for_status(status: reqwest::StatusCode) -> ErrorKind {
    match status.as_u16() {
        404 => ErrorKind::NotFound,
        400 => ErrorKind::InvalidArgument,
        429 => ErrorKind::Exhausted,
        500 => ErrorKind::Internal,
        _ => ErrorKind::Unavailable,
    }
}

/// A client for one node's RPC endpoint.
pub struct Client {
    base: String,
    http: reqwest::Client,
}

impl Client {
    /// Connect to a peer by its `host:port` address. No implicit deadline is
    /// applied; use [`Client::with_timeout`] when the caller wants one.
    pub fn new(address: &str) -> Result<Self, ClientError> {
        Self::build(address, None)
    }

    /// Like [`Client::new`], with a per-request timeout.
    pub fn with_timeout(address: &str, timeout: Duration) -> Result<Self, ClientError> {
        Self::build(address, Some(timeout))
    }

    fn build(address: &str, timeout: Option<Duration>) -> Result<Self, ClientError> {
        if address.is_empty() {
            return Err(ClientError::Address(address.to_string()));
        }
        let base = if address.starts_with("http://") || address.starts_with("https://") {
            address.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", address)
        };

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        Ok(Self { base, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }

        match resp.json::<ErrorBody>().await {
            Ok(body) => Err(ClientError::Api {
                kind: body.kind,
                message: body.message,
            }),
            Err(_) => Err(ClientError::Api {
                kind: kind_for_status(status),
                message: format!("unexpected status {status}"),
            }),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        Self::decode(self.http.get(self.url(path)).send().await?).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        Self::decode(self.http.post(self.url(path)).json(body).send().await?).await
    }

    async fn delete_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        Self::decode(self.http.delete(self.url(path)).send().await?).await
    }

    // Health

    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        self.get_json("/v1/health").await
    }

    // Cluster

    pub async fn nodes(&self) -> Result<Vec<Node>, ClientError> {
        let resp: NodesResponse = self.get_json("/v1/cluster/nodes").await?;
        Ok(resp.nodes)
    }

    pub async fn node(&self, id: &str) -> Result<Node, ClientError> {
        let resp: NodeResponse = self.get_json(&format!("/v1/cluster/nodes/{id}")).await?;
        Ok(resp.node)
    }

    // Scheduler

    pub async fn schedule(
        &self,
        service: &ServiceSpec,
        available_nodes: &[Node],
    ) -> Result<Vec<Node>, ClientError> {
        let resp: ScheduleResponse = self
            .post_json(
                "/v1/scheduler/schedule",
                &ScheduleRequest {
                    service: service.clone(),
                    available_nodes: available_nodes.to_vec(),
                },
            )
            .await?;
        Ok(resp.nodes)
    }

    // Network

    pub async fn subnets(&self) -> Result<Vec<Subnet>, ClientError> {
        let resp: SubnetsResponse = self.get_json("/v1/network/subnets").await?;
        Ok(resp.subnets)
    }

    pub async fn allocate_subnet(&self, node: &str) -> Result<AllocateSubnetResponse, ClientError> {
        self.post_json(
            "/v1/network/subnets/allocate",
            &AllocateSubnetRequest {
                node: node.to_string(),
            },
        )
        .await
    }

    pub async fn get_subnet(&self, node: &str) -> Result<String, ClientError> {
        let resp: GetSubnetResponse = self.get_json(&format!("/v1/network/subnets/{node}")).await?;
        Ok(resp.subnet_cidr)
    }

    pub async fn deallocate_subnet(&self, node: &str) -> Result<(), ClientError> {
        let _: serde_json::Value = self
            .delete_json(&format!("/v1/network/subnets/{node}"))
            .await?;
        Ok(())
    }

    // Application

    pub async fn create_app(&self, app: &App) -> Result<DeployResponse, ClientError> {
        self.post_json("/v1/application", app).await
    }

    pub async fn apps(&self) -> Result<Vec<App>, ClientError> {
        let resp: AppsResponse = self.get_json("/v1/application").await?;
        Ok(resp.apps)
    }

    pub async fn app(&self, name: &str) -> Result<App, ClientError> {
        let resp: AppResponse = self.get_json(&format!("/v1/application/{name}")).await?;
        Ok(resp.app)
    }

    pub async fn delete_app(&self, name: &str) -> Result<(), ClientError> {
        let _: serde_json::Value = self.delete_json(&format!("/v1/application/{name}")).await?;
        Ok(())
    }

    // Containers (local runtime of the dialed node)

    pub async fn containers(&self) -> Result<Vec<Container>, ClientError> {
        let resp: ContainersResponse = self.get_json("/v1/containers").await?;
        Ok(resp.containers)
    }

    pub async fn create_container(
        &self,
        req: &CreateContainerRequest,
    ) -> Result<Container, ClientError> {
        let resp: ContainerResponse = self.post_json("/v1/containers", req).await?;
        Ok(resp.container)
    }

    pub async fn remove_container(&self, id: &str) -> Result<(), ClientError> {
        let _: serde_json::Value = self.delete_json(&format!("/v1/containers/{id}")).await?;
        Ok(())
    }

    // Proxy

    pub async fn proxy_reload(&self) -> Result<(), ClientError> {
        let _: serde_json::Value = self.post_json("/v1/proxy/reload", &()).await?;
        Ok(())
    }

    pub async fn proxy_info(&self) -> Result<ProxyInfoResponse, ClientError> {
        self.get_json("/v1/proxy/info").await
    }

    // Events

    pub async fn publish(&self, envelope: &Envelope) -> Result<(), ClientError> {
        let _: serde_json::Value = self.post_json("/v1/events/publish", envelope).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_forms() {
        assert!(Client::new("").is_err());
        let client = Client::new("127.0.0.1:9000").unwrap();
        assert_eq!(client.base, "http://127.0.0.1:9000");
        let client = Client::new("http://127.0.0.1:9000/").unwrap();
        assert_eq!(client.base, "http://127.0.0.1:9000");
    }

    #[test]
    fn test_kind_for_status() {
        use reqwest::StatusCode;
        assert_eq!(kind_for_status(StatusCode::NOT_FOUND), ErrorKind::NotFound);
        assert_eq!(
            kind_for_status(StatusCode::BAD_REQUEST),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            kind_for_status(StatusCode::TOO_MANY_REQUESTS),
            ErrorKind::Exhausted
        );
        assert_eq!(
            kind_for_status(StatusCode::BAD_GATEWAY),
            ErrorKind::Unavailable
        );
    }
}
