//! Application service: translates submitted application specs into
//! placements and runtime calls.
//!
//! The controller owns no runtime state. The datastore holds the submitted
//! specs, the runtime driver on each node owns its containers, and a failed
//! placement is repaired by re-submitting the application. Per-target
//! failures never roll back placements that already succeeded.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use stellar_datastore::Datastore;
use stellar_events::{marshal_event, subjects, ApplicationUpdatedPayload, Event, EventBroker};
use stellar_types::{App, Node, ServiceSpec};
use tracing::{debug, error, info, warn};

use crate::api::ApiError;
use crate::client::Client;
use crate::host::{Service, ServiceType};
use crate::membership::MembershipOracle;
use crate::runtime::{Container, RuntimeDriver};
use crate::services::scheduler::schedule;

const SERVICE_ID: &str = "stellar.services.application.v1";

/// Datastore bucket holding submitted applications.
pub const APPLICATION_BUCKET: &str = "stellar.v1.services.application";

const APPS_PREFIX: &str = "apps.";

fn app_key(name: &str) -> String {
    format!("{}{}", APPS_PREFIX, name)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InfoResponse {
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AppsResponse {
    pub apps: Vec<App>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AppResponse {
    pub app: App,
}

/// One placed replica.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Placement {
    pub node: String,
    pub container: String,
    pub subnet_cidr: String,
}

/// The outcome of applying an application spec. Placement is best-effort
/// per target; failures are reported alongside the successes.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeployResponse {
    pub name: String,
    pub placements: Vec<Placement>,
    pub failures: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateContainerRequest {
    pub app: String,
    pub service: ServiceSpec,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContainerResponse {
    pub container: Container,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContainersResponse {
    pub containers: Vec<Container>,
}

/// Shared state behind the application handlers.
pub struct AppController {
    membership: Arc<dyn MembershipOracle>,
    datastore: Arc<dyn Datastore>,
    broker: Arc<dyn EventBroker>,
    runtime: Arc<dyn RuntimeDriver>,
}

impl AppController {
    fn cluster_nodes(&self) -> Vec<Node> {
        let mut nodes = vec![Node::from(self.membership.self_peer())];
        nodes.extend(self.membership.peers().into_iter().map(Node::from));
        nodes
    }

    /// Persist `app` and drive its services onto the cluster.
    async fn create(&self, app: App) -> Result<DeployResponse, ApiError> {
        if app.name.is_empty() {
            return Err(ApiError::invalid_argument("application name is required"));
        }

        let value = serde_json::to_vec(&app)
            .map_err(|e| ApiError::internal(format!("encode application: {e}")))?;
        self.datastore
            .set(APPLICATION_BUCKET, &app_key(&app.name), value, true)
            .await?;

        let nodes = self.cluster_nodes();
        let mut placements = Vec::new();
        let mut failures = Vec::new();

        for spec in &app.services {
            let placed = match schedule(spec, &nodes) {
                Ok(placed) => placed,
                Err(e) => {
                    failures.push(format!("{}: {}", spec.name, e));
                    continue;
                }
            };
            if placed.is_empty() {
                failures.push(format!(
                    "{}: no nodes match the placement preference",
                    spec.name
                ));
                continue;
            }

            for node in placed {
                match self.place(&app.name, spec, &node).await {
                    Ok(placement) => {
                        info!(
                            app = %app.name,
                            service = %spec.name,
                            node = %placement.node,
                            container = %placement.container,
                            "placed service replica"
                        );
                        placements.push(placement);
                    }
                    Err(e) => {
                        warn!(
                            app = %app.name,
                            service = %spec.name,
                            node = %node.id,
                            error = %e,
                            "failed to place service replica"
                        );
                        failures.push(format!("{} on {}: {}", spec.name, node.id, e));
                    }
                }
            }
        }

        self.publish_update(&app.name).await;

        if placements.is_empty() && !failures.is_empty() {
            return Err(ApiError::unavailable(format!(
                "no replicas placed for {}: {}",
                app.name,
                failures.join("; ")
            )));
        }

        Ok(DeployResponse {
            name: app.name,
            placements,
            failures,
        })
    }

    /// Place one replica of `spec` on `node`: ensure the node has a subnet,
    /// then ask its runtime for the container. Both calls go through a fresh
    /// client scoped to this operation.
    async fn place(
        &self,
        app: &str,
        spec: &ServiceSpec,
        node: &Node,
    ) -> Result<Placement, anyhow::Error> {
        let client = Client::new(&node.address)?;

        let subnet = client.allocate_subnet(&node.id).await?;
        debug!(node = %node.id, subnet = %subnet.subnet_cidr, "target subnet ensured");

        let container = client
            .create_container(&CreateContainerRequest {
                app: app.to_string(),
                service: spec.clone(),
            })
            .await?;

        Ok(Placement {
            node: node.id.clone(),
            container: container.id,
            subnet_cidr: subnet.subnet_cidr,
        })
    }

    /// Remove the application record and tear its containers down
    /// best-effort on every node.
    async fn delete(&self, name: &str) -> Result<(), ApiError> {
        let bytes = self
            .datastore
            .get(APPLICATION_BUCKET, &app_key(name))
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    ApiError::not_found(format!("application {name} not found"))
                } else {
                    e.into()
                }
            })?;
        let app: App = serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::internal(format!("decode application: {e}")))?;

        self.datastore
            .delete(APPLICATION_BUCKET, &app_key(name))
            .await?;

        for node in self.cluster_nodes() {
            let client = match Client::new(&node.address) {
                Ok(client) => client,
                Err(e) => {
                    warn!(node = %node.id, error = %e, "skipping container teardown");
                    continue;
                }
            };
            for spec in &app.services {
                let container = format!("{}.{}", name, spec.name);
                if let Err(e) = client.remove_container(&container).await {
                    warn!(
                        node = %node.id,
                        container = %container,
                        error = %e,
                        "failed to remove container"
                    );
                }
            }
        }

        self.publish_update(name).await;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<App>, ApiError> {
        let pairs = self.datastore.search(APPLICATION_BUCKET, APPS_PREFIX).await?;
        let mut apps = Vec::with_capacity(pairs.len());
        for pair in pairs {
            match serde_json::from_slice::<App>(&pair.value) {
                Ok(app) => apps.push(app),
                Err(e) => warn!(key = %pair.key, error = %e, "skipping undecodable application"),
            }
        }
        Ok(apps)
    }

    async fn get(&self, name: &str) -> Result<App, ApiError> {
        let bytes = self
            .datastore
            .get(APPLICATION_BUCKET, &app_key(name))
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    ApiError::not_found(format!("application {name} not found"))
                } else {
                    e.into()
                }
            })?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::internal(format!("decode application: {e}")))
    }

    /// Announce a mutation. Event delivery failing never fails the mutation;
    /// consumers converge on the next one.
    async fn publish_update(&self, name: &str) {
        let event = Event::ApplicationUpdated(ApplicationUpdatedPayload {
            name: name.to_string(),
        });
        let envelope = match marshal_event(subjects::APPLICATION, &event) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(app = name, error = %e, "failed to encode update event");
                return;
            }
        };
        if let Err(e) = self.broker.publish(envelope).await {
            error!(app = name, error = %e, "failed to publish update event");
        }
    }
}

/// The application RPC service.
pub struct ApplicationService {
    controller: Arc<AppController>,
}

impl ApplicationService {
    pub fn new(
        membership: Arc<dyn MembershipOracle>,
        datastore: Arc<dyn Datastore>,
        broker: Arc<dyn EventBroker>,
        runtime: Arc<dyn RuntimeDriver>,
    ) -> Arc<Self> {
        Arc::new(Self {
            controller: Arc::new(AppController {
                membership,
                datastore,
                broker,
                runtime,
            }),
        })
    }
}

#[async_trait]
impl Service for ApplicationService {
    fn id(&self) -> &'static str {
        SERVICE_ID
    }

    fn service_type(&self) -> ServiceType {
        ServiceType::Application
    }

    fn requires(&self) -> Vec<ServiceType> {
        vec![
            ServiceType::Cluster,
            ServiceType::Scheduler,
            ServiceType::Network,
            ServiceType::Events,
        ]
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/v1/application", post(create_app).get(list_apps))
            .route("/v1/application/info", get(info))
            .route("/v1/application/{name}", get(get_app).delete(delete_app))
            .route("/v1/containers", get(list_containers).post(create_container))
            .route("/v1/containers/{id}", delete(remove_container))
            .with_state(self.controller.clone())
    }
}

async fn info(State(_): State<Arc<AppController>>) -> Json<InfoResponse> {
    Json(InfoResponse {
        id: SERVICE_ID.to_string(),
    })
}

async fn create_app(
    State(controller): State<Arc<AppController>>,
    Json(app): Json<App>,
) -> Result<Json<DeployResponse>, ApiError> {
    let report = controller.create(app).await?;
    Ok(Json(report))
}

async fn list_apps(
    State(controller): State<Arc<AppController>>,
) -> Result<Json<AppsResponse>, ApiError> {
    let apps = controller.list().await?;
    Ok(Json(AppsResponse { apps }))
}

async fn get_app(
    State(controller): State<Arc<AppController>>,
    Path(name): Path<String>,
) -> Result<Json<AppResponse>, ApiError> {
    let app = controller.get(&name).await?;
    Ok(Json(AppResponse { app }))
}

async fn delete_app(
    State(controller): State<Arc<AppController>>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    controller.delete(&name).await?;
    Ok(Json(serde_json::json!({})))
}

async fn list_containers(
    State(controller): State<Arc<AppController>>,
) -> Result<Json<ContainersResponse>, ApiError> {
    let containers = controller
        .runtime
        .containers()
        .await
        .map_err(|e| ApiError::unavailable(format!("container runtime: {e}")))?;
    Ok(Json(ContainersResponse { containers }))
}

async fn create_container(
    State(controller): State<Arc<AppController>>,
    Json(req): Json<CreateContainerRequest>,
) -> Result<Json<ContainerResponse>, ApiError> {
    let container = controller
        .runtime
        .create(&req.app, &req.service)
        .await
        .map_err(|e| ApiError::unavailable(format!("container runtime: {e}")))?;
    Ok(Json(ContainerResponse { container }))
}

async fn remove_container(
    State(controller): State<Arc<AppController>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    controller
        .runtime
        .remove(&id)
        .await
        .map_err(|e| ApiError::unavailable(format!("container runtime: {e}")))?;
    Ok(Json(serde_json::json!({})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::StaticMembership;
    use crate::runtime::MockRuntime;
    use std::collections::BTreeMap;
    use stellar_datastore::MemoryDatastore;
    use stellar_events::MemoryBroker;
    use stellar_types::Peer;

    fn controller() -> AppController {
        let self_peer = Peer {
            id: "node-00".to_string(),
            address: "127.0.0.1:1".to_string(),
            labels: BTreeMap::new(),
        };
        AppController {
            membership: Arc::new(StaticMembership::new(self_peer, Vec::new())),
            datastore: Arc::new(MemoryDatastore::new()),
            broker: Arc::new(MemoryBroker::default()),
            runtime: Arc::new(MockRuntime::new()),
        }
    }

    fn app(name: &str) -> App {
        App {
            name: name.to_string(),
            services: vec![ServiceSpec {
                name: "web".to_string(),
                image: "docker.io/library/nginx:latest".to_string(),
                ..Default::default()
            }],
        }
    }

    #[tokio::test]
    async fn test_create_requires_name() {
        let controller = controller();
        let err = controller.create(App::default()).await.unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_missing_app_is_not_found() {
        let controller = controller();
        let err = controller.get("nope").await.unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_after_persist() {
        let controller = controller();
        let value = serde_json::to_vec(&app("guestbook")).unwrap();
        controller
            .datastore
            .set(APPLICATION_BUCKET, &app_key("guestbook"), value, true)
            .await
            .unwrap();

        let apps = controller.list().await.unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].name, "guestbook");
        assert_eq!(controller.get("guestbook").await.unwrap().name, "guestbook");
    }

    #[tokio::test]
    async fn test_create_reports_unreachable_targets() {
        // The only node's address points nowhere, so placement fails but the
        // spec is persisted and the failure is surfaced.
        let controller = controller();
        let err = controller.create(app("guestbook")).await.unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::SERVICE_UNAVAILABLE);

        let apps = controller.list().await.unwrap();
        assert_eq!(apps.len(), 1);
    }
}
