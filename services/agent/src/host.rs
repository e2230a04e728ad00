//! Service composition and lifecycle.
//!
//! Every core service implements [`Service`]: it names itself, declares the
//! service types it depends on, contributes its routes to the shared RPC
//! server, and exposes start/stop hooks for any background work it owns.
//!
//! [`ServiceHost`] registers services, orders them topologically over their
//! declared dependencies, serves the merged router on one listener, and
//! starts services in dependency order. Stopping runs in reverse. A service
//! that fails to start triggers a reverse-order stop of everything already
//! started.

use std::collections::{BTreeMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// The service types a node hosts. Dependencies are declared in terms of
/// types, not instances; at most one service of each type may be registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ServiceType {
    Cluster,
    Health,
    Events,
    Scheduler,
    Network,
    Application,
    Proxy,
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServiceType::Cluster => "cluster",
            ServiceType::Health => "health",
            ServiceType::Events => "events",
            ServiceType::Scheduler => "scheduler",
            ServiceType::Network => "network",
            ServiceType::Application => "application",
            ServiceType::Proxy => "proxy",
        };
        write!(f, "{}", s)
    }
}

/// A hosted RPC service.
#[async_trait]
pub trait Service: Send + Sync {
    /// Stable identifier, e.g. `stellar.services.application.v1`.
    fn id(&self) -> &'static str;

    /// The type this service registers as.
    fn service_type(&self) -> ServiceType;

    /// Service types that must be registered and started first.
    fn requires(&self) -> Vec<ServiceType> {
        Vec::new()
    }

    /// The routes this service contributes to the shared RPC server.
    /// Registration order is immaterial.
    fn routes(&self) -> Router;

    /// Start background work. Called in dependency order.
    async fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Stop background work. Called in reverse dependency order.
    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Errors from host composition and startup.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("service {service} requires unregistered service type {missing}")]
    MissingDependency {
        service: String,
        missing: ServiceType,
    },

    #[error("service dependency graph contains a cycle")]
    DependencyCycle,

    #[error("service type {0} is already registered")]
    DuplicateService(ServiceType),

    #[error("service {id} failed to start: {error}")]
    Startup { id: String, error: anyhow::Error },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Descriptive information about a registered service.
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub id: String,
    pub service_type: ServiceType,
}

/// Hosts the node's services behind a single RPC listener.
pub struct ServiceHost {
    listen_addr: SocketAddr,
    services: Vec<Arc<dyn Service>>,
    started: Vec<usize>,
    server: Option<(watch::Sender<bool>, JoinHandle<()>)>,
    local_addr: Option<SocketAddr>,
}

impl ServiceHost {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            services: Vec::new(),
            started: Vec::new(),
            server: None,
            local_addr: None,
        }
    }

    /// Register a service. Only one service per type is allowed.
    pub fn register(&mut self, service: Arc<dyn Service>) -> Result<(), HostError> {
        let service_type = service.service_type();
        if self
            .services
            .iter()
            .any(|s| s.service_type() == service_type)
        {
            return Err(HostError::DuplicateService(service_type));
        }
        self.services.push(service);
        Ok(())
    }

    /// Information about the registered service with the given id.
    pub fn info(&self, id: &str) -> Option<ServiceInfo> {
        self.services.iter().find(|s| s.id() == id).map(|s| ServiceInfo {
            id: s.id().to_string(),
            service_type: s.service_type(),
        })
    }

    /// The address the RPC server is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Indices of the registered services in dependency order.
    fn dependency_order(&self) -> Result<Vec<usize>, HostError> {
        let mut by_type: BTreeMap<ServiceType, usize> = BTreeMap::new();
        for (idx, service) in self.services.iter().enumerate() {
            by_type.insert(service.service_type(), idx);
        }

        let mut indegree = vec![0usize; self.services.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.services.len()];

        for (idx, service) in self.services.iter().enumerate() {
            for required in service.requires() {
                let Some(&dep) = by_type.get(&required) else {
                    return Err(HostError::MissingDependency {
                        service: service.id().to_string(),
                        missing: required,
                    });
                };
                indegree[idx] += 1;
                dependents[dep].push(idx);
            }
        }

        let mut ready: VecDeque<usize> = (0..self.services.len())
            .filter(|&i| indegree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.services.len());

        while let Some(idx) = ready.pop_front() {
            order.push(idx);
            for &dependent in &dependents[idx] {
                indegree[dependent] -= 1;
                if indegree[dependent] == 0 {
                    ready.push_back(dependent);
                }
            }
        }

        if order.len() != self.services.len() {
            return Err(HostError::DependencyCycle);
        }
        Ok(order)
    }

    /// Bind the RPC server, then start every service in dependency order.
    ///
    /// Returns the bound address. If any service fails to start, services
    /// started so far are stopped in reverse order and the server is torn
    /// down before the error is returned.
    pub async fn start(&mut self) -> Result<SocketAddr, HostError> {
        let order = self.dependency_order()?;

        let mut router = Router::new();
        for service in &self.services {
            router = router.merge(service.routes());
        }
        let router = router.layer(TraceLayer::new_for_http());

        let listener =
            TcpListener::bind(self.listen_addr)
                .await
                .map_err(|source| HostError::Bind {
                    addr: self.listen_addr,
                    source,
                })?;
        let local_addr = listener.local_addr().map_err(|source| HostError::Bind {
            addr: self.listen_addr,
            source,
        })?;

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let server = tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.changed().await;
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(error = %e, "RPC server exited with error");
            }
        });
        self.server = Some((shutdown_tx, server));
        self.local_addr = Some(local_addr);

        for idx in order {
            let service = self.services[idx].clone();
            info!(service = service.id(), "starting service");
            if let Err(error) = service.start().await {
                let id = service.id().to_string();
                error!(service = %id, error = %error, "service failed to start");
                self.stop_services().await;
                self.shutdown_server().await;
                return Err(HostError::Startup { id, error });
            }
            self.started.push(idx);
        }

        info!(addr = %local_addr, services = self.services.len(), "node started");
        Ok(local_addr)
    }

    /// Stop all started services in reverse order, then the RPC server.
    pub async fn stop(&mut self) {
        self.stop_services().await;
        self.shutdown_server().await;
        info!("node stopped");
    }

    async fn stop_services(&mut self) {
        while let Some(idx) = self.started.pop() {
            let service = &self.services[idx];
            info!(service = service.id(), "stopping service");
            if let Err(e) = service.stop().await {
                warn!(service = service.id(), error = %e, "service failed to stop");
            }
        }
    }

    async fn shutdown_server(&mut self) {
        if let Some((shutdown_tx, handle)) = self.server.take() {
            let _ = shutdown_tx.send(true);
            let _ = handle.await;
        }
        self.local_addr = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingService {
        id: &'static str,
        service_type: ServiceType,
        requires: Vec<ServiceType>,
        fail_start: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingService {
        fn new(
            id: &'static str,
            service_type: ServiceType,
            requires: Vec<ServiceType>,
            log: Arc<Mutex<Vec<String>>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                id,
                service_type,
                requires,
                fail_start: false,
                log,
            })
        }
    }

    #[async_trait]
    impl Service for RecordingService {
        fn id(&self) -> &'static str {
            self.id
        }

        fn service_type(&self) -> ServiceType {
            self.service_type
        }

        fn requires(&self) -> Vec<ServiceType> {
            self.requires.clone()
        }

        fn routes(&self) -> Router {
            Router::new()
        }

        async fn start(&self) -> anyhow::Result<()> {
            if self.fail_start {
                anyhow::bail!("induced failure");
            }
            self.log.lock().unwrap().push(format!("start:{}", self.id));
            Ok(())
        }

        async fn stop(&self) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(format!("stop:{}", self.id));
            Ok(())
        }
    }

    fn host() -> ServiceHost {
        ServiceHost::new("127.0.0.1:0".parse().unwrap())
    }

    #[tokio::test]
    async fn test_start_respects_dependency_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut host = host();

        // Registered out of order on purpose.
        host.register(RecordingService::new(
            "app",
            ServiceType::Application,
            vec![ServiceType::Cluster, ServiceType::Scheduler],
            log.clone(),
        ))
        .unwrap();
        host.register(RecordingService::new(
            "scheduler",
            ServiceType::Scheduler,
            vec![],
            log.clone(),
        ))
        .unwrap();
        host.register(RecordingService::new(
            "cluster",
            ServiceType::Cluster,
            vec![],
            log.clone(),
        ))
        .unwrap();

        host.start().await.unwrap();
        host.stop().await;

        let entries = log.lock().unwrap().clone();
        let pos = |needle: &str| entries.iter().position(|e| e == needle).unwrap();
        assert!(pos("start:cluster") < pos("start:app"));
        assert!(pos("start:scheduler") < pos("start:app"));
        assert!(pos("stop:app") < pos("stop:cluster"));
        assert!(pos("stop:app") < pos("stop:scheduler"));
    }

    #[tokio::test]
    async fn test_missing_dependency_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut host = host();
        host.register(RecordingService::new(
            "app",
            ServiceType::Application,
            vec![ServiceType::Scheduler],
            log,
        ))
        .unwrap();

        let err = host.start().await.unwrap_err();
        assert!(matches!(
            err,
            HostError::MissingDependency {
                missing: ServiceType::Scheduler,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_dependency_cycle_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut host = host();
        host.register(RecordingService::new(
            "app",
            ServiceType::Application,
            vec![ServiceType::Proxy],
            log.clone(),
        ))
        .unwrap();
        host.register(RecordingService::new(
            "proxy",
            ServiceType::Proxy,
            vec![ServiceType::Application],
            log,
        ))
        .unwrap();

        let err = host.start().await.unwrap_err();
        assert!(matches!(err, HostError::DependencyCycle));
    }

    #[tokio::test]
    async fn test_duplicate_type_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut host = host();
        host.register(RecordingService::new(
            "a",
            ServiceType::Cluster,
            vec![],
            log.clone(),
        ))
        .unwrap();
        let err = host
            .register(RecordingService::new("b", ServiceType::Cluster, vec![], log))
            .unwrap_err();
        assert!(matches!(
            err,
            HostError::DuplicateService(ServiceType::Cluster)
        ));
    }

    #[tokio::test]
    async fn test_failed_start_stops_started_services_in_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut host = host();
        host.register(RecordingService::new(
            "cluster",
            ServiceType::Cluster,
            vec![],
            log.clone(),
        ))
        .unwrap();
        host.register(RecordingService::new(
            "scheduler",
            ServiceType::Scheduler,
            vec![ServiceType::Cluster],
            log.clone(),
        ))
        .unwrap();
        host.register(Arc::new(RecordingService {
            id: "app",
            service_type: ServiceType::Application,
            requires: vec![ServiceType::Scheduler],
            fail_start: true,
            log: log.clone(),
        }))
        .unwrap();

        let err = host.start().await.unwrap_err();
        assert!(matches!(err, HostError::Startup { .. }));

        let entries = log.lock().unwrap().clone();
        assert_eq!(
            entries,
            vec![
                "start:cluster",
                "start:scheduler",
                "stop:scheduler",
                "stop:cluster"
            ]
        );
    }

    #[tokio::test]
    async fn test_info_by_id() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut host = host();
        host.register(RecordingService::new(
            "stellar.services.cluster.v1",
            ServiceType::Cluster,
            vec![],
            log,
        ))
        .unwrap();

        let info = host.info("stellar.services.cluster.v1").unwrap();
        assert_eq!(info.service_type, ServiceType::Cluster);
        assert!(host.info("stellar.services.unknown.v1").is_none());
    }
}
