//! Health service: host diagnostics for peers and operators.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::host::{Service, ServiceType};
use crate::resources::HostSnapshot;

const SERVICE_ID: &str = "stellar.services.health.v1";

/// The health report peers fetch during heartbeat probes.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub os_name: String,
    pub os_version: String,
    /// Host uptime in seconds.
    pub uptime: u64,
    pub cpus: i64,
    pub memory_total: i64,
    pub memory_free: i64,
    pub memory_used: i64,
}

impl From<HostSnapshot> for HealthResponse {
    fn from(snapshot: HostSnapshot) -> Self {
        Self {
            os_name: snapshot.os_name,
            os_version: snapshot.os_version,
            uptime: snapshot.uptime_seconds,
            cpus: snapshot.cpus,
            memory_total: snapshot.memory_total,
            memory_free: snapshot.memory_free,
            memory_used: snapshot.memory_used,
        }
    }
}

/// The health RPC service.
#[derive(Clone, Default)]
pub struct HealthService;

impl HealthService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

#[async_trait]
impl Service for HealthService {
    fn id(&self) -> &'static str {
        SERVICE_ID
    }

    fn service_type(&self) -> ServiceType {
        ServiceType::Health
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/healthz", get(livez))
            .route("/v1/health", get(health))
    }
}

/// Minimal liveness probe.
async fn livez() -> impl IntoResponse {
    StatusCode::OK
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::from(HostSnapshot::measure()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_livez_returns_ok() {
        let response = livez().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_reports_host() {
        let Json(report) = health().await;
        assert!(report.cpus > 0);
        assert_eq!(report.memory_used, report.memory_total - report.memory_free);
    }
}
