//! Proxy service: reacts to cluster events by reloading the local proxy.
//!
//! The reactor subscribes to every core-service subject and schedules a
//! reload whenever application or nameserver state changes. Reloads are
//! coalesced: at most one runs at a time, and any number of requests that
//! arrive during a reload collapse into a single follow-up run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{extract::State, routing::get, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use stellar_events::{subjects, unmarshal_event, Event, EventBroker};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::host::{Service, ServiceType};

const SERVICE_ID: &str = "stellar.services.proxy.v1";

#[derive(Debug, Serialize, Deserialize)]
pub struct ProxyInfoResponse {
    pub id: String,
    pub reload_count: u64,
}

/// Coalescing reload scheduler.
///
/// `Notify` stores at most one pending permit, which is exactly the
/// semantics needed: requests during an in-flight reload re-arm one more
/// run, never a queue of them.
pub struct ReloadTrigger {
    notify: Notify,
    count: AtomicU64,
}

impl ReloadTrigger {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            notify: Notify::new(),
            count: AtomicU64::new(0),
        })
    }

    /// Schedule a reload.
    pub fn request(&self) {
        self.notify.notify_one();
    }

    /// Completed reloads since startup.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = self.notify.notified() => self.reload().await,
                _ = shutdown.changed() => break,
            }
        }
    }

    /// Apply the current cluster state to the proxy.
    ///
    /// Placeholder: deployments wire their proxy reconfiguration in here.
    async fn reload(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
        info!(reloads = self.count(), "reloading proxy");
    }
}

/// The proxy RPC service and event reactor.
pub struct ProxyService {
    broker: Arc<dyn EventBroker>,
    trigger: Arc<ReloadTrigger>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ProxyService {
    pub fn new(broker: Arc<dyn EventBroker>) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            broker,
            trigger: ReloadTrigger::new(),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Completed reloads since startup.
    pub fn reload_count(&self) -> u64 {
        self.trigger.count()
    }
}

#[async_trait]
impl Service for ProxyService {
    fn id(&self) -> &'static str {
        SERVICE_ID
    }

    fn service_type(&self) -> ServiceType {
        ServiceType::Proxy
    }

    fn requires(&self) -> Vec<ServiceType> {
        vec![ServiceType::Events, ServiceType::Application]
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/v1/proxy/reload", post(reload_handler))
            .route("/v1/proxy/info", get(info_handler))
            .with_state(self.trigger.clone())
    }

    async fn start(&self) -> anyhow::Result<()> {
        let mut subscription = self.broker.subscribe(subjects::ALL_SERVICES).await?;

        let trigger = self.trigger.clone();
        let mut shutdown = self.shutdown.subscribe();
        let consumer = tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = subscription.next() => {
                        let Some(envelope) = received else {
                            error!("event subscription closed");
                            break;
                        };
                        match unmarshal_event(&envelope) {
                            Ok(
                                Event::ApplicationUpdated(_)
                                | Event::NameserverRecordCreated(_)
                                | Event::NameserverRecordDeleted(_),
                            ) => {
                                debug!(
                                    subject = %envelope.subject,
                                    kind = %envelope.kind,
                                    "scheduling proxy reload"
                                );
                                trigger.request();
                            }
                            Err(e) => {
                                error!(
                                    subject = %envelope.subject,
                                    error = %e,
                                    "dropping undecodable event"
                                );
                            }
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        });

        let runner = tokio::spawn(self.trigger.clone().run(self.shutdown.subscribe()));

        let mut tasks = self.tasks.lock().unwrap();
        tasks.push(consumer);
        tasks.push(runner);
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        let handles: Vec<_> = self.tasks.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        Ok(())
    }
}

async fn reload_handler(State(trigger): State<Arc<ReloadTrigger>>) -> Json<serde_json::Value> {
    trigger.request();
    Json(serde_json::json!({}))
}

async fn info_handler(State(trigger): State<Arc<ReloadTrigger>>) -> Json<ProxyInfoResponse> {
    Json(ProxyInfoResponse {
        id: SERVICE_ID.to_string(),
        reload_count: trigger.count(),
    })
}
