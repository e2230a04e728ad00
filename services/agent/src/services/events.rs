//! Events service: the broker's publish/subscribe surface over RPC.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use stellar_events::{Envelope, EventBroker};

use crate::api::ApiError;
use crate::host::{Service, ServiceType};

const SERVICE_ID: &str = "stellar.services.events.v1";

#[derive(Debug, Deserialize)]
struct SubscribeParams {
    subject: String,
}

/// The events RPC service.
pub struct EventsService {
    broker: Arc<dyn EventBroker>,
}

impl EventsService {
    pub fn new(broker: Arc<dyn EventBroker>) -> Arc<Self> {
        Arc::new(Self { broker })
    }
}

#[async_trait]
impl Service for EventsService {
    fn id(&self) -> &'static str {
        SERVICE_ID
    }

    fn service_type(&self) -> ServiceType {
        ServiceType::Events
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/v1/events/publish", post(publish))
            .route("/v1/events/subscribe", get(subscribe))
            .with_state(self.broker.clone())
    }
}

async fn publish(
    State(broker): State<Arc<dyn EventBroker>>,
    Json(envelope): Json<Envelope>,
) -> Result<Json<serde_json::Value>, ApiError> {
    broker.publish(envelope).await?;
    Ok(Json(serde_json::json!({})))
}

/// Stream matching events as server-sent events. The stream is lazy and
/// non-restartable; a client that drops it starts a new subscription from
/// "now".
async fn subscribe(
    State(broker): State<Arc<dyn EventBroker>>,
    Query(params): Query<SubscribeParams>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, axum::Error>>>, ApiError> {
    let subscription = broker.subscribe(&params.subject).await?;

    let stream = stream::unfold(subscription, |mut subscription| async move {
        let envelope = subscription.next().await?;
        let event = SseEvent::default().json_data(&envelope);
        Some((event, subscription))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
