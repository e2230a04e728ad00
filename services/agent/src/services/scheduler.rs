//! Service placement.
//!
//! Placement is a pure function of the service spec and a membership
//! snapshot: the same inputs always produce the same node list, in the order
//! the nodes were offered. There is no load awareness and no randomization,
//! so a placement can be reproduced from logs alone.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use stellar_types::{Node, ServiceSpec};
use thiserror::Error;

use crate::api::ApiError;
use crate::host::{Service, ServiceType};

const SERVICE_ID: &str = "stellar.services.scheduler.v1";

/// Errors from placement.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// A preference may whitelist node IDs or match labels, never both.
    #[error("placement preference cannot set both node IDs and labels")]
    InvalidPreference,
}

/// Choose target nodes for `spec` out of `available`.
///
/// With no preference the first offered node wins, regardless of the replica
/// count. A node-ID whitelist filters `available` in its original order and
/// yields at most `replicas` nodes (at least one). Label preferences require
/// every label to match; when replicas exceed the matching nodes the matches
/// are repeated in order to fill the count. An expected label value of `""`
/// is unsatisfiable and yields no placement at all.
///
/// No placement matching is an empty result, not an error.
pub fn schedule(spec: &ServiceSpec, available: &[Node]) -> Result<Vec<Node>, ScheduleError> {
    let preference = spec
        .placement_preference
        .as_ref()
        .filter(|p| !p.is_empty());

    let Some(preference) = preference else {
        return Ok(available.first().cloned().into_iter().collect());
    };

    if !preference.node_ids.is_empty() && !preference.labels.is_empty() {
        return Err(ScheduleError::InvalidPreference);
    }

    let want = spec.replicas.max(1) as usize;

    if !preference.node_ids.is_empty() {
        let matched = available
            .iter()
            .filter(|n| preference.node_ids.contains(&n.id))
            .take(want)
            .cloned()
            .collect();
        return Ok(matched);
    }

    // A label asserted with an empty expected value can never be satisfied.
    if preference.labels.values().any(|v| v.is_empty()) {
        return Ok(Vec::new());
    }

    let matched: Vec<&Node> = available
        .iter()
        .filter(|n| n.matches_labels(&preference.labels))
        .collect();
    if matched.is_empty() {
        return Ok(Vec::new());
    }

    Ok((0..want).map(|i| matched[i % matched.len()].clone()).collect())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub service: ServiceSpec,
    pub available_nodes: Vec<Node>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScheduleResponse {
    pub nodes: Vec<Node>,
}

/// The scheduler RPC service.
#[derive(Clone, Default)]
pub struct SchedulerService;

impl SchedulerService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

#[async_trait]
impl Service for SchedulerService {
    fn id(&self) -> &'static str {
        SERVICE_ID
    }

    fn service_type(&self) -> ServiceType {
        ServiceType::Scheduler
    }

    fn routes(&self) -> Router {
        Router::new().route("/v1/scheduler/schedule", post(schedule_handler))
    }
}

async fn schedule_handler(
    Json(req): Json<ScheduleRequest>,
) -> Result<Json<ScheduleResponse>, ApiError> {
    let nodes = schedule(&req.service, &req.available_nodes)
        .map_err(|e| ApiError::invalid_argument(e.to_string()))?;
    Ok(Json(ScheduleResponse { nodes }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use stellar_types::PlacementPreference;

    fn node(id: &str, address: &str, labels: &[(&str, &str)]) -> Node {
        Node {
            id: id.to_string(),
            address: address.to_string(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn three_nodes() -> Vec<Node> {
        vec![
            node("node-00", "127.0.0.1:9000", &[]),
            node("node-01", "127.0.0.1:9001", &[]),
            node("node-02", "127.0.0.1:9002", &[]),
        ]
    }

    fn spec_with(preference: Option<PlacementPreference>, replicas: u64) -> ServiceSpec {
        ServiceSpec {
            name: "test-service".to_string(),
            replicas,
            placement_preference: preference,
            ..Default::default()
        }
    }

    #[test]
    fn test_schedule_no_preference() {
        let nodes = schedule(&spec_with(None, 0), &three_nodes()).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, "node-00");
    }

    #[test]
    fn test_schedule_no_preference_ignores_replicas() {
        let nodes = schedule(&spec_with(None, 3), &three_nodes()).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, "node-00");
    }

    #[test]
    fn test_schedule_no_nodes() {
        let nodes = schedule(&spec_with(None, 0), &[]).unwrap();
        assert!(nodes.is_empty());
    }

    fn id_preference() -> PlacementPreference {
        PlacementPreference {
            node_ids: vec!["node-00".to_string(), "node-01".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_schedule_nodes_by_id_empty_replica() {
        let nodes = schedule(&spec_with(Some(id_preference()), 0), &three_nodes()).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, "node-00");
    }

    #[test]
    fn test_schedule_nodes_by_id_single_replica() {
        let nodes = schedule(&spec_with(Some(id_preference()), 1), &three_nodes()).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, "node-00");
    }

    #[test]
    fn test_schedule_nodes_by_id_with_replicas() {
        let nodes = schedule(&spec_with(Some(id_preference()), 2), &three_nodes()).unwrap();
        let ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["node-00", "node-01"]);
    }

    #[test]
    fn test_schedule_nodes_by_id_replicas_exceed_matches() {
        let nodes = schedule(&spec_with(Some(id_preference()), 5), &three_nodes()).unwrap();
        let ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["node-00", "node-01"]);
    }

    fn labeled_nodes() -> Vec<Node> {
        vec![
            node(
                "node-00",
                "127.0.0.1:9000",
                &[("env", "prod"), ("region", "east")],
            ),
            node(
                "node-01",
                "127.0.0.1:9001",
                &[("env", "qa"), ("region", "west")],
            ),
            node(
                "node-02",
                "127.0.0.1:9002",
                &[("env", "prod"), ("region", "south")],
            ),
        ]
    }

    fn label_preference(pairs: &[(&str, &str)]) -> PlacementPreference {
        PlacementPreference {
            labels: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_schedule_nodes_by_label_with_replicas() {
        let pref = label_preference(&[("env", "prod")]);
        let nodes = schedule(&spec_with(Some(pref), 2), &labeled_nodes()).unwrap();
        let ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["node-00", "node-02"]);
    }

    #[test]
    fn test_schedule_nodes_by_multiple_labels_with_replicas() {
        // One matching node with two desired replicas: the match repeats.
        let pref = label_preference(&[("env", "prod"), ("region", "east")]);
        let nodes = schedule(&spec_with(Some(pref), 2), &labeled_nodes()).unwrap();
        let ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["node-00", "node-00"]);
    }

    #[test]
    fn test_schedule_empty_label_value_matches_nothing() {
        let pref = label_preference(&[("env", "prod"), ("region", "")]);
        let nodes = schedule(&spec_with(Some(pref), 2), &labeled_nodes()).unwrap();
        assert!(nodes.is_empty());
    }

    #[test]
    fn test_schedule_both_preferences_rejected() {
        let pref = PlacementPreference {
            node_ids: vec!["node-00".to_string()],
            labels: [("env".to_string(), "prod".to_string())].into_iter().collect(),
        };
        let err = schedule(&spec_with(Some(pref), 1), &three_nodes()).unwrap_err();
        assert_eq!(err, ScheduleError::InvalidPreference);
    }

    #[test]
    fn test_schedule_deterministic() {
        let pref = label_preference(&[("env", "prod")]);
        let spec = spec_with(Some(pref), 2);
        let nodes = labeled_nodes();
        assert_eq!(
            schedule(&spec, &nodes).unwrap(),
            schedule(&spec, &nodes).unwrap()
        );
    }

    #[test]
    fn test_schedule_output_is_subset_of_input() {
        let mut labels = BTreeMap::new();
        labels.insert("env".to_string(), "prod".to_string());
        let pref = PlacementPreference {
            labels,
            ..Default::default()
        };
        let nodes = labeled_nodes();
        let placed = schedule(&spec_with(Some(pref), 3), &nodes).unwrap();
        for p in &placed {
            assert!(nodes.contains(p));
        }
    }
}
