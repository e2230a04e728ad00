//! Application and service specifications as submitted by users.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Endpoint protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

/// A port a service exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub protocol: Protocol,
    pub port: u16,
}

/// Placement constraints for a service.
///
/// At most one of `node_ids` and `labels` may be set. An empty preference
/// means "no preference". A label whose expected value is the empty string is
/// unsatisfiable and yields no placements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementPreference {
    /// Whitelist of eligible node IDs, in priority order.
    #[serde(default)]
    pub node_ids: Vec<String>,

    /// Labels that must all match on an eligible node.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl PlacementPreference {
    /// True when neither filter is set.
    pub fn is_empty(&self) -> bool {
        self.node_ids.is_empty() && self.labels.is_empty()
    }
}

/// Specification for one replicated service within an application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Unique name within the application.
    pub name: String,

    /// Container image reference.
    #[serde(default)]
    pub image: String,

    /// Desired placement count. Zero requests a single placement.
    #[serde(default)]
    pub replicas: u64,

    /// Optional placement constraints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement_preference: Option<PlacementPreference>,

    /// Logical network names the service joins.
    #[serde(default)]
    pub networks: Vec<String>,

    /// Exposed endpoints.
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

/// An application: a named collection of services deployed together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    /// Unique application name.
    pub name: String,

    /// Services the application is composed of.
    #[serde(default)]
    pub services: Vec<ServiceSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placement_preference_is_empty() {
        assert!(PlacementPreference::default().is_empty());

        let by_id = PlacementPreference {
            node_ids: vec!["node-00".to_string()],
            ..Default::default()
        };
        assert!(!by_id.is_empty());
    }

    #[test]
    fn test_service_spec_roundtrip() {
        let spec = ServiceSpec {
            name: "web".to_string(),
            image: "docker.io/library/nginx:latest".to_string(),
            replicas: 2,
            placement_preference: None,
            networks: vec!["default".to_string()],
            endpoints: vec![Endpoint {
                protocol: Protocol::Tcp,
                port: 80,
            }],
        };

        let json = serde_json::to_string(&spec).unwrap();
        let back: ServiceSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(spec, back);
    }

    #[test]
    fn test_service_spec_defaults_apply() {
        let spec: ServiceSpec = serde_json::from_str(r#"{"name": "web"}"#).unwrap();
        assert_eq!(spec.replicas, 0);
        assert!(spec.placement_preference.is_none());
        assert!(spec.endpoints.is_empty());
    }

    #[test]
    fn test_protocol_wire_format() {
        assert_eq!(serde_json::to_string(&Protocol::Tcp).unwrap(), "\"tcp\"");
        assert_eq!(serde_json::to_string(&Protocol::Udp).unwrap(), "\"udp\"");
    }
}
