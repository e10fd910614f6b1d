use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::OpsGraphError;

/// Free-form JSON object attached to nodes and edges.
pub type Properties = serde_json::Map<String, serde_json::Value>;

// --- Vocabularies ---

/// The closed set of entity kinds the graph stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKind {
    Service,
    EnvVar,
    Incident,
}

impl NodeKind {
    pub const ALL: [NodeKind; 3] = [NodeKind::Service, NodeKind::EnvVar, NodeKind::Incident];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Service => "Service",
            NodeKind::EnvVar => "EnvVar",
            NodeKind::Incident => "Incident",
        }
    }

    /// Prefix of every node id of this kind (`svc:crm7`, `env:SUPABASE_URL`).
    pub fn id_prefix(&self) -> &'static str {
        match self {
            NodeKind::Service => "svc",
            NodeKind::EnvVar => "env",
            NodeKind::Incident => "inc",
        }
    }

    /// Property holding the natural identifier for this kind.
    pub fn identifier_property(&self) -> &'static str {
        match self {
            NodeKind::Service => "name",
            NodeKind::EnvVar => "key",
            NodeKind::Incident => "incidentId",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = OpsGraphError;

    /// Accepts the canonical names case-insensitively, with or without
    /// separators (`EnvVar`, `env_var`, `ENV-VAR`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "service" => Ok(NodeKind::Service),
            "envvar" => Ok(NodeKind::EnvVar),
            "incident" => Ok(NodeKind::Incident),
            _ => Err(OpsGraphError::UnknownKind {
                vocabulary: "node type",
                value: s.to_string(),
            }),
        }
    }
}

/// The closed set of relationship kinds. Edges are directed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdgeKind {
    #[serde(rename = "SERVICE_REQUIRES_ENVVAR")]
    ServiceRequiresEnvVar,
    #[serde(rename = "INCIDENT_IMPACTS_SERVICE")]
    IncidentImpactsService,
}

impl EdgeKind {
    pub const ALL: [EdgeKind; 2] = [
        EdgeKind::ServiceRequiresEnvVar,
        EdgeKind::IncidentImpactsService,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::ServiceRequiresEnvVar => "SERVICE_REQUIRES_ENVVAR",
            EdgeKind::IncidentImpactsService => "INCIDENT_IMPACTS_SERVICE",
        }
    }

    /// Node kinds expected at the (from, to) ends.
    pub fn endpoints(&self) -> (NodeKind, NodeKind) {
        match self {
            EdgeKind::ServiceRequiresEnvVar => (NodeKind::Service, NodeKind::EnvVar),
            EdgeKind::IncidentImpactsService => (NodeKind::Incident, NodeKind::Service),
        }
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeKind {
    type Err = OpsGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SERVICE_REQUIRES_ENVVAR" => Ok(EdgeKind::ServiceRequiresEnvVar),
            "INCIDENT_IMPACTS_SERVICE" => Ok(EdgeKind::IncidentImpactsService),
            _ => Err(OpsGraphError::UnknownKind {
                vocabulary: "relationship type",
                value: s.to_string(),
            }),
        }
    }
}

/// Which edges of a node to return, relative to the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
    #[default]
    Both,
}

impl FromStr for Direction {
    type Err = OpsGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "outgoing" | "out" => Ok(Direction::Outgoing),
            "incoming" | "in" => Ok(Direction::Incoming),
            "both" => Ok(Direction::Both),
            _ => Err(OpsGraphError::UnknownKind {
                vocabulary: "direction",
                value: s.to_string(),
            }),
        }
    }
}

// --- Graph records ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub properties: Properties,
    pub source_info: Properties,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// The natural identifier: the id with its kind prefix removed.
    pub fn identifier(&self) -> &str {
        self.id
            .strip_prefix(self.kind.id_prefix())
            .and_then(|rest| rest.strip_prefix(':'))
            .unwrap_or(&self.id)
    }

    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
    pub from_node: String,
    pub to_node: String,
    pub properties: Properties,
    pub source_info: Properties,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Edge {
    pub fn touches(&self, node_id: &str) -> bool {
        self.from_node == node_id || self.to_node == node_id
    }
}

/// A node reached by traversal, with the hop count at which it was first seen
/// and the type of the edge that reached it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    #[serde(flatten)]
    pub node: Node,
    pub level: u32,
    pub edge_type: EdgeKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subgraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Subgraph {
    pub fn nodes_of(&self, kind: NodeKind) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(move |n| n.kind == kind)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_nodes: i64,
    pub total_edges: i64,
    pub nodes_by_type: BTreeMap<NodeKind, i64>,
    pub edges_by_type: BTreeMap<EdgeKind, i64>,
}

// --- Provenance ---

/// Provenance stamped on every node and edge written by one ingestion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,
    pub extracted_at: DateTime<Utc>,
}

impl SourceInfo {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            source_file: None,
            line_number: None,
            original_text: None,
            extracted_at: Utc::now(),
        }
    }

    pub fn to_properties(&self) -> Properties {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => Properties::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_kind_parses_loose_spellings() {
        assert_eq!("Service".parse::<NodeKind>().unwrap(), NodeKind::Service);
        assert_eq!("env_var".parse::<NodeKind>().unwrap(), NodeKind::EnvVar);
        assert_eq!("ENVVAR".parse::<NodeKind>().unwrap(), NodeKind::EnvVar);
        assert_eq!(" incident ".parse::<NodeKind>().unwrap(), NodeKind::Incident);
        assert!("Database".parse::<NodeKind>().is_err());
    }

    #[test]
    fn edge_kind_round_trips_wire_names() {
        for kind in EdgeKind::ALL {
            assert_eq!(kind.as_str().parse::<EdgeKind>().unwrap(), kind);
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, serde_json::json!(kind.as_str()));
        }
        assert!("SERVICE_DEPENDS_ON_SERVICE".parse::<EdgeKind>().is_err());
    }

    #[test]
    fn node_identifier_strips_prefix() {
        let now = Utc::now();
        let node = Node {
            id: "env:SUPABASE_URL".into(),
            kind: NodeKind::EnvVar,
            properties: Properties::new(),
            source_info: Properties::new(),
            created_at: now,
            updated_at: now,
        };
        assert_eq!(node.identifier(), "SUPABASE_URL");
    }

    #[test]
    fn neighbor_serializes_flat() {
        let now = Utc::now();
        let neighbor = Neighbor {
            node: Node {
                id: "svc:crm7".into(),
                kind: NodeKind::Service,
                properties: Properties::new(),
                source_info: Properties::new(),
                created_at: now,
                updated_at: now,
            },
            level: 1,
            edge_type: EdgeKind::ServiceRequiresEnvVar,
        };
        let json = serde_json::to_value(&neighbor).unwrap();
        assert_eq!(json["id"], "svc:crm7");
        assert_eq!(json["type"], "Service");
        assert_eq!(json["level"], 1);
        assert_eq!(json["edge_type"], "SERVICE_REQUIRES_ENVVAR");
    }

    #[test]
    fn source_info_uses_camel_case_keys() {
        let mut info = SourceInfo::new("ingest-1");
        info.source_file = Some("deployments/crm7".into());
        let props = info.to_properties();
        assert_eq!(props["runId"], "ingest-1");
        assert_eq!(props["sourceFile"], "deployments/crm7");
        assert!(props.contains_key("extractedAt"));
        assert!(!props.contains_key("lineNumber"));
    }
}
