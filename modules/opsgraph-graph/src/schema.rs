//! Typed layer over `GraphStore` for the fixed vocabularies.
//!
//! `generate_node_id` is the only place node ids are built. Creators store the
//! natural identifier under the kind's identifier property (`name`, `key`,
//! `incidentId`) so it survives alongside whatever extra properties the
//! caller supplies.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use opsgraph_common::{Edge, EdgeKind, Neighbor, Node, NodeKind, Properties};

use crate::error::Result;
use crate::store::GraphStore;

/// Canonical node id: `<kind prefix>:<identifier>`.
pub fn generate_node_id(kind: NodeKind, identifier: &str) -> String {
    format!("{}:{}", kind.id_prefix(), identifier.trim())
}

/// Incidents, env vars and the edges between them within two hops of a
/// service.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloutRisks {
    pub incidents: Vec<Node>,
    pub required_env_vars: Vec<Node>,
    pub risk_factors: Vec<Edge>,
}

/// Required env var keys partitioned against a caller-supplied present set.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingEnvVars {
    pub required: Vec<String>,
    pub present: Vec<String>,
    pub missing: Vec<String>,
    pub missing_nodes: Vec<Node>,
}

/// The env var key of an EnvVar node.
pub fn env_var_key(node: &Node) -> String {
    node.property_str(NodeKind::EnvVar.identifier_property())
        .unwrap_or_else(|| node.identifier())
        .to_string()
}

#[derive(Clone)]
pub struct EntitySchema {
    store: Arc<dyn GraphStore>,
}

impl EntitySchema {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    // --- Nodes ---

    /// Upsert a node of `kind` keyed by its natural identifier.
    pub async fn create_entity(
        &self,
        kind: NodeKind,
        identifier: &str,
        mut properties: Properties,
        source_info: &Properties,
    ) -> Result<Node> {
        let identifier = identifier.trim();
        properties.insert(
            kind.identifier_property().to_string(),
            serde_json::Value::String(identifier.to_string()),
        );
        self.store
            .upsert_node(
                &generate_node_id(kind, identifier),
                kind,
                properties,
                source_info.clone(),
            )
            .await
    }

    pub async fn get_entity(&self, kind: NodeKind, identifier: &str) -> Result<Option<Node>> {
        let node = self.store.get_node(&generate_node_id(kind, identifier)).await?;
        Ok(node.filter(|n| n.kind == kind))
    }

    pub async fn create_service(
        &self,
        name: &str,
        properties: Properties,
        source_info: &Properties,
    ) -> Result<Node> {
        self.create_entity(NodeKind::Service, name, properties, source_info)
            .await
    }

    pub async fn get_service(&self, name: &str) -> Result<Option<Node>> {
        self.get_entity(NodeKind::Service, name).await
    }

    pub async fn create_env_var(
        &self,
        key: &str,
        properties: Properties,
        source_info: &Properties,
    ) -> Result<Node> {
        self.create_entity(NodeKind::EnvVar, key, properties, source_info)
            .await
    }

    pub async fn get_env_var(&self, key: &str) -> Result<Option<Node>> {
        self.get_entity(NodeKind::EnvVar, key).await
    }

    pub async fn create_incident(
        &self,
        incident_id: &str,
        properties: Properties,
        source_info: &Properties,
    ) -> Result<Node> {
        self.create_entity(NodeKind::Incident, incident_id, properties, source_info)
            .await
    }

    pub async fn get_incident(&self, incident_id: &str) -> Result<Option<Node>> {
        self.get_entity(NodeKind::Incident, incident_id).await
    }

    // --- Edges ---

    /// Upsert an edge between two natural identifiers. The endpoint kinds come
    /// from the edge kind.
    pub async fn link(
        &self,
        kind: EdgeKind,
        from_identifier: &str,
        to_identifier: &str,
        properties: Properties,
        source_info: &Properties,
    ) -> Result<Edge> {
        let (from_kind, to_kind) = kind.endpoints();
        self.store
            .upsert_edge(
                kind,
                &generate_node_id(from_kind, from_identifier),
                &generate_node_id(to_kind, to_identifier),
                properties,
                source_info.clone(),
            )
            .await
    }

    pub async fn link_service_requires_env_var(
        &self,
        service: &str,
        env_var_key: &str,
        properties: Properties,
        source_info: &Properties,
    ) -> Result<Edge> {
        self.link(
            EdgeKind::ServiceRequiresEnvVar,
            service,
            env_var_key,
            properties,
            source_info,
        )
        .await
    }

    pub async fn link_incident_impacts_service(
        &self,
        incident_id: &str,
        service: &str,
        properties: Properties,
        source_info: &Properties,
    ) -> Result<Edge> {
        self.link(
            EdgeKind::IncidentImpactsService,
            incident_id,
            service,
            properties,
            source_info,
        )
        .await
    }

    // --- Composite queries ---

    async fn one_hop(
        &self,
        kind: NodeKind,
        identifier: &str,
        via: EdgeKind,
        want: NodeKind,
    ) -> Result<Vec<Node>> {
        let neighbors = self
            .store
            .get_neighbors(&generate_node_id(kind, identifier), Some(via), 1)
            .await?;
        Ok(neighbors
            .into_iter()
            .map(|n| n.node)
            .filter(|n| n.kind == want)
            .collect())
    }

    pub async fn get_required_env_vars_for_service(&self, service: &str) -> Result<Vec<Node>> {
        self.one_hop(
            NodeKind::Service,
            service,
            EdgeKind::ServiceRequiresEnvVar,
            NodeKind::EnvVar,
        )
        .await
    }

    pub async fn get_services_impacted_by_incident(&self, incident_id: &str) -> Result<Vec<Node>> {
        self.one_hop(
            NodeKind::Incident,
            incident_id,
            EdgeKind::IncidentImpactsService,
            NodeKind::Service,
        )
        .await
    }

    pub async fn get_incidents_for_service(&self, service: &str) -> Result<Vec<Node>> {
        self.one_hop(
            NodeKind::Service,
            service,
            EdgeKind::IncidentImpactsService,
            NodeKind::Incident,
        )
        .await
    }

    /// Every node within `hops` of an entity over any edge type.
    pub async fn get_neighborhood(
        &self,
        kind: NodeKind,
        identifier: &str,
        hops: u32,
    ) -> Result<Vec<Neighbor>> {
        self.store
            .get_neighbors(&generate_node_id(kind, identifier), None, hops)
            .await
    }

    /// Two-hop subgraph around a service, split by kind. Risk factors are every
    /// edge inside the subgraph, including ones not touching the service.
    pub async fn get_incidents_related_to_rollout_risks(
        &self,
        service: &str,
    ) -> Result<RolloutRisks> {
        let subgraph = self
            .store
            .get_subgraph(&[generate_node_id(NodeKind::Service, service)], 2)
            .await?;

        Ok(RolloutRisks {
            incidents: subgraph.nodes_of(NodeKind::Incident).cloned().collect(),
            required_env_vars: subgraph.nodes_of(NodeKind::EnvVar).cloned().collect(),
            risk_factors: subgraph.edges,
        })
    }

    pub async fn find_missing_env_vars_for_rollout(
        &self,
        service: &str,
        present_env_vars: &[String],
    ) -> Result<MissingEnvVars> {
        let required_nodes = self.get_required_env_vars_for_service(service).await?;
        let supplied: HashSet<&str> = present_env_vars.iter().map(|k| k.trim()).collect();

        let mut report = MissingEnvVars::default();
        for node in required_nodes {
            let key = env_var_key(&node);
            report.required.push(key.clone());
            if supplied.contains(key.as_str()) {
                report.present.push(key);
            } else {
                report.missing.push(key);
                report.missing_nodes.push(node);
            }
        }
        Ok(report)
    }
}
