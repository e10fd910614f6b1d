// Test mocks for the agents.
//
// - MockExtractor (TextExtractor): canned responses keyed by a substring of
//   the source text, with an optional default and a scripted failure mode.
// - FailingStore (GraphStore): in-memory store whose calls touching chosen
//   node ids fail the way an unreachable database does.
// - Graph fixtures: the crm7 deployment graph on an InMemoryGraphStore.

use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use opsgraph_common::{
    Direction, Edge, EdgeKind, GraphStats, Neighbor, Node, NodeKind, Properties, SourceInfo,
    Subgraph,
};
use opsgraph_graph::{EntitySchema, GraphError, GraphStore, InMemoryGraphStore};

use crate::extractor::TextExtractor;

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// Returns `Err` for prompts no registered needle matches, unless a default
/// response is set.
pub struct MockExtractor {
    responses: Vec<(String, String)>,
    default_response: Option<String>,
    failure: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self {
            responses: Vec::new(),
            default_response: None,
            failure: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Respond with `response` when the prompt contains `needle`.
    pub fn on_text(mut self, needle: &str, response: impl Into<String>) -> Self {
        self.responses.push((needle.to_string(), response.into()));
        self
    }

    pub fn with_default(mut self, response: impl Into<String>) -> Self {
        self.default_response = Some(response.into());
        self
    }

    /// Every call fails, as an unreachable extraction backend would.
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Default for MockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextExtractor for MockExtractor {
    async fn extract(&self, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(prompt.to_string());

        if let Some(message) = &self.failure {
            bail!("MockExtractor: {message}");
        }
        if let Some((_, response)) = self
            .responses
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
        {
            return Ok(response.clone());
        }
        if let Some(default) = &self.default_response {
            return Ok(default.clone());
        }
        bail!("MockExtractor: no response registered for prompt")
    }
}

// ---------------------------------------------------------------------------
// FailingStore
// ---------------------------------------------------------------------------

type GraphResult<T> = std::result::Result<T, GraphError>;

/// Delegates to an `InMemoryGraphStore`, except that any call naming one of
/// the registered node ids returns a pool timeout instead.
#[derive(Default)]
pub struct FailingStore {
    inner: InMemoryGraphStore,
    failing_ids: Vec<String>,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call that reads or writes `node_id`.
    pub fn fail_on(mut self, node_id: &str) -> Self {
        self.failing_ids.push(node_id.to_string());
        self
    }

    fn check(&self, ids: &[&str]) -> GraphResult<()> {
        if ids.iter().any(|id| self.failing_ids.iter().any(|f| f == id)) {
            return Err(GraphError::Storage(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl GraphStore for FailingStore {
    async fn upsert_node(
        &self,
        id: &str,
        kind: NodeKind,
        properties: Properties,
        source_info: Properties,
    ) -> GraphResult<Node> {
        self.check(&[id])?;
        self.inner.upsert_node(id, kind, properties, source_info).await
    }

    async fn get_node(&self, id: &str) -> GraphResult<Option<Node>> {
        self.check(&[id])?;
        self.inner.get_node(id).await
    }

    async fn get_nodes_by_type(
        &self,
        kind: NodeKind,
        limit: usize,
    ) -> GraphResult<Vec<Node>> {
        self.inner.get_nodes_by_type(kind, limit).await
    }

    async fn upsert_edge(
        &self,
        kind: EdgeKind,
        from: &str,
        to: &str,
        properties: Properties,
        source_info: Properties,
    ) -> GraphResult<Edge> {
        self.check(&[from, to])?;
        self.inner.upsert_edge(kind, from, to, properties, source_info).await
    }

    async fn get_edges_by_node(
        &self,
        node_id: &str,
        direction: Direction,
    ) -> GraphResult<Vec<Edge>> {
        self.check(&[node_id])?;
        self.inner.get_edges_by_node(node_id, direction).await
    }

    async fn get_edges_by_type(
        &self,
        kind: EdgeKind,
        limit: usize,
    ) -> GraphResult<Vec<Edge>> {
        self.inner.get_edges_by_type(kind, limit).await
    }

    async fn get_neighbors(
        &self,
        node_id: &str,
        edge_kind: Option<EdgeKind>,
        hops: u32,
    ) -> GraphResult<Vec<Neighbor>> {
        self.check(&[node_id])?;
        self.inner.get_neighbors(node_id, edge_kind, hops).await
    }

    async fn get_subgraph(
        &self,
        node_ids: &[String],
        max_hops: u32,
    ) -> GraphResult<Subgraph> {
        let seeds: Vec<&str> = node_ids.iter().map(String::as_str).collect();
        self.check(&seeds)?;
        self.inner.get_subgraph(node_ids, max_hops).await
    }

    async fn delete_node(&self, id: &str) -> GraphResult<bool> {
        self.check(&[id])?;
        self.inner.delete_node(id).await
    }

    async fn stats(&self) -> GraphResult<GraphStats> {
        self.inner.stats().await
    }
}

// ---------------------------------------------------------------------------
// Extraction payloads
// ---------------------------------------------------------------------------

pub fn entity(kind: &str, identifier: &str) -> Value {
    json!({"type": kind, "identifier": identifier, "properties": {}})
}

pub fn entity_with(kind: &str, identifier: &str, properties: Value) -> Value {
    json!({"type": kind, "identifier": identifier, "properties": properties})
}

pub fn relationship(kind: &str, from: &str, to: &str) -> Value {
    json!({"type": kind, "from": from, "to": to, "properties": {}})
}

/// A well-formed extraction response body.
pub fn extraction_response(entities: Vec<Value>, relationships: Vec<Value>) -> String {
    json!({"entities": entities, "relationships": relationships}).to_string()
}

/// What a model would return for "crm7 on Vercel requires SUPABASE_URL,
/// SUPABASE_ANON_KEY".
pub fn crm7_extraction() -> String {
    extraction_response(
        vec![
            entity_with("Service", "crm7", json!({"platform": "Vercel"})),
            entity("EnvVar", "SUPABASE_URL"),
            entity("EnvVar", "SUPABASE_ANON_KEY"),
        ],
        vec![
            relationship("SERVICE_REQUIRES_ENVVAR", "crm7", "SUPABASE_URL"),
            relationship("SERVICE_REQUIRES_ENVVAR", "crm7", "SUPABASE_ANON_KEY"),
        ],
    )
}

// ---------------------------------------------------------------------------
// Graph fixtures
// ---------------------------------------------------------------------------

pub fn memory_schema() -> EntitySchema {
    EntitySchema::new(Arc::new(InMemoryGraphStore::new()))
}

pub fn fixture_source() -> Properties {
    SourceInfo::new("fixture").to_properties()
}

pub fn props(value: Value) -> Properties {
    value.as_object().cloned().unwrap_or_default()
}

/// crm7 requiring SUPABASE_URL and SUPABASE_ANON_KEY.
pub async fn crm7_schema() -> EntitySchema {
    let schema = memory_schema();
    let source = fixture_source();
    schema
        .create_service("crm7", props(json!({"platform": "Vercel"})), &source)
        .await
        .expect("create crm7");
    for key in ["SUPABASE_URL", "SUPABASE_ANON_KEY"] {
        schema
            .create_env_var(key, Properties::new(), &source)
            .await
            .expect("create env var");
        schema
            .link_service_requires_env_var("crm7", key, Properties::new(), &source)
            .await
            .expect("link env var");
    }
    schema
}

/// Add an incident impacting `service`.
pub async fn add_incident(schema: &EntitySchema, incident_id: &str, service: &str, cause: &str) {
    let source = fixture_source();
    schema
        .create_incident(incident_id, props(json!({"cause": cause})), &source)
        .await
        .expect("create incident");
    schema
        .link_incident_impacts_service(incident_id, service, Properties::new(), &source)
        .await
        .expect("link incident");
}
