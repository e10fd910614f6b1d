// In-memory GraphStore.
//
// Same upsert, cascade and traversal semantics as PgGraphStore, held in
// ordered maps behind a mutex. Used by agent tests and by the server when no
// DATABASE_URL is configured.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use opsgraph_common::{
    Direction, Edge, EdgeKind, GraphStats, Neighbor, Node, NodeKind, Properties, Subgraph,
};

use crate::error::{GraphError, Result};
use crate::store::GraphStore;
use crate::traversal;

#[derive(Default)]
struct MemoryGraph {
    nodes: BTreeMap<String, Node>,
    edges: BTreeMap<i64, Edge>,
    edge_keys: HashMap<(EdgeKind, String, String), i64>,
    last_edge_id: i64,
}

#[derive(Default)]
pub struct InMemoryGraphStore {
    graph: Mutex<MemoryGraph>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryGraph> {
        self.graph.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn upsert_node(
        &self,
        id: &str,
        kind: NodeKind,
        properties: Properties,
        source_info: Properties,
    ) -> Result<Node> {
        let mut graph = self.lock();
        let now = Utc::now();

        let node = match graph.nodes.get(id) {
            Some(existing) if existing.kind != kind => {
                return Err(GraphError::TypeMismatch {
                    id: id.to_string(),
                    existing: existing.kind,
                    requested: kind,
                });
            }
            Some(existing) => Node {
                properties,
                source_info,
                updated_at: now.max(existing.updated_at),
                ..existing.clone()
            },
            None => Node {
                id: id.to_string(),
                kind,
                properties,
                source_info,
                created_at: now,
                updated_at: now,
            },
        };

        debug!(id, kind = %kind, "Upserted node");
        graph.nodes.insert(id.to_string(), node.clone());
        Ok(node)
    }

    async fn get_node(&self, id: &str) -> Result<Option<Node>> {
        Ok(self.lock().nodes.get(id).cloned())
    }

    async fn get_nodes_by_type(&self, kind: NodeKind, limit: usize) -> Result<Vec<Node>> {
        let graph = self.lock();
        let mut nodes: Vec<Node> = graph
            .nodes
            .values()
            .filter(|n| n.kind == kind)
            .cloned()
            .collect();
        nodes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        nodes.truncate(limit);
        Ok(nodes)
    }

    async fn upsert_edge(
        &self,
        kind: EdgeKind,
        from: &str,
        to: &str,
        properties: Properties,
        source_info: Properties,
    ) -> Result<Edge> {
        let mut graph = self.lock();

        if !graph.nodes.contains_key(from) || !graph.nodes.contains_key(to) {
            return Err(GraphError::MissingEndpoint {
                kind,
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let now = Utc::now();
        let key = (kind, from.to_string(), to.to_string());
        let existing = graph
            .edge_keys
            .get(&key)
            .and_then(|id| graph.edges.get(id))
            .cloned();

        let edge = match existing {
            Some(existing) => Edge {
                properties,
                source_info,
                updated_at: now.max(existing.updated_at),
                ..existing
            },
            None => {
                graph.last_edge_id += 1;
                Edge {
                    id: graph.last_edge_id,
                    kind,
                    from_node: from.to_string(),
                    to_node: to.to_string(),
                    properties,
                    source_info,
                    created_at: now,
                    updated_at: now,
                }
            }
        };

        debug!(kind = %kind, from, to, "Upserted edge");
        graph.edge_keys.insert(key, edge.id);
        graph.edges.insert(edge.id, edge.clone());
        Ok(edge)
    }

    async fn get_edges_by_node(&self, node_id: &str, direction: Direction) -> Result<Vec<Edge>> {
        let graph = self.lock();
        Ok(graph
            .edges
            .values()
            .filter(|e| match direction {
                Direction::Outgoing => e.from_node == node_id,
                Direction::Incoming => e.to_node == node_id,
                Direction::Both => e.touches(node_id),
            })
            .cloned()
            .collect())
    }

    async fn get_edges_by_type(&self, kind: EdgeKind, limit: usize) -> Result<Vec<Edge>> {
        let graph = self.lock();
        Ok(graph
            .edges
            .values()
            .filter(|e| e.kind == kind)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_neighbors(
        &self,
        node_id: &str,
        edge_kind: Option<EdgeKind>,
        hops: u32,
    ) -> Result<Vec<Neighbor>> {
        let graph = self.lock();
        let reached = traversal::expand(graph.edges.values(), &[node_id], hops, edge_kind);

        let mut neighbors: Vec<Neighbor> = reached
            .into_iter()
            .filter_map(|(id, r)| {
                let edge_type = r.edge_kind?;
                let node = graph.nodes.get(&id)?.clone();
                Some(Neighbor {
                    node,
                    level: r.level,
                    edge_type,
                })
            })
            .collect();
        neighbors.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.node.id.cmp(&b.node.id)));
        Ok(neighbors)
    }

    async fn get_subgraph(&self, node_ids: &[String], max_hops: u32) -> Result<Subgraph> {
        let graph = self.lock();
        let seeds: Vec<&str> = node_ids.iter().map(String::as_str).collect();
        let reached = traversal::expand(graph.edges.values(), &seeds, max_hops, None);

        let nodes: Vec<Node> = reached
            .keys()
            .filter_map(|id| graph.nodes.get(id).cloned())
            .collect();
        let edges: Vec<Edge> = graph
            .edges
            .values()
            .filter(|e| reached.contains_key(&e.from_node) && reached.contains_key(&e.to_node))
            .cloned()
            .collect();

        Ok(Subgraph { nodes, edges })
    }

    async fn delete_node(&self, id: &str) -> Result<bool> {
        let mut graph = self.lock();
        if graph.nodes.remove(id).is_none() {
            return Ok(false);
        }

        let doomed: Vec<Edge> = graph
            .edges
            .values()
            .filter(|e| e.touches(id))
            .cloned()
            .collect();
        for edge in doomed {
            graph.edges.remove(&edge.id);
            graph
                .edge_keys
                .remove(&(edge.kind, edge.from_node, edge.to_node));
        }
        Ok(true)
    }

    async fn stats(&self) -> Result<GraphStats> {
        let graph = self.lock();
        let mut stats = GraphStats {
            total_nodes: graph.nodes.len() as i64,
            total_edges: graph.edges.len() as i64,
            ..Default::default()
        };
        for node in graph.nodes.values() {
            *stats.nodes_by_type.entry(node.kind).or_default() += 1;
        }
        for edge in graph.edges.values() {
            *stats.edges_by_type.entry(edge.kind).or_default() += 1;
        }
        Ok(stats)
    }
}
