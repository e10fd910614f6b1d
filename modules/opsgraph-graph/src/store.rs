use async_trait::async_trait;

use opsgraph_common::{
    Direction, Edge, EdgeKind, GraphStats, Neighbor, Node, NodeKind, Properties, Subgraph,
};

use crate::error::Result;

/// Default row limit for the list operations when a caller has none.
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Durable node/edge storage and traversal.
///
/// Nodes upsert by `id`, edges by `(type, from, to)`. Traversal treats edges
/// as undirected for reachability; direction stays on the edge records.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Insert or update a node. `updated_at` never moves backwards. Fails with
    /// `TypeMismatch` when `id` is already stored under another kind.
    async fn upsert_node(
        &self,
        id: &str,
        kind: NodeKind,
        properties: Properties,
        source_info: Properties,
    ) -> Result<Node>;

    async fn get_node(&self, id: &str) -> Result<Option<Node>>;

    /// Most recently updated first.
    async fn get_nodes_by_type(&self, kind: NodeKind, limit: usize) -> Result<Vec<Node>>;

    /// Insert or update the edge keyed by `(kind, from, to)`. Fails with
    /// `MissingEndpoint` when either node does not exist.
    async fn upsert_edge(
        &self,
        kind: EdgeKind,
        from: &str,
        to: &str,
        properties: Properties,
        source_info: Properties,
    ) -> Result<Edge>;

    async fn get_edges_by_node(&self, node_id: &str, direction: Direction) -> Result<Vec<Edge>>;

    async fn get_edges_by_type(&self, kind: EdgeKind, limit: usize) -> Result<Vec<Edge>>;

    /// Nodes within `hops` undirected steps of `node_id`, excluding the origin,
    /// each tagged with the level it was first reached at. Ordered by
    /// `(level, id)`.
    async fn get_neighbors(
        &self,
        node_id: &str,
        edge_kind: Option<EdgeKind>,
        hops: u32,
    ) -> Result<Vec<Neighbor>>;

    /// Every node within `max_hops` of any seed (seeds included) and every
    /// edge whose endpoints are both in that set.
    async fn get_subgraph(&self, node_ids: &[String], max_hops: u32) -> Result<Subgraph>;

    /// Remove a node and, by cascade, every edge touching it.
    async fn delete_node(&self, id: &str) -> Result<bool>;

    async fn stats(&self) -> Result<GraphStats>;
}
