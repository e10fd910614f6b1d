//! Postgres-backed GraphStore.
//!
//! Nodes live in `graph_nodes`, edges in `graph_edges` with
//! `ON DELETE CASCADE` foreign keys to both endpoints and a unique
//! `(edge_type, from_node, to_node)` constraint. Traversal is a recursive CTE
//! over the edge table in both directions.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, info};

use opsgraph_common::{
    Direction, Edge, EdgeKind, GraphStats, Neighbor, Node, NodeKind, Properties, Subgraph,
};

use crate::error::{GraphError, Result};
use crate::store::GraphStore;

const NODE_COLUMNS: &str = "id, node_type, properties, source_info, created_at, updated_at";
const EDGE_COLUMNS: &str =
    "id, edge_type, from_node, to_node, properties, source_info, created_at, updated_at";

/// Undirected BFS from `$1`, bounded by `$2` hops, optionally restricted to
/// edge type `$3`. `first_seen` keeps each node's lowest level.
const NEIGHBORS_SQL: &str = r#"
    WITH RECURSIVE traversal(node_id, level, edge_type) AS (
        SELECT $1::text, 0, NULL::text
        UNION
        SELECT CASE WHEN e.from_node = t.node_id THEN e.to_node ELSE e.from_node END,
               t.level + 1,
               e.edge_type
        FROM traversal t
        JOIN graph_edges e ON e.from_node = t.node_id OR e.to_node = t.node_id
        WHERE t.level < $2
          AND ($3::text IS NULL OR e.edge_type = $3::text)
    ),
    first_seen AS (
        SELECT DISTINCT ON (node_id) node_id, level, edge_type
        FROM traversal
        ORDER BY node_id, level, edge_type NULLS FIRST
    )
    SELECT n.id, n.node_type, n.properties, n.source_info, n.created_at, n.updated_at,
           f.level, f.edge_type
    FROM first_seen f
    JOIN graph_nodes n ON n.id = f.node_id
    WHERE f.level > 0
    ORDER BY f.level, n.id
"#;

/// Every node id within `$2` hops of any id in `$1`.
const SUBGRAPH_NODES_SQL: &str = r#"
    WITH RECURSIVE traversal(node_id, level) AS (
        SELECT seed, 0 FROM UNNEST($1::text[]) AS seed
        UNION
        SELECT CASE WHEN e.from_node = t.node_id THEN e.to_node ELSE e.from_node END,
               t.level + 1
        FROM traversal t
        JOIN graph_edges e ON e.from_node = t.node_id OR e.to_node = t.node_id
        WHERE t.level < $2
    )
    SELECT n.id, n.node_type, n.properties, n.source_info, n.created_at, n.updated_at
    FROM graph_nodes n
    WHERE n.id IN (SELECT node_id FROM traversal)
    ORDER BY n.id
"#;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, sqlx::FromRow)]
struct NodeRow {
    id: String,
    node_type: String,
    properties: serde_json::Value,
    source_info: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<NodeRow> for Node {
    type Error = GraphError;

    fn try_from(row: NodeRow) -> Result<Self> {
        let kind = row
            .node_type
            .parse::<NodeKind>()
            .map_err(|e| GraphError::Decode(format!("node {}: {e}", row.id)))?;
        Ok(Node {
            id: row.id,
            kind,
            properties: into_object(row.properties),
            source_info: into_object(row.source_info),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EdgeRow {
    id: i64,
    edge_type: String,
    from_node: String,
    to_node: String,
    properties: serde_json::Value,
    source_info: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EdgeRow> for Edge {
    type Error = GraphError;

    fn try_from(row: EdgeRow) -> Result<Self> {
        let kind = row
            .edge_type
            .parse::<EdgeKind>()
            .map_err(|e| GraphError::Decode(format!("edge {}: {e}", row.id)))?;
        Ok(Edge {
            id: row.id,
            kind,
            from_node: row.from_node,
            to_node: row.to_node,
            properties: into_object(row.properties),
            source_info: into_object(row.source_info),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NeighborRow {
    #[sqlx(flatten)]
    node: NodeRow,
    level: i32,
    edge_type: String,
}

impl TryFrom<NeighborRow> for Neighbor {
    type Error = GraphError;

    fn try_from(row: NeighborRow) -> Result<Self> {
        let edge_type = row
            .edge_type
            .parse::<EdgeKind>()
            .map_err(|e| GraphError::Decode(format!("neighbor {}: {e}", row.node.id)))?;
        Ok(Neighbor {
            node: row.node.try_into()?,
            level: row.level.max(0) as u32,
            edge_type,
        })
    }
}

fn into_object(value: serde_json::Value) -> Properties {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Properties::new(),
    }
}

fn collect<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = GraphError>,
{
    rows.into_iter().map(T::try_from).collect()
}

fn clamp_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn clamp_hops(hops: u32) -> i32 {
    i32::try_from(hops).unwrap_or(i32::MAX)
}

// ---------------------------------------------------------------------------
// PgGraphStore
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgGraphStore {
    pool: PgPool,
}

impl PgGraphStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!(max_connections, "Connected to graph database");
        Ok(Self::new(pool))
    }

    /// Run the embedded schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Graph migrations complete");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl GraphStore for PgGraphStore {
    async fn upsert_node(
        &self,
        id: &str,
        kind: NodeKind,
        properties: Properties,
        source_info: Properties,
    ) -> Result<Node> {
        // The conditional DO UPDATE leaves a differently-typed row untouched
        // and returns nothing, which is reported as a mismatch below.
        let row = sqlx::query_as::<_, NodeRow>(&format!(
            r#"
            INSERT INTO graph_nodes (id, node_type, properties, source_info)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                properties = EXCLUDED.properties,
                source_info = EXCLUDED.source_info,
                updated_at = GREATEST(now(), graph_nodes.updated_at)
            WHERE graph_nodes.node_type = EXCLUDED.node_type
            RETURNING {NODE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(kind.as_str())
        .bind(Json(&properties))
        .bind(Json(&source_info))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                debug!(id, kind = %kind, "Upserted node");
                row.try_into()
            }
            None => {
                let existing = self
                    .get_node(id)
                    .await?
                    .map(|n| n.kind)
                    .ok_or_else(|| GraphError::Decode(format!("node {id} vanished during upsert")))?;
                Err(GraphError::TypeMismatch {
                    id: id.to_string(),
                    existing,
                    requested: kind,
                })
            }
        }
    }

    async fn get_node(&self, id: &str) -> Result<Option<Node>> {
        let row = sqlx::query_as::<_, NodeRow>(&format!(
            "SELECT {NODE_COLUMNS} FROM graph_nodes WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Node::try_from).transpose()
    }

    async fn get_nodes_by_type(&self, kind: NodeKind, limit: usize) -> Result<Vec<Node>> {
        let rows = sqlx::query_as::<_, NodeRow>(&format!(
            r#"
            SELECT {NODE_COLUMNS} FROM graph_nodes
            WHERE node_type = $1
            ORDER BY updated_at DESC, id
            LIMIT $2
            "#
        ))
        .bind(kind.as_str())
        .bind(clamp_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        collect(rows)
    }

    async fn upsert_edge(
        &self,
        kind: EdgeKind,
        from: &str,
        to: &str,
        properties: Properties,
        source_info: Properties,
    ) -> Result<Edge> {
        let row = sqlx::query_as::<_, EdgeRow>(&format!(
            r#"
            INSERT INTO graph_edges (edge_type, from_node, to_node, properties, source_info)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (edge_type, from_node, to_node) DO UPDATE SET
                properties = EXCLUDED.properties,
                source_info = EXCLUDED.source_info,
                updated_at = GREATEST(now(), graph_edges.updated_at)
            RETURNING {EDGE_COLUMNS}
            "#
        ))
        .bind(kind.as_str())
        .bind(from)
        .bind(to)
        .bind(Json(&properties))
        .bind(Json(&source_info))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                GraphError::MissingEndpoint {
                    kind,
                    from: from.to_string(),
                    to: to.to_string(),
                }
            }
            other => GraphError::Storage(other),
        })?;

        debug!(kind = %kind, from, to, "Upserted edge");
        row.try_into()
    }

    async fn get_edges_by_node(&self, node_id: &str, direction: Direction) -> Result<Vec<Edge>> {
        let filter = match direction {
            Direction::Outgoing => "from_node = $1",
            Direction::Incoming => "to_node = $1",
            Direction::Both => "from_node = $1 OR to_node = $1",
        };
        let rows = sqlx::query_as::<_, EdgeRow>(&format!(
            "SELECT {EDGE_COLUMNS} FROM graph_edges WHERE {filter} ORDER BY id"
        ))
        .bind(node_id)
        .fetch_all(&self.pool)
        .await?;

        collect(rows)
    }

    async fn get_edges_by_type(&self, kind: EdgeKind, limit: usize) -> Result<Vec<Edge>> {
        let rows = sqlx::query_as::<_, EdgeRow>(&format!(
            "SELECT {EDGE_COLUMNS} FROM graph_edges WHERE edge_type = $1 ORDER BY id LIMIT $2"
        ))
        .bind(kind.as_str())
        .bind(clamp_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        collect(rows)
    }

    async fn get_neighbors(
        &self,
        node_id: &str,
        edge_kind: Option<EdgeKind>,
        hops: u32,
    ) -> Result<Vec<Neighbor>> {
        let rows = sqlx::query_as::<_, NeighborRow>(NEIGHBORS_SQL)
            .bind(node_id)
            .bind(clamp_hops(hops))
            .bind(edge_kind.map(|k| k.as_str()))
            .fetch_all(&self.pool)
            .await?;

        collect(rows)
    }

    async fn get_subgraph(&self, node_ids: &[String], max_hops: u32) -> Result<Subgraph> {
        if node_ids.is_empty() {
            return Ok(Subgraph::default());
        }

        let node_rows = sqlx::query_as::<_, NodeRow>(SUBGRAPH_NODES_SQL)
            .bind(node_ids)
            .bind(clamp_hops(max_hops))
            .fetch_all(&self.pool)
            .await?;
        let nodes: Vec<Node> = collect(node_rows)?;

        let reached: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
        let edge_rows = sqlx::query_as::<_, EdgeRow>(&format!(
            r#"
            SELECT {EDGE_COLUMNS} FROM graph_edges
            WHERE from_node = ANY($1) AND to_node = ANY($1)
            ORDER BY id
            "#
        ))
        .bind(&reached)
        .fetch_all(&self.pool)
        .await?;

        Ok(Subgraph {
            nodes,
            edges: collect(edge_rows)?,
        })
    }

    async fn delete_node(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM graph_nodes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn stats(&self) -> Result<GraphStats> {
        let node_counts = sqlx::query_as::<_, (String, i64)>(
            "SELECT node_type, COUNT(*) FROM graph_nodes GROUP BY node_type",
        )
        .fetch_all(&self.pool)
        .await?;
        let edge_counts = sqlx::query_as::<_, (String, i64)>(
            "SELECT edge_type, COUNT(*) FROM graph_edges GROUP BY edge_type",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut nodes_by_type = BTreeMap::new();
        for (kind, count) in node_counts {
            let kind = kind
                .parse::<NodeKind>()
                .map_err(|e| GraphError::Decode(e.to_string()))?;
            nodes_by_type.insert(kind, count);
        }
        let mut edges_by_type = BTreeMap::new();
        for (kind, count) in edge_counts {
            let kind = kind
                .parse::<EdgeKind>()
                .map_err(|e| GraphError::Decode(e.to_string()))?;
            edges_by_type.insert(kind, count);
        }

        Ok(GraphStats {
            total_nodes: nodes_by_type.values().sum(),
            total_edges: edges_by_type.values().sum(),
            nodes_by_type,
            edges_by_type,
        })
    }
}
