//! Integration tests for PgGraphStore.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.
//!
//! Tests share one database, so each uses its own identifiers instead of
//! truncating tables.

use serde_json::json;
use sqlx::PgPool;

use opsgraph_common::{Direction, EdgeKind, NodeKind, Properties};
use opsgraph_graph::{GraphError, GraphStore, PgGraphStore};

/// Get a migrated store, or skip if no test DB is available.
async fn test_store() -> Option<PgGraphStore> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;
    let store = PgGraphStore::new(pool);
    store.migrate().await.ok()?;
    Some(store)
}

fn props(value: serde_json::Value) -> Properties {
    value.as_object().cloned().unwrap_or_default()
}

async fn node(store: &PgGraphStore, id: &str, kind: NodeKind) {
    store
        .upsert_node(id, kind, Properties::new(), Properties::new())
        .await
        .unwrap();
}

async fn edge(store: &PgGraphStore, kind: EdgeKind, from: &str, to: &str) {
    store
        .upsert_edge(kind, from, to, Properties::new(), Properties::new())
        .await
        .unwrap();
}

// =========================================================================
// Upsert semantics
// =========================================================================

#[tokio::test]
async fn upsert_node_twice_keeps_one_row() {
    let Some(store) = test_store().await else {
        return;
    };
    let id = "svc:pg-idempotent";

    let first = store
        .upsert_node(id, NodeKind::Service, props(json!({"name": "pg-idempotent"})), Properties::new())
        .await
        .unwrap();
    let second = store
        .upsert_node(id, NodeKind::Service, props(json!({"name": "pg-idempotent"})), Properties::new())
        .await
        .unwrap();

    assert_eq!(first.properties, second.properties);
    assert_eq!(first.kind, second.kind);
    assert_eq!(first.created_at, second.created_at);
    assert!(second.updated_at >= first.updated_at);

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM graph_nodes WHERE id = $1")
        .bind(id)
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(count.0, 1);
}

#[tokio::test]
async fn upsert_node_with_other_kind_is_rejected() {
    let Some(store) = test_store().await else {
        return;
    };
    let id = "svc:pg-kind-clash";
    node(&store, id, NodeKind::Service).await;

    let err = store
        .upsert_node(id, NodeKind::EnvVar, Properties::new(), Properties::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GraphError::TypeMismatch {
            existing: NodeKind::Service,
            requested: NodeKind::EnvVar,
            ..
        }
    ));

    let stored = store.get_node(id).await.unwrap().unwrap();
    assert_eq!(stored.kind, NodeKind::Service);
}

#[tokio::test]
async fn upsert_edge_twice_updates_same_edge() {
    let Some(store) = test_store().await else {
        return;
    };
    node(&store, "svc:pg-edge", NodeKind::Service).await;
    node(&store, "env:PG_EDGE_KEY", NodeKind::EnvVar).await;

    let first = store
        .upsert_edge(
            EdgeKind::ServiceRequiresEnvVar,
            "svc:pg-edge",
            "env:PG_EDGE_KEY",
            props(json!({"note": "first"})),
            Properties::new(),
        )
        .await
        .unwrap();
    let second = store
        .upsert_edge(
            EdgeKind::ServiceRequiresEnvVar,
            "svc:pg-edge",
            "env:PG_EDGE_KEY",
            props(json!({"note": "second"})),
            Properties::new(),
        )
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.properties["note"], json!("second"));

    let edges = store
        .get_edges_by_node("svc:pg-edge", Direction::Outgoing)
        .await
        .unwrap();
    assert_eq!(edges.len(), 1);
}

#[tokio::test]
async fn dangling_edge_is_missing_endpoint() {
    let Some(store) = test_store().await else {
        return;
    };
    node(&store, "svc:pg-dangling", NodeKind::Service).await;

    let err = store
        .upsert_edge(
            EdgeKind::ServiceRequiresEnvVar,
            "svc:pg-dangling",
            "env:PG_NOWHERE",
            Properties::new(),
            Properties::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::MissingEndpoint { .. }));
}

// =========================================================================
// Traversal
// =========================================================================

#[tokio::test]
async fn neighbors_traverse_against_edge_direction() {
    let Some(store) = test_store().await else {
        return;
    };
    node(&store, "svc:pg-trav", NodeKind::Service).await;
    node(&store, "env:PG_TRAV", NodeKind::EnvVar).await;
    node(&store, "inc:PG-TRAV", NodeKind::Incident).await;
    edge(&store, EdgeKind::ServiceRequiresEnvVar, "svc:pg-trav", "env:PG_TRAV").await;
    edge(&store, EdgeKind::IncidentImpactsService, "inc:PG-TRAV", "svc:pg-trav").await;

    let from_env = store
        .get_neighbors("env:PG_TRAV", Some(EdgeKind::ServiceRequiresEnvVar), 1)
        .await
        .unwrap();
    assert_eq!(from_env.len(), 1);
    assert_eq!(from_env[0].node.id, "svc:pg-trav");
    assert_eq!(from_env[0].edge_type, EdgeKind::ServiceRequiresEnvVar);

    let from_incident = store.get_neighbors("inc:PG-TRAV", None, 2).await.unwrap();
    let reached: Vec<(&str, u32)> = from_incident
        .iter()
        .map(|n| (n.node.id.as_str(), n.level))
        .collect();
    assert_eq!(reached, vec![("svc:pg-trav", 1), ("env:PG_TRAV", 2)]);

    let bounded = store.get_neighbors("inc:PG-TRAV", None, 1).await.unwrap();
    assert_eq!(bounded.len(), 1);
}

#[tokio::test]
async fn subgraph_includes_edges_between_reached_nodes() {
    let Some(store) = test_store().await else {
        return;
    };
    node(&store, "svc:pg-sub-a", NodeKind::Service).await;
    node(&store, "svc:pg-sub-b", NodeKind::Service).await;
    node(&store, "env:PG_SUB_SHARED", NodeKind::EnvVar).await;
    node(&store, "inc:PG-SUB", NodeKind::Incident).await;
    edge(&store, EdgeKind::ServiceRequiresEnvVar, "svc:pg-sub-a", "env:PG_SUB_SHARED").await;
    edge(&store, EdgeKind::ServiceRequiresEnvVar, "svc:pg-sub-b", "env:PG_SUB_SHARED").await;
    edge(&store, EdgeKind::IncidentImpactsService, "inc:PG-SUB", "svc:pg-sub-b").await;

    let subgraph = store
        .get_subgraph(&["svc:pg-sub-a".to_string(), "inc:PG-SUB".to_string()], 1)
        .await
        .unwrap();

    let ids: Vec<&str> = subgraph.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["env:PG_SUB_SHARED", "inc:PG-SUB", "svc:pg-sub-a", "svc:pg-sub-b"]
    );
    // svc:pg-sub-b -> env:PG_SUB_SHARED was never walked but both ends were reached.
    assert_eq!(subgraph.edges.len(), 3);
}

#[tokio::test]
async fn delete_node_cascades_to_edges() {
    let Some(store) = test_store().await else {
        return;
    };
    node(&store, "svc:pg-cascade", NodeKind::Service).await;
    node(&store, "env:PG_CASCADE", NodeKind::EnvVar).await;
    edge(&store, EdgeKind::ServiceRequiresEnvVar, "svc:pg-cascade", "env:PG_CASCADE").await;

    assert!(store.delete_node("svc:pg-cascade").await.unwrap());
    let remaining = store
        .get_edges_by_node("env:PG_CASCADE", Direction::Both)
        .await
        .unwrap();
    assert!(remaining.is_empty());
    assert!(!store.delete_node("svc:pg-cascade").await.unwrap());
}
