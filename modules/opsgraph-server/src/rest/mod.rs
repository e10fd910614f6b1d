pub mod analysis;
pub mod ingest;

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use tracing::warn;

use opsgraph_common::{Direction, EdgeKind, NodeKind};
use opsgraph_graph::DEFAULT_LIST_LIMIT;

use crate::AppState;

const MAX_LIST_LIMIT: usize = 1000;
const MAX_HOPS: u32 = 5;
const DEFAULT_SUBGRAPH_HOPS: u32 = 2;

// --- Query structs ---

#[derive(Deserialize)]
pub struct NodesQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct EdgesQuery {
    pub direction: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborsQuery {
    pub edge_type: Option<String>,
    pub hops: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubgraphRequest {
    pub node_ids: Vec<String>,
    pub max_hops: Option<u32>,
}

// --- Helpers ---

pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({"success": false, "error": message.into()})),
    )
        .into_response()
}

pub(crate) fn internal_error(error: impl std::fmt::Display, context: &str) -> Response {
    warn!(error = %error, "{context}");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, context)
}

fn clamp_hops(hops: Option<u32>, default: u32) -> u32 {
    hops.unwrap_or(default).clamp(1, MAX_HOPS)
}

// --- Handlers ---

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

pub async fn api_nodes(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NodesQuery>,
) -> Response {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let kinds = match params.kind.as_deref() {
        Some(raw) => match raw.parse::<NodeKind>() {
            Ok(kind) => vec![kind],
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
        },
        None => NodeKind::ALL.to_vec(),
    };

    let mut nodes = Vec::new();
    for kind in kinds {
        match state.store.get_nodes_by_type(kind, limit).await {
            Ok(batch) => nodes.extend(batch),
            Err(e) => return internal_error(e, "Failed to list nodes"),
        }
    }
    // Merge across kinds so one busy kind cannot crowd out the others.
    nodes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
    nodes.truncate(limit);
    Json(nodes).into_response()
}

pub async fn api_node_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.store.get_node(&id).await {
        Ok(Some(node)) => Json(node).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("Node '{id}' not found")),
        Err(e) => internal_error(e, "Failed to load node"),
    }
}

pub async fn api_node_edges(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<EdgesQuery>,
) -> Response {
    let direction = match params.direction.as_deref().map(str::parse::<Direction>) {
        None => Direction::Both,
        Some(Ok(direction)) => direction,
        Some(Err(e)) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };
    match state.store.get_edges_by_node(&id, direction).await {
        Ok(edges) => Json(edges).into_response(),
        Err(e) => internal_error(e, "Failed to load edges"),
    }
}

pub async fn api_node_neighbors(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<NeighborsQuery>,
) -> Response {
    let edge_type = match params.edge_type.as_deref().map(str::parse::<EdgeKind>) {
        None => None,
        Some(Ok(kind)) => Some(kind),
        Some(Err(e)) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let hops = clamp_hops(params.hops, 1);
    match state.store.get_neighbors(&id, edge_type, hops).await {
        Ok(neighbors) => Json(neighbors).into_response(),
        Err(e) => internal_error(e, "Failed to traverse neighbors"),
    }
}

pub async fn api_subgraph(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubgraphRequest>,
) -> Response {
    if body.node_ids.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "nodeIds must not be empty");
    }
    let hops = clamp_hops(body.max_hops, DEFAULT_SUBGRAPH_HOPS);
    match state.store.get_subgraph(&body.node_ids, hops).await {
        Ok(subgraph) => Json(subgraph).into_response(),
        Err(e) => internal_error(e, "Failed to load subgraph"),
    }
}

pub async fn api_stats(State(state): State<Arc<AppState>>) -> Response {
    match state.store.stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => internal_error(e, "Failed to load graph stats"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hops_are_clamped() {
        assert_eq!(clamp_hops(None, 2), 2);
        assert_eq!(clamp_hops(Some(0), 2), 1);
        assert_eq!(clamp_hops(Some(50), 2), MAX_HOPS);
    }
}
