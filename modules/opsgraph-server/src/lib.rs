pub mod rest;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use opsgraph_agents::{Ingestor, Planner, TextExtractor};
use opsgraph_graph::{EntitySchema, GraphStore};

pub struct AppState {
    pub store: Arc<dyn GraphStore>,
    pub ingestor: Ingestor,
    pub planner: Planner,
}

impl AppState {
    /// Both agents share one store through one schema.
    pub fn new(store: Arc<dyn GraphStore>, extractor: Arc<dyn TextExtractor>) -> Self {
        let schema = EntitySchema::new(store.clone());
        Self {
            store,
            ingestor: Ingestor::new(schema.clone(), extractor),
            planner: Planner::new(schema),
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(rest::health))
        // Ingestor
        .route("/api/graph/ingest", post(rest::ingest::api_ingest))
        .route(
            "/api/graph/ingest/deployment",
            post(rest::ingest::api_ingest_deployment),
        )
        .route(
            "/api/graph/ingest/incident",
            post(rest::ingest::api_ingest_incident),
        )
        // Planner
        .route("/api/graph/ask", post(rest::analysis::api_ask))
        .route(
            "/api/graph/analysis/{routine}",
            post(rest::analysis::api_analysis),
        )
        // Graph reads
        .route("/api/graph/nodes", get(rest::api_nodes))
        .route("/api/graph/nodes/{id}", get(rest::api_node_detail))
        .route("/api/graph/nodes/{id}/edges", get(rest::api_node_edges))
        .route("/api/graph/nodes/{id}/neighbors", get(rest::api_node_neighbors))
        .route("/api/graph/subgraph", post(rest::api_subgraph))
        .route("/api/graph/stats", get(rest::api_stats))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}
