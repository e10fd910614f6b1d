use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use tracing::{info, warn};

use opsgraph_agents::{IngestError, IngestOptions, IngestReport};

use super::{error_response, internal_error};
use crate::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    pub text: String,
    #[serde(flatten)]
    pub options: IngestOptions,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentIngestRequest {
    pub text: String,
    pub service_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentIngestRequest {
    pub text: String,
    pub incident_id: String,
}

fn respond(result: Result<IngestReport, IngestError>) -> Response {
    match result {
        Ok(report) => {
            info!("{report}");
            Json(report).into_response()
        }
        Err(IngestError::Extraction(message)) => {
            warn!(error = %message, "Ingest rejected");
            error_response(StatusCode::UNPROCESSABLE_ENTITY, message)
        }
        Err(IngestError::Storage(e)) => internal_error(e, "Graph storage failed during ingest"),
    }
}

pub async fn api_ingest(
    State(state): State<Arc<AppState>>,
    Json(body): Json<IngestRequest>,
) -> Response {
    if body.text.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "text is required");
    }
    respond(state.ingestor.ingest(&body.text, body.options).await)
}

pub async fn api_ingest_deployment(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DeploymentIngestRequest>,
) -> Response {
    if body.text.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "text is required");
    }
    if body.service_name.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "serviceName is required");
    }
    respond(
        state
            .ingestor
            .ingest_deployment_info(&body.text, &body.service_name)
            .await,
    )
}

pub async fn api_ingest_incident(
    State(state): State<Arc<AppState>>,
    Json(body): Json<IncidentIngestRequest>,
) -> Response {
    if body.text.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "text is required");
    }
    if body.incident_id.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "incidentId is required");
    }
    respond(
        state
            .ingestor
            .ingest_incident_info(&body.text, &body.incident_id)
            .await,
    )
}
