use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;

use opsgraph_agents::{PlannerAnswer, QuestionContext, Routine};
use opsgraph_graph::GraphError;

use super::{error_response, internal_error};
use crate::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub context: QuestionContext,
}

/// Declined answers are still answers: they go out with 200 and
/// `success: false`. Only storage failures become 500s.
fn respond(result: Result<PlannerAnswer, GraphError>) -> Response {
    match result {
        Ok(answer) => Json(answer).into_response(),
        Err(e) => internal_error(e, "Graph storage failed during analysis"),
    }
}

pub async fn api_ask(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AskRequest>,
) -> Response {
    if body.question.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "question is required");
    }
    respond(
        state
            .planner
            .answer_question(&body.question, &body.context)
            .await,
    )
}

pub async fn api_analysis(
    State(state): State<Arc<AppState>>,
    Path(routine): Path<String>,
    Json(context): Json<QuestionContext>,
) -> Response {
    let routine = match routine.parse::<Routine>() {
        Ok(routine) => routine,
        Err(message) => return error_response(StatusCode::NOT_FOUND, message),
    };
    respond(state.planner.run(routine, &context).await)
}
