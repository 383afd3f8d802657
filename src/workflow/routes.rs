//! REST endpoints for reviewers: list open suspensions and resume them.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use crate::error::{Error, WorkflowError};
use crate::workflow::engine::WorkflowEngine;
use crate::workflow::review::ReviewDecision;

/// Shared state for review routes.
#[derive(Clone)]
pub struct ReviewRouteState {
    pub engine: Arc<WorkflowEngine>,
}

/// Map an engine error onto an HTTP response.
fn error_response(err: Error) -> Response {
    let status = match &err {
        Error::Workflow(WorkflowError::NoPendingReview(_)) => StatusCode::NOT_FOUND,
        Error::Workflow(
            WorkflowError::InvalidReviewDecision(_) | WorkflowError::UnsupportedEdit(_),
        ) => StatusCode::BAD_REQUEST,
        _ => {
            tracing::error!(error = %err, "Review request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(serde_json::json!({"error": err.to_string()}))).into_response()
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// GET /api/reviews
async fn list_reviews(State(state): State<ReviewRouteState>) -> Response {
    match state.engine.pending_reviews().await {
        Ok(reviews) => Json(reviews).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/reviews/{conversation_id}
async fn get_review(
    State(state): State<ReviewRouteState>,
    Path(conversation_id): Path<Uuid>,
) -> Response {
    match state.engine.pending_review(conversation_id).await {
        Ok(review) => Json(review).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/reviews/{conversation_id}
///
/// Body is a resumption value, e.g. `{"type": "accept"}`. Responds with the
/// outcome of the resumed run.
async fn resume_review(
    State(state): State<ReviewRouteState>,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let decision = match ReviewDecision::from_value(&body) {
        Ok(d) => d,
        Err(e) => return error_response(e.into()),
    };

    match state.engine.resume(conversation_id, decision).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => error_response(e),
    }
}

/// Build the reviewer REST routes.
pub fn review_routes(state: ReviewRouteState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/reviews", get(list_reviews))
        .route(
            "/api/reviews/{conversation_id}",
            get(get_review).post(resume_review),
        )
        .with_state(state)
}
