//! HTTP boundary of the interview engine.
//!
//! Thin glue only: each handler deserializes the request, delegates to
//! the engine, and maps the error taxonomy onto HTTP statuses with a
//! `{"detail": ...}` body.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use vivavoce_core::{
    AnswerOutcome, Error, InterviewEngine, InterviewSummary, StartRequest, StartedInterview,
};

pub fn router(engine: Arc<InterviewEngine>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/session/start", post(start_session))
        .route("/session/{session_id}/answer", post(submit_answer))
        .route("/session/{session_id}/end", post(end_session))
        .with_state(engine)
}

async fn health() -> &'static str {
    "ok"
}

async fn start_session(
    State(engine): State<Arc<InterviewEngine>>,
    Json(request): Json<StartRequest>,
) -> Result<Json<StartedInterview>, ApiError> {
    Ok(Json(engine.start(request).await?))
}

#[derive(Debug, Deserialize)]
struct AnswerBody {
    answer_text: String,
}

async fn submit_answer(
    State(engine): State<Arc<InterviewEngine>>,
    Path(session_id): Path<Uuid>,
    Json(body): Json<AnswerBody>,
) -> Result<Json<AnswerOutcome>, ApiError> {
    Ok(Json(engine.submit_answer(session_id, &body.answer_text).await?))
}

async fn end_session(
    State(engine): State<Arc<InterviewEngine>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<InterviewSummary>, ApiError> {
    Ok(Json(engine.end(session_id).await?))
}

struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::SessionEnded => StatusCode::CONFLICT,
            Error::Transport(_) | Error::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
            Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = Json(serde_json::json!({ "detail": self.0.to_string() }));
        (status, body).into_response()
    }
}
