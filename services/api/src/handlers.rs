//! Axum Handlers for the REST API
//!
//! This module contains the logic for handling HTTP requests for debate session
//! management. It uses `utoipa` doc comments to generate OpenAPI documentation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use debate_core::DebateError;
use std::sync::Arc;
use tracing::error;

use crate::{
    models::{CreateDebatePayload, CreateDebateResponse, DebateView, ErrorResponse},
    state::AppState,
};

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl From<DebateError> for ApiError {
    fn from(err: DebateError) -> Self {
        match err {
            DebateError::InvalidSession(id) => {
                Self::NotFound(format!("Debate session '{}' not found", id))
            }
            other => Self::InternalServerError(other.into()),
        }
    }
}

/// Create (or reset) a debate session.
#[utoipa::path(
    post,
    path = "/debate/create",
    request_body = CreateDebatePayload,
    responses(
        (status = 200, description = "Session created successfully", body = CreateDebateResponse),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn create_debate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDebatePayload>,
) -> Result<Json<CreateDebateResponse>, ApiError> {
    let topic = payload.topic.trim();
    if topic.is_empty() {
        return Err(ApiError::BadRequest("topic must not be empty".to_string()));
    }

    let session_id = state
        .sessions
        .create(topic, payload.user_side, payload.session_id)
        .await?;

    Ok(Json(CreateDebateResponse { session_id }))
}

/// Get the current state of a debate session.
#[utoipa::path(
    get,
    path = "/debate/{session_id}",
    responses(
        (status = 200, description = "Debate details", body = DebateView),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("session_id" = String, Path, description = "Debate session ID")
    )
)]
pub async fn get_debate(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<DebateView>, ApiError> {
    let snapshot = state.sessions.snapshot(&session_id).await?;
    Ok(Json(DebateView::new(session_id, snapshot)))
}
