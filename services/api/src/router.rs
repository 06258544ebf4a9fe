//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, WebSocket endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        CreateDebatePayload, CreateDebateResponse, DebateStatus, DebateView, ErrorResponse,
        MessageView,
    },
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::create_debate,
        handlers::get_debate,
    ),
    components(
        schemas(CreateDebatePayload, CreateDebateResponse, DebateView, MessageView, DebateStatus, ErrorResponse)
    ),
    tags(
        (name = "Debate API", description = "Session management for AI-moderated debates")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/debate/create", post(handlers::create_debate))
        .route("/debate/{session_id}", get(handlers::get_debate))
        .route("/ws/debate/{session_id}", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_document_lists_debate_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/debate/create"));
        assert!(doc.paths.paths.contains_key("/debate/{session_id}"));

        let schemas = doc.components.expect("components").schemas;
        assert!(schemas.contains_key("DebateView"));
        assert!(schemas.contains_key("CreateDebatePayload"));
    }
}
