//! Routes of the Clarify API, plus the Swagger UI serving its OpenAPI document.

use crate::{
    handlers,
    models::{
        ComprehensionFeedbackPayload, ErrorResponse, FeedbackResponse, HealthResponse,
        SessionCreated, SessionHistory, SubmitTurnPayload, TurnResponse, TurnView,
    },
    state::AppState,
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
        handlers::health,
        handlers::create_session,
        handlers::get_session,
        handlers::delete_session,
        handlers::reset_session,
        handlers::get_response,
        handlers::submit_comprehension_feedback,
    ),
    components(
        schemas(
            SubmitTurnPayload, TurnResponse, ComprehensionFeedbackPayload, FeedbackResponse,
            SessionCreated, SessionHistory, TurnView, ErrorResponse, HealthResponse
        )
    ),
    tags(
        (name = "Clarify API", description = "Spoken tutoring sessions with comprehension feedback")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/health", get(handlers::health))
        .route("/sessions", post(handlers::create_session))
        .route(
            "/sessions/{id}",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/sessions/{id}/reset", post(handlers::reset_session))
        .route("/sessions/{id}/get_response", post(handlers::get_response))
        .route(
            "/sessions/{id}/submit_comprehension_feedback",
            post(handlers::submit_comprehension_feedback),
        )
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
