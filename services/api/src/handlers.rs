//! HTTP handlers for sessions, turns and comprehension feedback.
//!
//! Each handler carries a `#[utoipa::path]` so the OpenAPI document stays in
//! step with the routes.

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use clarify_core::orchestrator::{Explanation, TurnError};
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{Instrument, Span, error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    models::{
        ComprehensionFeedbackPayload, ErrorResponse, FeedbackResponse, HealthResponse,
        SessionCreated, SessionHistory, SubmitTurnPayload, TurnResponse, TurnView,
    },
    sessions::Session,
    state::AppState,
};

/// Failures surfaced to HTTP clients. Upstream detail is logged, never returned.
pub enum ApiError {
    NotFound(String),
    Turn(TurnError),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Turn(err) => {
                error!(error = %err, "Turn failed");
                let message = match err {
                    TurnError::Generation(_) => "Failed to get a response from the language model",
                    TurnError::Synthesis(_) => "Failed to convert text to speech",
                };
                (StatusCode::INTERNAL_SERVER_ERROR, message.to_string())
            }
            ApiError::InternalServerError(err) => {
                error!(error = ?err, "Request failed unexpectedly");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred.".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<TurnError> for ApiError {
    fn from(err: TurnError) -> Self {
        Self::Turn(err)
    }
}

impl From<JoinError> for ApiError {
    fn from(err: JoinError) -> Self {
        Self::InternalServerError(err.into())
    }
}

async fn find_session(state: &AppState, id: Uuid) -> Result<Arc<Session>, ApiError> {
    state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Session with id '{}' not found", id)))
}

async fn history_of(session: &Session) -> SessionHistory {
    let dialogue = session.dialogue.lock().await;
    SessionHistory {
        session_id: session.id,
        created_at: session.created_at,
        turns: dialogue.turns().iter().map(TurnView::from).collect(),
    }
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Start a new tutoring session.
#[utoipa::path(
    post,
    path = "/sessions",
    responses(
        (status = 201, description = "Session created successfully", body = SessionCreated)
    )
)]
pub async fn create_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let session = state.sessions.create(&state.system_prompt).await;
    info!(session_id = %session.id, "Session created");
    (
        StatusCode::CREATED,
        Json(SessionCreated {
            session_id: session.id,
            created_at: session.created_at,
        }),
    )
}

/// Get the turn history of a session.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    responses(
        (status = 200, description = "Session history", body = SessionHistory),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionHistory>, ApiError> {
    let session = find_session(&state, id).await?;
    Ok(Json(history_of(&session).await))
}

/// End a session and discard its history.
#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    responses(
        (status = 204, description = "Session ended"),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.remove(id).await {
        info!(session_id = %id, "Session ended");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!(
            "Session with id '{}' not found",
            id
        )))
    }
}

/// Discard a session's history, keeping only the system prompt.
#[utoipa::path(
    post,
    path = "/sessions/{id}/reset",
    responses(
        (status = 200, description = "Session reset", body = SessionHistory),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
pub async fn reset_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionHistory>, ApiError> {
    let session = find_session(&state, id).await?;
    session.dialogue.lock().await.reset();
    info!(session_id = %id, "Session reset");
    Ok(Json(history_of(&session).await))
}

/// Send the learner's input and receive the spoken, timestamped response.
#[utoipa::path(
    post,
    path = "/sessions/{id}/get_response",
    request_body = SubmitTurnPayload,
    responses(
        (status = 200, description = "Annotated response with audio", body = TurnResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 500, description = "Generation or synthesis failed", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
#[instrument(name = "get_response", skip_all, fields(session_id = %id))]
pub async fn get_response(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitTurnPayload>,
) -> Result<Json<TurnResponse>, ApiError> {
    let session = find_session(&state, id).await?;
    let orchestrator = state.orchestrator.clone();

    // Turns run on their own task so a client disconnect cannot abandon one halfway.
    let reply = tokio::spawn(
        async move {
            let mut dialogue = session.dialogue.lock().await;
            orchestrator
                .submit_turn(&mut dialogue, &payload.user_input)
                .await
        }
        .instrument(Span::current()),
    )
    .await??;

    Ok(Json(TurnResponse::from(reply)))
}

/// Report per-word comprehension scores and receive an explanation of the
/// words that were not understood.
#[utoipa::path(
    post,
    path = "/sessions/{id}/submit_comprehension_feedback",
    request_body = ComprehensionFeedbackPayload,
    responses(
        (status = 200, description = "Explanation, or nulls when there is nothing to explain", body = FeedbackResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
#[instrument(name = "submit_comprehension_feedback", skip_all, fields(session_id = %id))]
pub async fn submit_comprehension_feedback(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Result<Json<ComprehensionFeedbackPayload>, JsonRejection>,
) -> Result<Json<FeedbackResponse>, ApiError> {
    let session = find_session(&state, id).await?;
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            warn!(error = %rejection, "Discarding unreadable comprehension feedback");
            return Ok(Json(FeedbackResponse::from(None::<Explanation>)));
        }
    };
    let orchestrator = state.orchestrator.clone();

    let explanation = tokio::spawn(
        async move {
            let mut dialogue = session.dialogue.lock().await;
            orchestrator
                .submit_feedback(
                    &mut dialogue,
                    &payload.word_comprehension,
                    &payload.assistant_response,
                )
                .await
        }
        .instrument(Span::current()),
    )
    .await
    .unwrap_or_else(|e| {
        error!(error = %e, "Feedback task failed");
        None
    });

    Ok(Json(FeedbackResponse::from(explanation)))
}
