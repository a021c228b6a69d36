//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::{ApiError, ErrorBody};
use crate::web::{middleware::AuthenticatedUser, state::AppState};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::Json,
    Extension,
};
use chrono::{DateTime, Utc};
use flashcard_core::{Flashcard, GenerationOutcome, GenerationSession, QuotaStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        generate_flashcards_handler,
        get_generation_session_handler,
        get_quota_handler,
    ),
    components(
        schemas(
            GenerateFlashcardsRequest,
            GenerateFlashcardsResponse,
            FlashcardResponse,
            GenerationSessionResponse,
            QuotaResponse,
            ErrorBody
        )
    ),
    tags(
        (name = "Flashcard Generation API", description = "Turns batches of English sentences into Polish flashcards.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The payload of a generation request.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct GenerateFlashcardsRequest {
    /// English sentences; blank entries are ignored.
    pub sentences: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct FlashcardResponse {
    pub id: Uuid,
    pub sentence_en: String,
    pub translation_pl: String,
    pub source: String,
    pub is_edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Flashcard> for FlashcardResponse {
    fn from(card: Flashcard) -> Self {
        Self {
            id: card.id,
            sentence_en: card.sentence_en,
            translation_pl: card.translation_pl,
            source: card.source.as_str().to_string(),
            is_edited: card.is_edited,
            created_at: card.created_at,
            updated_at: card.updated_at,
        }
    }
}

/// The response payload sent after a generation request finishes.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct GenerateFlashcardsResponse {
    pub session_id: Uuid,
    /// One of `completed`, `partial` or `failed`.
    pub status: String,
    pub flashcards: Vec<FlashcardResponse>,
    pub generated_count: u32,
    pub failed_count: u32,
    pub duration_ms: u64,
}

impl From<GenerationOutcome> for GenerateFlashcardsResponse {
    fn from(outcome: GenerationOutcome) -> Self {
        Self {
            session_id: outcome.session.id,
            status: outcome.session.status.to_string(),
            generated_count: outcome.session.generated_count,
            failed_count: outcome.failed_count,
            duration_ms: outcome.session.duration_ms.unwrap_or(0),
            flashcards: outcome.flashcards.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct GenerationSessionResponse {
    pub id: Uuid,
    pub status: String,
    pub input_count: u32,
    pub generated_count: u32,
    pub error_message: Option<String>,
    pub duration_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<GenerationSession> for GenerationSessionResponse {
    fn from(session: GenerationSession) -> Self {
        Self {
            id: session.id,
            status: session.status.to_string(),
            input_count: session.input_count,
            generated_count: session.generated_count,
            error_message: session.error_message,
            duration_ms: session.duration_ms,
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct QuotaResponse {
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

impl From<QuotaStatus> for QuotaResponse {
    fn from(status: QuotaStatus) -> Self {
        Self {
            used: status.used,
            limit: status.limit,
            remaining: status.remaining(),
            window_start: status.window.start,
            window_end: status.window.end,
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Generate flashcards from a batch of sentences.
///
/// The batch runs on its own task. If the client disconnects, no further
/// sentences are dispatched, but the session is still finalized.
#[utoipa::path(
    post,
    path = "/flashcards/generate",
    request_body = GenerateFlashcardsRequest,
    responses(
        (status = 200, description = "Batch processed; see status for partial failure", body = GenerateFlashcardsResponse),
        (status = 400, description = "Malformed body, bad sentence count or sentence too long", body = ErrorBody),
        (status = 401, description = "No verified identity"),
        (status = 429, description = "Daily limit or short-term rate limit exceeded", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody),
        (status = 503, description = "Translation service unavailable for the whole batch", body = ErrorBody)
    ),
    params(
        ("x-user-id" = Uuid, Header, description = "The verified user id forwarded by the authentication provider.")
    )
)]
pub async fn generate_flashcards_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    payload: Result<Json<GenerateFlashcardsRequest>, JsonRejection>,
) -> Result<Json<GenerateFlashcardsResponse>, ApiError> {
    let Json(request) = payload?;
    if !app_state.rate_limiter.try_acquire(user_id).await {
        info!(user_id = %user_id, "Generation request rate limited.");
        return Err(ApiError::RateLimited);
    }
    info!(
        user_id = %user_id,
        submitted = request.sentences.len(),
        "Generation request received."
    );

    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();
    let pipeline = app_state.pipeline.clone();
    let sentences = request.sentences;
    let outcome = tokio::spawn(async move { pipeline.generate(user_id, &sentences, cancel).await })
        .await
        .map_err(|e| ApiError::Internal(format!("Generation task failed: {}", e)))??;

    Ok(Json(outcome.into()))
}

/// Fetch one of the caller's generation sessions.
#[utoipa::path(
    get,
    path = "/generation-sessions/{session_id}",
    responses(
        (status = 200, description = "The session record", body = GenerationSessionResponse),
        (status = 401, description = "No verified identity"),
        (status = 404, description = "No such session for this user", body = ErrorBody)
    ),
    params(
        ("session_id" = Uuid, Path, description = "The generation session id."),
        ("x-user-id" = Uuid, Header, description = "The verified user id forwarded by the authentication provider.")
    )
)]
pub async fn get_generation_session_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<GenerationSessionResponse>, ApiError> {
    let session = app_state.pipeline.session(user_id, session_id).await?;
    Ok(Json(session.into()))
}

/// Report how much of today's sentence budget the caller has used.
#[utoipa::path(
    get,
    path = "/generation-sessions/quota",
    responses(
        (status = 200, description = "Today's usage", body = QuotaResponse),
        (status = 401, description = "No verified identity"),
        (status = 500, description = "Internal server error", body = ErrorBody)
    ),
    params(
        ("x-user-id" = Uuid, Header, description = "The verified user id forwarded by the authentication provider.")
    )
)]
pub async fn get_quota_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
) -> Result<Json<QuotaResponse>, ApiError> {
    let status = app_state.pipeline.quota_status(user_id).await?;
    Ok(Json(status.into()))
}
