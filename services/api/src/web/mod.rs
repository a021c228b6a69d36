pub mod middleware;
pub mod rate_limit;
pub mod rest;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub use middleware::require_auth;
pub use rest::{generate_flashcards_handler, get_generation_session_handler, get_quota_handler};
use state::AppState;

/// Builds the API router. Every route requires a verified identity.
pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/flashcards/generate", post(generate_flashcards_handler))
        .route("/generation-sessions/quota", get(get_quota_handler))
        .route(
            "/generation-sessions/{session_id}",
            get(get_generation_session_handler),
        )
        .layer(axum_middleware::from_fn(require_auth))
        .layer(DefaultBodyLimit::max(64 * 1024))
        .with_state(app_state)
}
