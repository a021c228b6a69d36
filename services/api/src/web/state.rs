//! services/api/src/web/state.rs
//!
//! Defines the application state shared by every request handler.

use std::sync::Arc;

use flashcard_core::GenerationPipeline;

use crate::web::rate_limit::RateLimiter;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<GenerationPipeline>,
    pub rate_limiter: Arc<RateLimiter>,
}
