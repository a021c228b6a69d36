//! crates/flashcard_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the generation pipeline.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or LLM APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Flashcard, GenerationSession, NewFlashcard, SessionFinalization};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all store operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflicting state: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Failure of a single call to the translation service.
///
/// The text carried here is for logs only and never reaches the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslationError {
    /// Timeouts, 5xx-equivalents, rate limiting: worth another attempt.
    #[error("Transient translation failure: {0}")]
    Transient(String),
    /// The service rejected the input or answered with something unusable.
    #[error("Translation rejected: {0}")]
    Permanent(String),
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The relational store. Every operation is scoped to the owning user.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Generation Sessions ---

    /// Inserts a session row already in `processing` with `generated_count = 0`.
    async fn create_generation_session(
        &self,
        user_id: Uuid,
        input_count: u32,
    ) -> PortResult<GenerationSession>;

    /// Writes status, counts, duration and error message in one update.
    /// Fails with `PortError::Conflict` when the session is no longer `processing`.
    async fn finalize_generation_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        finalization: &SessionFinalization,
    ) -> PortResult<GenerationSession>;

    async fn get_generation_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> PortResult<GenerationSession>;

    /// Sums `input_count` over the user's sessions created in `[start, end)`.
    async fn sum_input_count_between(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PortResult<u32>;

    // --- Flashcards ---

    /// Inserts all cards atomically, returning them in input order.
    async fn insert_flashcards(
        &self,
        user_id: Uuid,
        cards: &[NewFlashcard],
    ) -> PortResult<Vec<Flashcard>>;

    async fn insert_flashcard(&self, user_id: Uuid, card: &NewFlashcard) -> PortResult<Flashcard>;
}

#[async_trait]
pub trait TranslationService: Send + Sync {
    /// Translates one English sentence into Polish.
    async fn translate(&self, sentence: &str) -> Result<String, TranslationError>;
}
