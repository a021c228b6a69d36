//! crates/flashcard_core/src/error.rs
//!
//! Request-level failures of the generation pipeline. Per-sentence failures never
//! show up here; they are folded into the session's counts instead.

use uuid::Uuid;

use crate::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// The caller's input is malformed. Never retried automatically.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Accepting the request would push the user past the daily sentence budget.
    #[error("Daily limit exceeded: {used} sentences used today, {requested} requested, limit is {limit}")]
    QuotaExceeded { used: u32, requested: u32, limit: u32 },

    /// The store failed at a point where the request cannot continue.
    #[error("Persistence failure: {0}")]
    Persistence(#[from] PortError),

    /// Every sentence failed on the service side. The session was still finalized.
    #[error("Translation service unavailable (session {session_id})")]
    ServiceUnavailable { session_id: Uuid },
}

pub type GenerationResult<T> = Result<T, GenerationError>;
