//! crates/flashcard_core/src/domain.rs
//!
//! Defines the pure, core data structures for the flashcard generation pipeline.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Generation Session Status
//=========================================================================================

/// Lifecycle status of a generation session.
///
/// `Pending` is only the column default; the pipeline opens sessions directly in
/// `Processing`. `Completed`, `Partial` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    Pending,
    Processing,
    Completed,
    Partial,
    Failed,
}

impl SessionStatus {
    #[must_use]
    pub const fn allowed_next_states(self) -> &'static [Self] {
        match self {
            Self::Pending => &[Self::Processing, Self::Failed],
            Self::Processing => &[Self::Completed, Self::Partial, Self::Failed],
            Self::Completed | Self::Partial | Self::Failed => &[],
        }
    }

    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self.allowed_next_states().contains(&next)
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Partial | Self::Failed)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored status string is not one of the known states.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown session status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for SessionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "partial" => Ok(Self::Partial),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// The only statuses a session can be finalized into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalStatus {
    Completed,
    Partial,
    Failed,
}

impl FinalStatus {
    /// Picks the terminal status for `succeeded` successes out of `total` sentences.
    #[must_use]
    pub fn from_counts(succeeded: u32, total: u32) -> Self {
        if succeeded == 0 {
            Self::Failed
        } else if succeeded >= total {
            Self::Completed
        } else {
            Self::Partial
        }
    }
}

impl From<FinalStatus> for SessionStatus {
    fn from(status: FinalStatus) -> Self {
        match status {
            FinalStatus::Completed => SessionStatus::Completed,
            FinalStatus::Partial => SessionStatus::Partial,
            FinalStatus::Failed => SessionStatus::Failed,
        }
    }
}

//=========================================================================================
// Generation Session
//=========================================================================================

/// The tracked lifecycle record of one generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub input_count: u32,
    pub generated_count: u32,
    pub status: SessionStatus,
    pub error_message: Option<String>,
    pub duration_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Every field written by the single finalizing update of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFinalization {
    pub status: FinalStatus,
    pub generated_count: u32,
    pub duration_ms: u64,
    pub error_message: Option<String>,
}

//=========================================================================================
// Flashcards
//=========================================================================================

/// Where a flashcard came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashcardSource {
    Ai,
    Manual,
}

impl FlashcardSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Manual => "manual",
        }
    }
}

impl FromStr for FlashcardSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ai" => Ok(Self::Ai),
            "manual" => Ok(Self::Manual),
            other => Err(format!("unknown flashcard source '{other}'")),
        }
    }
}

/// A persisted flashcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flashcard {
    pub id: Uuid,
    pub user_id: Uuid,
    pub generation_session_id: Option<Uuid>,
    pub sentence_en: String,
    pub translation_pl: String,
    pub source: FlashcardSource,
    pub is_edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A validated, translated sentence ready to be written as an AI flashcard.
/// Stores always write these with `source = ai` and `is_edited = false`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFlashcard {
    pub generation_session_id: Uuid,
    pub sentence_en: String,
    pub translation_pl: String,
}
