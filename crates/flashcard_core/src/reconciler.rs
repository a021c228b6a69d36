//! crates/flashcard_core/src/reconciler.rs
//!
//! Turns the translator's tagged outcomes into persisted flashcards and a
//! finalized session.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{error, warn};
use uuid::Uuid;

use crate::domain::{FinalStatus, Flashcard, GenerationSession, NewFlashcard, SessionFinalization};
use crate::error::GenerationResult;
use crate::ports::DatabaseService;
use crate::session::{ProcessingSession, SessionManager};
use crate::translator::{ItemFailure, ItemOutcome};

/// The result of one generation request, as seen by the caller.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub session: GenerationSession,
    /// Persisted flashcards, in the input order of their sentences.
    pub flashcards: Vec<Flashcard>,
    pub failed_count: u32,
    /// The reason for every sentence that did not become a flashcard.
    pub failures: Vec<ItemFailure>,
}

impl GenerationOutcome {
    /// Nothing succeeded and every failure was the service being slow or down.
    pub fn service_unavailable(&self) -> bool {
        self.flashcards.is_empty()
            && !self.failures.is_empty()
            && self.failures.iter().all(|f| f.is_service_side())
    }
}

pub struct ResultReconciler {
    db: Arc<dyn DatabaseService>,
    max_sentence_chars: usize,
}

impl ResultReconciler {
    pub fn new(db: Arc<dyn DatabaseService>, max_sentence_chars: usize) -> Self {
        Self {
            db,
            max_sentence_chars,
        }
    }

    /// Validates each translation, persists the survivors and finalizes the session.
    ///
    /// `sentences` and `outcomes` must line up one to one. Flashcard writes still
    /// running at `persist_deadline` are abandoned and counted as failures; the
    /// session is finalized either way.
    pub async fn reconcile(
        &self,
        sessions: &SessionManager,
        session: ProcessingSession,
        sentences: &[String],
        outcomes: Vec<ItemOutcome>,
        persist_deadline: Instant,
    ) -> GenerationResult<GenerationOutcome> {
        debug_assert_eq!(sentences.len(), outcomes.len());
        let total = session.input_count();

        let mut failures = Vec::new();
        let mut candidates = Vec::new();
        for (index, (sentence, outcome)) in sentences.iter().zip(outcomes).enumerate() {
            match outcome {
                ItemOutcome::Translated(translation) => {
                    match self.validate(session.id(), sentence, &translation) {
                        Some(card) => candidates.push(card),
                        None => {
                            warn!(session_id = %session.id(), index, "Discarding degenerate translation.");
                            failures.push(ItemFailure::InvalidOutput);
                        }
                    }
                }
                ItemOutcome::Failed(failure) => failures.push(failure),
            }
        }

        let attempted = candidates.len();
        let (flashcards, persistence_failures) =
            match tokio::time::timeout_at(persist_deadline, self.persist(&session, candidates)).await {
                Ok(persisted) => persisted,
                Err(_) => {
                    error!(
                        session_id = %session.id(),
                        attempted,
                        "Flashcard writes overran the supervisory limit; abandoning them."
                    );
                    (Vec::new(), attempted)
                }
            };
        failures.extend(std::iter::repeat(ItemFailure::Persistence).take(persistence_failures));

        let generated_count = u32::try_from(flashcards.len()).unwrap_or(u32::MAX);
        let failed_count = total.saturating_sub(generated_count);
        let status = FinalStatus::from_counts(generated_count, total);
        let finalization = SessionFinalization {
            status,
            generated_count,
            duration_ms: u64::try_from(session.elapsed().as_millis()).unwrap_or(u64::MAX),
            error_message: summarize(status, failed_count, total, &failures),
        };

        let record = sessions.finalize(session, finalization).await?;
        Ok(GenerationOutcome {
            session: record,
            flashcards,
            failed_count,
            failures,
        })
    }

    fn validate(&self, session_id: Uuid, sentence: &str, translation: &str) -> Option<NewFlashcard> {
        let sentence = sentence.trim();
        let translation = translation.trim();
        let within_bounds = |text: &str| {
            !text.is_empty() && text.chars().count() <= self.max_sentence_chars
        };
        if !within_bounds(sentence) || !within_bounds(translation) {
            return None;
        }
        Some(NewFlashcard {
            generation_session_id: session_id,
            sentence_en: sentence.to_string(),
            translation_pl: translation.to_string(),
        })
    }

    /// Writes all cards in one batch, falling back to one write per card when
    /// the batch fails. Returns the persisted cards and the number that failed.
    async fn persist(
        &self,
        session: &ProcessingSession,
        cards: Vec<NewFlashcard>,
    ) -> (Vec<Flashcard>, usize) {
        if cards.is_empty() {
            return (Vec::new(), 0);
        }

        let user_id = session.user_id();
        match self.db.insert_flashcards(user_id, &cards).await {
            Ok(created) => return (created, 0),
            Err(e) => warn!(
                session_id = %session.id(),
                error = %e,
                "Batch flashcard insert failed, falling back to per-item writes."
            ),
        }

        let mut created = Vec::with_capacity(cards.len());
        let mut failed = 0;
        for card in &cards {
            match self.db.insert_flashcard(user_id, card).await {
                Ok(flashcard) => created.push(flashcard),
                Err(e) => {
                    warn!(session_id = %session.id(), error = %e, "Failed to persist flashcard.");
                    failed += 1;
                }
            }
        }
        (created, failed)
    }
}

/// A short, user-safe summary for sessions that did not fully complete.
/// Never includes text from the translation service or the store.
fn summarize(status: FinalStatus, failed: u32, total: u32, failures: &[ItemFailure]) -> Option<String> {
    match status {
        FinalStatus::Completed => None,
        FinalStatus::Partial => Some(format!("{failed} of {total} sentences could not be translated.")),
        FinalStatus::Failed => {
            let all = |kind: ItemFailure| !failures.is_empty() && failures.iter().all(|f| *f == kind);
            let message = if all(ItemFailure::Cancelled) {
                "Generation was cancelled before any sentence was translated.".to_string()
            } else if all(ItemFailure::DeadlineExceeded) {
                "Generation timed out before any sentence was translated.".to_string()
            } else if !failures.is_empty() && failures.iter().all(|f| f.is_service_side()) {
                "The translation service is currently unavailable.".to_string()
            } else {
                format!("None of the {total} sentences could be translated.")
            };
            Some(message)
        }
    }
}
