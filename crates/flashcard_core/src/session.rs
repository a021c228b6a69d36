//! crates/flashcard_core/src/session.rs
//!
//! Owns the lifecycle of the `generation_sessions` row: opened in `processing`
//! before any translation call, finalized exactly once into a terminal status.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::info;
use uuid::Uuid;

use crate::domain::{GenerationSession, SessionFinalization, SessionStatus};
use crate::error::GenerationResult;
use crate::ports::DatabaseService;

/// A session that has entered `processing` and has not been finalized yet.
///
/// Only `SessionManager::open` produces one and `SessionManager::finalize`
/// consumes it, so a session cannot be finalized twice or reopened.
#[derive(Debug)]
#[must_use = "a processing session must be finalized"]
pub struct ProcessingSession {
    record: GenerationSession,
    started: Instant,
}

impl ProcessingSession {
    pub fn id(&self) -> Uuid {
        self.record.id
    }

    pub fn user_id(&self) -> Uuid {
        self.record.user_id
    }

    pub fn input_count(&self) -> u32 {
        self.record.input_count
    }

    /// Wall-clock time since the session entered `processing`.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[derive(Clone)]
pub struct SessionManager {
    db: Arc<dyn DatabaseService>,
}

impl SessionManager {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db }
    }

    /// Creates the session row in `processing` with `generated_count = 0`.
    pub async fn open(&self, user_id: Uuid, input_count: u32) -> GenerationResult<ProcessingSession> {
        let record = self.db.create_generation_session(user_id, input_count).await?;
        info!(
            session_id = %record.id,
            user_id = %user_id,
            input_count,
            "Generation session opened."
        );
        Ok(ProcessingSession {
            record,
            started: Instant::now(),
        })
    }

    /// Writes the terminal status, counts, duration and error message in one update.
    pub async fn finalize(
        &self,
        session: ProcessingSession,
        finalization: SessionFinalization,
    ) -> GenerationResult<GenerationSession> {
        debug_assert!(SessionStatus::Processing.can_transition_to(finalization.status.into()));

        let record = self
            .db
            .finalize_generation_session(session.user_id(), session.id(), &finalization)
            .await?;
        info!(
            session_id = %record.id,
            status = %record.status,
            generated = record.generated_count,
            input = record.input_count,
            duration_ms = finalization.duration_ms,
            "Generation session finalized."
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FinalStatus;
    use crate::error::GenerationError;
    use crate::testing::InMemoryStore;

    #[tokio::test]
    async fn opens_in_processing_with_zero_generated() {
        let store = Arc::new(InMemoryStore::new());
        let manager = SessionManager::new(store.clone());
        let user = Uuid::new_v4();

        let session = manager.open(user, 7).await.unwrap();
        assert_eq!(session.input_count(), 7);

        let stored = store.sessions_for(user).await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, SessionStatus::Processing);
        assert_eq!(stored[0].generated_count, 0);
        assert_eq!(stored[0].duration_ms, None);

        manager
            .finalize(
                session,
                SessionFinalization {
                    status: FinalStatus::Completed,
                    generated_count: 7,
                    duration_ms: 12,
                    error_message: None,
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn finalize_writes_every_field_at_once() {
        let store = Arc::new(InMemoryStore::new());
        let manager = SessionManager::new(store.clone());
        let user = Uuid::new_v4();

        let session = manager.open(user, 6).await.unwrap();
        let created_at = store.sessions_for(user).await[0].created_at;
        let record = manager
            .finalize(
                session,
                SessionFinalization {
                    status: FinalStatus::Partial,
                    generated_count: 4,
                    duration_ms: 1500,
                    error_message: Some("2 of 6 sentences could not be translated.".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(record.status, SessionStatus::Partial);
        assert_eq!(record.input_count, 6);
        assert_eq!(record.generated_count, 4);
        assert_eq!(record.duration_ms, Some(1500));
        assert!(record.error_message.is_some());
        assert!(record.updated_at >= created_at);
    }

    #[tokio::test]
    async fn store_failure_on_open_is_a_persistence_error() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_session_creation().await;
        let manager = SessionManager::new(store.clone());

        let err = manager.open(Uuid::new_v4(), 5).await.unwrap_err();
        assert!(matches!(err, GenerationError::Persistence(_)));
    }

    #[test]
    fn terminal_states_have_no_way_back() {
        for status in [SessionStatus::Completed, SessionStatus::Partial, SessionStatus::Failed] {
            assert!(status.is_terminal());
            assert!(!status.can_transition_to(SessionStatus::Processing));
        }
        assert!(SessionStatus::Pending.can_transition_to(SessionStatus::Processing));
        assert!(SessionStatus::Processing.can_transition_to(SessionStatus::Partial));
        assert!(!SessionStatus::Processing.is_terminal());
    }

    #[test]
    fn final_status_follows_the_counts() {
        assert_eq!(FinalStatus::from_counts(5, 5), FinalStatus::Completed);
        assert_eq!(FinalStatus::from_counts(3, 5), FinalStatus::Partial);
        assert_eq!(FinalStatus::from_counts(0, 5), FinalStatus::Failed);
    }

    #[test]
    fn status_strings_round_trip_through_the_store_format() {
        for status in [
            SessionStatus::Pending,
            SessionStatus::Processing,
            SessionStatus::Completed,
            SessionStatus::Partial,
            SessionStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<SessionStatus>(), Ok(status));
        }
        assert!("done".parse::<SessionStatus>().is_err());
    }
}
