//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flashcard_core::domain::{
    Flashcard, FlashcardSource, GenerationSession, NewFlashcard, SessionFinalization,
    SessionStatus,
};
use flashcard_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

const SESSION_COLUMNS: &str = "id, user_id, input_count, generated_count, status, error_message, \
     duration_ms, created_at, updated_at";

const FLASHCARD_COLUMNS: &str = "id, user_id, generation_session_id, sentence_en, translation_pl, \
     source, is_edited, created_at, updated_at";

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct GenerationSessionRecord {
    id: Uuid,
    user_id: Uuid,
    input_count: i32,
    generated_count: i32,
    status: String,
    error_message: Option<String>,
    duration_ms: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl GenerationSessionRecord {
    fn to_domain(self) -> PortResult<GenerationSession> {
        let status = self
            .status
            .parse::<SessionStatus>()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(GenerationSession {
            id: self.id,
            user_id: self.user_id,
            input_count: u32::try_from(self.input_count).unwrap_or(0),
            generated_count: u32::try_from(self.generated_count).unwrap_or(0),
            status,
            error_message: self.error_message,
            duration_ms: self.duration_ms.and_then(|d| u64::try_from(d).ok()),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct FlashcardRecord {
    id: Uuid,
    user_id: Uuid,
    generation_session_id: Option<Uuid>,
    sentence_en: String,
    translation_pl: String,
    source: String,
    is_edited: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl FlashcardRecord {
    fn to_domain(self) -> PortResult<Flashcard> {
        let source = self
            .source
            .parse::<FlashcardSource>()
            .map_err(PortError::Unexpected)?;
        Ok(Flashcard {
            id: self.id,
            user_id: self.user_id,
            generation_session_id: self.generation_session_id,
            sentence_en: self.sentence_en,
            translation_pl: self.translation_pl,
            source,
            is_edited: self.is_edited,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn insert_flashcard_sql() -> String {
    format!(
        "INSERT INTO flashcards (id, user_id, generation_session_id, sentence_en, translation_pl, source, is_edited) \
         VALUES ($1, $2, $3, $4, $5, $6, FALSE) RETURNING {FLASHCARD_COLUMNS}"
    )
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_generation_session(
        &self,
        user_id: Uuid,
        input_count: u32,
    ) -> PortResult<GenerationSession> {
        let input_count = i32::try_from(input_count)
            .map_err(|_| PortError::Unexpected(format!("input count {input_count} out of range")))?;
        let record = sqlx::query_as::<_, GenerationSessionRecord>(&format!(
            "INSERT INTO generation_sessions (id, user_id, input_count, generated_count, status) \
             VALUES ($1, $2, $3, 0, $4) RETURNING {SESSION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(input_count)
        .bind(SessionStatus::Processing.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        record.to_domain()
    }

    async fn finalize_generation_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        finalization: &SessionFinalization,
    ) -> PortResult<GenerationSession> {
        let status = SessionStatus::from(finalization.status);
        let record = sqlx::query_as::<_, GenerationSessionRecord>(&format!(
            "UPDATE generation_sessions \
             SET status = $1, generated_count = $2, duration_ms = $3, error_message = $4, updated_at = now() \
             WHERE id = $5 AND user_id = $6 AND status = $7 \
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(status.as_str())
        .bind(i32::try_from(finalization.generated_count).unwrap_or(i32::MAX))
        .bind(i64::try_from(finalization.duration_ms).unwrap_or(i64::MAX))
        .bind(finalization.error_message.as_deref())
        .bind(session_id)
        .bind(user_id)
        .bind(SessionStatus::Processing.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        match record {
            Some(record) => record.to_domain(),
            None => Err(PortError::Conflict(format!(
                "Generation session {} is not processing",
                session_id
            ))),
        }
    }

    async fn get_generation_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> PortResult<GenerationSession> {
        let record = sqlx::query_as::<_, GenerationSessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM generation_sessions WHERE id = $1 AND user_id = $2"
        ))
        .bind(session_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Generation session {} not found", session_id))
            }
            _ => PortError::Unexpected(e.to_string()),
        })?;
        record.to_domain()
    }

    async fn sum_input_count_between(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PortResult<u32> {
        let used = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(input_count), 0)::BIGINT FROM generation_sessions \
             WHERE user_id = $1 AND created_at >= $2 AND created_at < $3",
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(u32::try_from(used).unwrap_or(u32::MAX))
    }

    async fn insert_flashcards(
        &self,
        user_id: Uuid,
        cards: &[NewFlashcard],
    ) -> PortResult<Vec<Flashcard>> {
        let sql = insert_flashcard_sql();
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let mut created = Vec::with_capacity(cards.len());
        for card in cards {
            let record = sqlx::query_as::<_, FlashcardRecord>(&sql)
                .bind(Uuid::new_v4())
                .bind(user_id)
                .bind(card.generation_session_id)
                .bind(&card.sentence_en)
                .bind(&card.translation_pl)
                .bind(FlashcardSource::Ai.as_str())
                .fetch_one(&mut *tx)
                .await
                .map_err(unexpected)?;
            created.push(record.to_domain()?);
        }
        tx.commit().await.map_err(unexpected)?;
        Ok(created)
    }

    async fn insert_flashcard(&self, user_id: Uuid, card: &NewFlashcard) -> PortResult<Flashcard> {
        let record = sqlx::query_as::<_, FlashcardRecord>(&insert_flashcard_sql())
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(card.generation_session_id)
            .bind(&card.sentence_en)
            .bind(&card.translation_pl)
            .bind(FlashcardSource::Ai.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        record.to_domain()
    }
}
