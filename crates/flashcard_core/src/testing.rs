//! crates/flashcard_core/src/testing.rs
//!
//! In-memory implementations of the ports, for tests in this crate and (through
//! the `test-util` feature) in the service crate.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{
    Flashcard, FlashcardSource, GenerationSession, NewFlashcard, SessionFinalization,
    SessionStatus,
};
use crate::ports::{
    DatabaseService, PortError, PortResult, TranslationError, TranslationService,
};

//=========================================================================================
// InMemoryStore
//=========================================================================================

#[derive(Default)]
struct StoreInner {
    sessions: Vec<GenerationSession>,
    flashcards: Vec<Flashcard>,
    writes: usize,
    fail_session_creation: bool,
    fail_batch_inserts: bool,
    fail_finalization: bool,
    stall_inserts: bool,
    failing_sentences: HashSet<String>,
}

/// A `DatabaseService` backed by vectors behind a mutex.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a finished session as if it had been created at `created_at`.
    pub async fn seed_session(&self, user_id: Uuid, input_count: u32, created_at: DateTime<Utc>) {
        let mut inner = self.inner.lock().await;
        inner.sessions.push(GenerationSession {
            id: Uuid::new_v4(),
            user_id,
            input_count,
            generated_count: input_count,
            status: SessionStatus::Completed,
            error_message: None,
            duration_ms: Some(0),
            created_at,
            updated_at: created_at,
        });
    }

    pub async fn fail_session_creation(&self) {
        self.inner.lock().await.fail_session_creation = true;
    }

    pub async fn fail_batch_inserts(&self) {
        self.inner.lock().await.fail_batch_inserts = true;
    }

    pub async fn fail_finalization(&self) {
        self.inner.lock().await.fail_finalization = true;
    }

    /// Makes every flashcard insert hang forever.
    pub async fn stall_inserts(&self) {
        self.inner.lock().await.stall_inserts = true;
    }

    /// Makes every insert of a flashcard for `sentence` fail.
    pub async fn fail_inserts_for(&self, sentence: &str) {
        self.inner
            .lock()
            .await
            .failing_sentences
            .insert(sentence.to_string());
    }

    pub async fn sessions_for(&self, user_id: Uuid) -> Vec<GenerationSession> {
        let inner = self.inner.lock().await;
        inner
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn flashcards_for(&self, user_id: Uuid) -> Vec<Flashcard> {
        let inner = self.inner.lock().await;
        inner
            .flashcards
            .iter()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Number of successful mutations so far.
    pub async fn write_count(&self) -> usize {
        self.inner.lock().await.writes
    }
}

impl InMemoryStore {
    async fn stall_if_asked(&self) {
        let stalled = self.inner.lock().await.stall_inserts;
        if stalled {
            std::future::pending::<()>().await;
        }
    }
}

fn build_flashcard(user_id: Uuid, card: &NewFlashcard) -> Flashcard {
    let now = Utc::now();
    Flashcard {
        id: Uuid::new_v4(),
        user_id,
        generation_session_id: Some(card.generation_session_id),
        sentence_en: card.sentence_en.clone(),
        translation_pl: card.translation_pl.clone(),
        source: FlashcardSource::Ai,
        is_edited: false,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl DatabaseService for InMemoryStore {
    async fn create_generation_session(
        &self,
        user_id: Uuid,
        input_count: u32,
    ) -> PortResult<GenerationSession> {
        let mut inner = self.inner.lock().await;
        if inner.fail_session_creation {
            return Err(PortError::Unexpected("connection refused".to_string()));
        }
        let now = Utc::now();
        let session = GenerationSession {
            id: Uuid::new_v4(),
            user_id,
            input_count,
            generated_count: 0,
            status: SessionStatus::Processing,
            error_message: None,
            duration_ms: None,
            created_at: now,
            updated_at: now,
        };
        inner.sessions.push(session.clone());
        inner.writes += 1;
        Ok(session)
    }

    async fn finalize_generation_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        finalization: &SessionFinalization,
    ) -> PortResult<GenerationSession> {
        let mut inner = self.inner.lock().await;
        if inner.fail_finalization {
            return Err(PortError::Unexpected("connection reset".to_string()));
        }
        let session = inner
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id && s.user_id == user_id)
            .ok_or_else(|| PortError::NotFound(format!("Generation session {session_id} not found")))?;
        if session.status != SessionStatus::Processing {
            return Err(PortError::Conflict(format!(
                "Generation session {session_id} is already {}",
                session.status
            )));
        }
        session.status = finalization.status.into();
        session.generated_count = finalization.generated_count;
        session.duration_ms = Some(finalization.duration_ms);
        session.error_message = finalization.error_message.clone();
        session.updated_at = Utc::now();
        let updated = session.clone();
        inner.writes += 1;
        Ok(updated)
    }

    async fn get_generation_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> PortResult<GenerationSession> {
        let inner = self.inner.lock().await;
        inner
            .sessions
            .iter()
            .find(|s| s.id == session_id && s.user_id == user_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Generation session {session_id} not found")))
    }

    async fn sum_input_count_between(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PortResult<u32> {
        let inner = self.inner.lock().await;
        Ok(inner
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id && s.created_at >= start && s.created_at < end)
            .map(|s| s.input_count)
            .sum())
    }

    async fn insert_flashcards(
        &self,
        user_id: Uuid,
        cards: &[NewFlashcard],
    ) -> PortResult<Vec<Flashcard>> {
        self.stall_if_asked().await;
        let mut inner = self.inner.lock().await;
        if inner.fail_batch_inserts
            || cards
                .iter()
                .any(|c| inner.failing_sentences.contains(&c.sentence_en))
        {
            return Err(PortError::Unexpected("batch insert aborted".to_string()));
        }
        let created: Vec<Flashcard> = cards.iter().map(|c| build_flashcard(user_id, c)).collect();
        inner.flashcards.extend(created.iter().cloned());
        inner.writes += 1;
        Ok(created)
    }

    async fn insert_flashcard(&self, user_id: Uuid, card: &NewFlashcard) -> PortResult<Flashcard> {
        self.stall_if_asked().await;
        let mut inner = self.inner.lock().await;
        if inner.failing_sentences.contains(&card.sentence_en) {
            return Err(PortError::Unexpected("insert rejected".to_string()));
        }
        let created = build_flashcard(user_id, card);
        inner.flashcards.push(created.clone());
        inner.writes += 1;
        Ok(created)
    }
}

//=========================================================================================
// ScriptedTranslator
//=========================================================================================

/// What the scripted translator does on one call.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Answers `pl: <sentence>`.
    Echo,
    Translate(String),
    Transient,
    Permanent,
    /// Never answers.
    Stall,
}

/// A `TranslationService` whose answers are scripted per sentence.
///
/// Each sentence walks through its script one reply per call; the last reply
/// repeats. Unscripted sentences use the default reply.
pub struct ScriptedTranslator {
    default: Reply,
    scripts: HashMap<String, Vec<Reply>>,
    latency: Duration,
    calls: std::sync::Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedTranslator {
    pub fn echo() -> Self {
        Self::with_default(Reply::Echo)
    }

    pub fn with_default(default: Reply) -> Self {
        Self {
            default,
            scripts: HashMap::new(),
            latency: Duration::ZERO,
            calls: std::sync::Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn script(mut self, sentence: &str, replies: Vec<Reply>) -> Self {
        self.scripts.insert(sentence.to_string(), replies);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls_for(&self, sentence: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(sentence).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.values().sum())
            .unwrap_or(0)
    }

    /// The highest number of calls that were running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self, sentence: &str) -> Reply {
        let call = match self.calls.lock() {
            Ok(mut calls) => {
                let count = calls.entry(sentence.to_string()).or_insert(0);
                *count += 1;
                *count - 1
            }
            Err(_) => 0,
        };
        match self.scripts.get(sentence) {
            Some(replies) if !replies.is_empty() => {
                replies[call.min(replies.len() - 1)].clone()
            }
            _ => self.default.clone(),
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TranslationService for ScriptedTranslator {
    async fn translate(&self, sentence: &str) -> Result<String, TranslationError> {
        let reply = self.next_reply(sentence);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match reply {
            Reply::Echo => Ok(format!("pl: {sentence}")),
            Reply::Translate(text) => Ok(text),
            Reply::Transient => Err(TranslationError::Transient("503 upstream overloaded".to_string())),
            Reply::Permanent => Err(TranslationError::Permanent("400 invalid input".to_string())),
            Reply::Stall => {
                std::future::pending::<()>().await;
                Err(TranslationError::Transient("unreachable".to_string()))
            }
        }
    }
}
