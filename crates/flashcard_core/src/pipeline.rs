//! crates/flashcard_core/src/pipeline.rs
//!
//! The generation request, end to end: normalize, check the quota, open a
//! session, translate, reconcile. Only the first three steps can abort the
//! request without leaving a finalized session behind.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::domain::GenerationSession;
use crate::error::{GenerationError, GenerationResult};
use crate::normalizer::{normalize_sentences, NormalizationPolicy};
use crate::ports::{DatabaseService, TranslationService};
use crate::quota::{QuotaGuard, QuotaPolicy, QuotaStatus};
use crate::reconciler::{GenerationOutcome, ResultReconciler};
use crate::session::SessionManager;
use crate::translator::{BatchTranslator, ItemFailure, ItemOutcome, TranslatorSettings};

/// Every tunable of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationSettings {
    pub normalization: NormalizationPolicy,
    pub quota: QuotaPolicy,
    pub translator: TranslatorSettings,
    /// How far past the batch deadline translation and flashcard writes may run
    /// before they are abandoned and the session finalized as `failed`.
    pub supervisor_grace: Duration,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            normalization: NormalizationPolicy::default(),
            quota: QuotaPolicy::default(),
            translator: TranslatorSettings::default(),
            supervisor_grace: Duration::from_secs(10),
        }
    }
}

pub struct GenerationPipeline {
    db: Arc<dyn DatabaseService>,
    normalization: NormalizationPolicy,
    quota: QuotaGuard,
    sessions: SessionManager,
    translator: BatchTranslator,
    reconciler: ResultReconciler,
    supervisor_limit: Duration,
}

impl GenerationPipeline {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        translation: Arc<dyn TranslationService>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            normalization: settings.normalization,
            quota: QuotaGuard::new(settings.quota),
            sessions: SessionManager::new(db.clone()),
            translator: BatchTranslator::new(translation, settings.translator),
            reconciler: ResultReconciler::new(
                db.clone(),
                settings.normalization.max_sentence_chars,
            ),
            supervisor_limit: settings.translator.batch_deadline + settings.supervisor_grace,
            db,
        }
    }

    /// Turns `raw_sentences` into flashcards for `user_id`.
    ///
    /// Returns `ServiceUnavailable` when every sentence failed on the service
    /// side; the session is finalized as `failed` before that error is returned.
    pub async fn generate(
        &self,
        user_id: Uuid,
        raw_sentences: &[String],
        cancel: CancellationToken,
    ) -> GenerationResult<GenerationOutcome> {
        self.generate_at(user_id, raw_sentences, cancel, Utc::now()).await
    }

    /// `generate` with the quota day taken from `now`.
    pub(crate) async fn generate_at(
        &self,
        user_id: Uuid,
        raw_sentences: &[String],
        cancel: CancellationToken,
        now: DateTime<Utc>,
    ) -> GenerationResult<GenerationOutcome> {
        let batch = normalize_sentences(raw_sentences, &self.normalization)?;
        self.quota
            .check(self.db.as_ref(), user_id, batch.input_count(), now)
            .await?;

        let session = self.sessions.open(user_id, batch.input_count()).await?;
        let session_id = session.id();
        let supervisor_deadline = Instant::now() + self.supervisor_limit;

        // Every item is already bounded by the batch deadline; this only catches
        // a translation phase that stops yielding to the timer.
        let outcomes = match tokio::time::timeout_at(
            supervisor_deadline,
            self.translator.translate_batch(batch.sentences(), &cancel),
        )
        .await
        {
            Ok(outcomes) => outcomes,
            Err(_) => {
                error!(
                    session_id = %session_id,
                    limit_ms = self.supervisor_limit.as_millis() as u64,
                    "Translation phase overran its supervisory limit; failing the session."
                );
                vec![ItemOutcome::Failed(ItemFailure::DeadlineExceeded); batch.len()]
            }
        };

        let outcome = self
            .reconciler
            .reconcile(
                &self.sessions,
                session,
                batch.sentences(),
                outcomes,
                supervisor_deadline,
            )
            .await?;

        info!(
            session_id = %session_id,
            status = %outcome.session.status,
            generated = outcome.session.generated_count,
            failed = outcome.failed_count,
            "Generation request finished."
        );

        if outcome.service_unavailable() {
            return Err(GenerationError::ServiceUnavailable { session_id });
        }
        Ok(outcome)
    }

    /// Today's usage for the user.
    pub async fn quota_status(&self, user_id: Uuid) -> GenerationResult<QuotaStatus> {
        Ok(self.quota.status(self.db.as_ref(), user_id, Utc::now()).await?)
    }

    /// One of the user's sessions.
    pub async fn session(&self, user_id: Uuid, session_id: Uuid) -> GenerationResult<GenerationSession> {
        Ok(self.db.get_generation_session(user_id, session_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SessionStatus;
    use crate::ports::PortError;
    use chrono::TimeZone;
    use crate::testing::{InMemoryStore, Reply, ScriptedTranslator};

    fn pipeline(store: &Arc<InMemoryStore>, translator: ScriptedTranslator) -> GenerationPipeline {
        GenerationPipeline::new(store.clone(), Arc::new(translator), GenerationSettings::default())
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn greeting_batch_completes() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let raw = strings(&["Hello", "Good morning", "", "Thanks", "See you", "Bye"]);

        let outcome = pipeline(&store, ScriptedTranslator::echo())
            .generate(user, &raw, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.session.status, SessionStatus::Completed);
        assert_eq!(outcome.session.input_count, 5);
        assert_eq!(outcome.flashcards.len(), 5);
        assert_eq!(outcome.failed_count, 0);
        assert_eq!(outcome.flashcards[1].translation_pl, "pl: Good morning");
    }

    #[tokio::test]
    async fn oversized_batch_creates_no_session() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let raw: Vec<String> = (0..31).map(|i| format!("Sentence {i}")).collect();
        let translator = Arc::new(ScriptedTranslator::echo());

        let pipeline =
            GenerationPipeline::new(store.clone(), translator.clone(), GenerationSettings::default());
        let err = pipeline
            .generate(user, &raw, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::Validation(_)));
        assert!(store.sessions_for(user).await.is_empty());
        assert_eq!(translator.total_calls(), 0);
    }

    #[tokio::test]
    async fn over_quota_request_touches_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        store.seed_session(user, 30, now).await;
        store.seed_session(user, 30, now).await;
        store.seed_session(user, 30, now).await;
        store.seed_session(user, 8, now).await;
        let raw = strings(&["a", "b", "c", "d", "e"]);

        let err = pipeline(&store, ScriptedTranslator::echo())
            .generate_at(user, &raw, CancellationToken::new(), now)
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::QuotaExceeded { used: 98, requested: 5, .. }));
        assert_eq!(store.sessions_for(user).await.len(), 4);
        assert_eq!(store.write_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn all_failures_finalize_as_failed() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let raw = strings(&["a", "b", "c", "d", "e"]);

        let outcome = pipeline(&store, ScriptedTranslator::with_default(Reply::Permanent))
            .generate(user, &raw, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.session.status, SessionStatus::Failed);
        assert!(outcome.flashcards.is_empty());
        assert!(store.flashcards_for(user).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn proper_subset_failing_is_partial() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let raw = strings(&["a", "b", "c", "d", "e", "f"]);
        let translator = ScriptedTranslator::echo()
            .script("b", vec![Reply::Permanent])
            .script("e", vec![Reply::Transient]);

        let outcome = pipeline(&store, translator)
            .generate(user, &raw, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.session.status, SessionStatus::Partial);
        assert_eq!(outcome.session.generated_count, 4);
        assert_eq!(outcome.failed_count, 2);
        let kept: Vec<&str> = outcome.flashcards.iter().map(|c| c.sentence_en.as_str()).collect();
        assert_eq!(kept, ["a", "c", "d", "f"]);
    }

    #[tokio::test(start_paused = true)]
    async fn outage_returns_service_unavailable_after_finalizing() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let raw = strings(&["a", "b", "c", "d", "e"]);

        let err = pipeline(&store, ScriptedTranslator::with_default(Reply::Transient))
            .generate(user, &raw, CancellationToken::new())
            .await
            .unwrap_err();

        let GenerationError::ServiceUnavailable { session_id } = err else {
            panic!("expected ServiceUnavailable, got {err:?}");
        };
        let session = store
            .sessions_for(user)
            .await
            .into_iter()
            .find(|s| s.id == session_id)
            .unwrap();
        assert_eq!(session.status, SessionStatus::Failed);
        assert_eq!(session.generated_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retried_batches_never_share_flashcards() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let raw = strings(&["a", "b", "c", "d", "e"]);

        let first = pipeline(&store, ScriptedTranslator::echo().script("c", vec![Reply::Permanent]))
            .generate(user, &raw, CancellationToken::new())
            .await
            .unwrap();
        let second = pipeline(&store, ScriptedTranslator::echo())
            .generate(user, &raw, CancellationToken::new())
            .await
            .unwrap();

        assert_ne!(first.session.id, second.session.id);
        assert_eq!(first.flashcards.len(), 4);
        assert_eq!(second.flashcards.len(), 5);
        assert!(first
            .flashcards
            .iter()
            .all(|a| second.flashcards.iter().all(|b| a.id != b.id)));
        assert!(second
            .flashcards
            .iter()
            .all(|c| c.generation_session_id == Some(second.session.id)));
        assert_eq!(store.flashcards_for(user).await.len(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_request_still_finalizes() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let raw = strings(&["a", "b", "c", "d", "e"]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = pipeline(&store, ScriptedTranslator::echo())
            .generate(user, &raw, cancel)
            .await
            .unwrap();

        assert_eq!(outcome.session.status, SessionStatus::Failed);
        assert_eq!(
            outcome.session.error_message.as_deref(),
            Some("Generation was cancelled before any sentence was translated.")
        );
        assert!(store
            .sessions_for(user)
            .await
            .iter()
            .all(|s| s.status.is_terminal()));
    }

    #[tokio::test]
    async fn session_write_failure_aborts_before_translation() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_session_creation().await;
        let translator = Arc::new(ScriptedTranslator::echo());
        let pipeline =
            GenerationPipeline::new(store.clone(), translator.clone(), GenerationSettings::default());
        let raw = strings(&["a", "b", "c", "d", "e"]);

        let err = pipeline
            .generate(Uuid::new_v4(), &raw, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::Persistence(PortError::Unexpected(_))));
        assert_eq!(translator.total_calls(), 0);
    }

    #[tokio::test]
    async fn sessions_are_scoped_to_their_owner() {
        let store = Arc::new(InMemoryStore::new());
        let owner = Uuid::new_v4();
        let pipeline = pipeline(&store, ScriptedTranslator::echo());
        let raw = strings(&["a", "b", "c", "d", "e"]);
        let outcome = pipeline
            .generate(owner, &raw, CancellationToken::new())
            .await
            .unwrap();

        let own = pipeline.session(owner, outcome.session.id).await.unwrap();
        assert_eq!(own.id, outcome.session.id);

        let err = pipeline
            .session(Uuid::new_v4(), outcome.session.id)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Persistence(PortError::NotFound(_))));

        let quota = pipeline.quota_status(owner).await.unwrap();
        assert_eq!(quota.used, 5);
        assert_eq!(quota.remaining(), 95);
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn generate_runs_on_a_spawned_task() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let pipeline = Arc::new(pipeline(&store, ScriptedTranslator::echo()));
        let raw = strings(&["a", "b", "c", "d", "e"]);

        let future = pipeline.generate(user, &raw, CancellationToken::new());
        assert_send(&future);
        drop(future);

        let task_pipeline = pipeline.clone();
        let outcome = tokio::spawn(async move {
            task_pipeline
                .generate(user, &raw, CancellationToken::new())
                .await
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(outcome.session.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn finalization_failure_is_a_persistence_error() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_finalization().await;
        let user = Uuid::new_v4();
        let raw = strings(&["a", "b", "c", "d", "e"]);

        let err = pipeline(&store, ScriptedTranslator::echo())
            .generate(user, &raw, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::Persistence(PortError::Unexpected(_))));
        // The store was unreachable for the final update, so the row is still open.
        let sessions = store.sessions_for(user).await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].status, SessionStatus::Processing);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_store_is_failed_at_the_supervisory_limit() {
        let store = Arc::new(InMemoryStore::new());
        store.stall_inserts().await;
        let user = Uuid::new_v4();
        let raw = strings(&["a", "b", "c", "d", "e"]);
        let settings = GenerationSettings::default();
        let limit = settings.translator.batch_deadline + settings.supervisor_grace;
        let started = Instant::now();

        let outcome = pipeline(&store, ScriptedTranslator::echo())
            .generate(user, &raw, CancellationToken::new())
            .await
            .unwrap();

        assert!(started.elapsed() >= limit);
        assert_eq!(outcome.session.status, SessionStatus::Failed);
        assert_eq!(outcome.session.generated_count, 0);
        assert_eq!(outcome.failed_count, 5);
        let stored = store.sessions_for(user).await;
        assert_eq!(stored[0].status, SessionStatus::Failed);
        assert!(stored[0].error_message.is_some());
    }
}
