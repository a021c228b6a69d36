//! crates/flashcard_core/src/translator.rs
//!
//! Drives the translation service over a batch: one call per sentence, bounded
//! parallelism, a retry for transient failures, and a deadline for the whole
//! batch. The output has the same length and order as the input.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::ports::{TranslationError, TranslationService};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslatorSettings {
    /// Upper bound on calls in flight at once.
    pub max_concurrency: usize,
    /// Extra attempts after a transient failure.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub retry_backoff: Duration,
    pub call_timeout: Duration,
    pub batch_deadline: Duration,
}

impl Default for TranslatorSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            max_retries: 1,
            retry_backoff: Duration::from_millis(250),
            call_timeout: Duration::from_secs(8),
            batch_deadline: Duration::from_secs(20),
        }
    }
}

/// Why a single sentence did not become a flashcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemFailure {
    /// Every attempt ran past the per-call timeout.
    Timeout,
    /// Every attempt failed with a transient service error.
    ServiceError,
    /// The service refused the sentence.
    Rejected,
    /// The service answered with something that is not a usable translation.
    InvalidOutput,
    /// The batch deadline passed before the sentence finished.
    DeadlineExceeded,
    /// The request was cancelled before the sentence was attempted.
    Cancelled,
    /// The flashcard could not be written.
    Persistence,
}

impl ItemFailure {
    /// Failures caused by the service being slow or down, as opposed to the input
    /// or our own store.
    pub const fn is_service_side(self) -> bool {
        matches!(self, Self::Timeout | Self::ServiceError | Self::DeadlineExceeded)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Translated(String),
    Failed(ItemFailure),
}

impl ItemOutcome {
    pub fn is_translated(&self) -> bool {
        matches!(self, Self::Translated(_))
    }
}

#[derive(Clone)]
pub struct BatchTranslator {
    service: Arc<dyn TranslationService>,
    settings: TranslatorSettings,
}

impl BatchTranslator {
    pub fn new(service: Arc<dyn TranslationService>, settings: TranslatorSettings) -> Self {
        Self { service, settings }
    }

    pub fn settings(&self) -> &TranslatorSettings {
        &self.settings
    }

    /// Translates every sentence, returning one outcome per sentence in input order.
    ///
    /// Once `cancel` fires no new calls are dispatched; sentences not yet started
    /// come back as `Cancelled`.
    pub async fn translate_batch(
        &self,
        sentences: &[String],
        cancel: &CancellationToken,
    ) -> Vec<ItemOutcome> {
        let deadline = Instant::now() + self.settings.batch_deadline;
        // Item futures own their inputs so the batch future is `Send` for any
        // caller lifetime.
        stream::iter(sentences.to_vec().into_iter().enumerate())
            .map(|(index, sentence)| {
                let translator = self.clone();
                let cancel = cancel.clone();
                async move {
                    translator
                        .translate_one(index, &sentence, deadline, &cancel)
                        .await
                }
            })
            .buffered(self.settings.max_concurrency.max(1))
            .collect()
            .await
    }

    async fn translate_one(
        &self,
        index: usize,
        sentence: &str,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> ItemOutcome {
        if cancel.is_cancelled() {
            return ItemOutcome::Failed(ItemFailure::Cancelled);
        }
        if Instant::now() >= deadline {
            debug!(index, "Batch deadline already passed; not dispatching.");
            return ItemOutcome::Failed(ItemFailure::DeadlineExceeded);
        }
        match tokio::time::timeout_at(deadline, self.attempt_with_retries(index, sentence, cancel)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(index, "Batch deadline passed before the sentence was translated.");
                ItemOutcome::Failed(ItemFailure::DeadlineExceeded)
            }
        }
    }

    async fn attempt_with_retries(
        &self,
        index: usize,
        sentence: &str,
        cancel: &CancellationToken,
    ) -> ItemOutcome {
        let mut attempt: u32 = 0;
        loop {
            let failure = match tokio::time::timeout(
                self.settings.call_timeout,
                self.service.translate(sentence),
            )
            .await
            {
                Ok(Ok(translation)) => {
                    debug!(index, attempt, "Sentence translated.");
                    return ItemOutcome::Translated(translation);
                }
                Ok(Err(TranslationError::Permanent(reason))) => {
                    warn!(index, %reason, "Translation service rejected the sentence.");
                    return ItemOutcome::Failed(ItemFailure::Rejected);
                }
                Ok(Err(TranslationError::Transient(reason))) => {
                    warn!(index, attempt, %reason, "Transient translation failure.");
                    ItemFailure::ServiceError
                }
                Err(_) => {
                    warn!(index, attempt, "Translation call timed out.");
                    ItemFailure::Timeout
                }
            };

            if attempt >= self.settings.max_retries || cancel.is_cancelled() {
                return ItemOutcome::Failed(failure);
            }

            let delay = self.settings.retry_backoff.saturating_mul(2u32.saturating_pow(attempt));
            tokio::select! {
                _ = cancel.cancelled() => return ItemOutcome::Failed(failure),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}
