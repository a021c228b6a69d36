//! crates/flashcard_core/src/normalizer.rs
//!
//! Turns the raw sentence list of a request into the ordered batch the rest of
//! the pipeline works on. Order is preserved: it defines the 1:1 mapping between
//! input sentences and generated flashcards.

use std::collections::HashSet;

use crate::error::{GenerationError, GenerationResult};

/// Bounds and toggles applied to incoming sentences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizationPolicy {
    pub min_sentences: usize,
    pub max_sentences: usize,
    /// Counted in Unicode scalar values, not bytes.
    pub max_sentence_chars: usize,
    pub deduplicate: bool,
}

impl Default for NormalizationPolicy {
    fn default() -> Self {
        Self {
            min_sentences: 5,
            max_sentences: 30,
            max_sentence_chars: 200,
            deduplicate: false,
        }
    }
}

/// The filtered, ordered sentences of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedBatch {
    sentences: Vec<String>,
}

impl NormalizedBatch {
    pub fn sentences(&self) -> &[String] {
        &self.sentences
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    /// The batch size as stored on the session row.
    pub fn input_count(&self) -> u32 {
        u32::try_from(self.sentences.len()).unwrap_or(u32::MAX)
    }
}

/// Trims every entry, drops the ones left empty, optionally drops exact
/// duplicates, then enforces the count and length bounds.
pub fn normalize_sentences<S: AsRef<str>>(
    raw: &[S],
    policy: &NormalizationPolicy,
) -> GenerationResult<NormalizedBatch> {
    let mut seen = HashSet::new();
    let sentences: Vec<String> = raw
        .iter()
        .map(|s| s.as_ref().trim())
        .filter(|s| !s.is_empty())
        .filter(|s| !policy.deduplicate || seen.insert(*s))
        .map(str::to_string)
        .collect();

    if sentences.len() < policy.min_sentences || sentences.len() > policy.max_sentences {
        return Err(GenerationError::Validation(format!(
            "Expected between {} and {} non-empty sentences, got {}",
            policy.min_sentences,
            policy.max_sentences,
            sentences.len()
        )));
    }

    if let Some(position) = sentences
        .iter()
        .position(|s| s.chars().count() > policy.max_sentence_chars)
    {
        return Err(GenerationError::Validation(format!(
            "Sentence {} exceeds {} characters",
            position + 1,
            policy.max_sentence_chars
        )));
    }

    Ok(NormalizedBatch { sentences })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentences(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("Sentence number {i}")).collect()
    }

    #[test]
    fn drops_empty_entries_and_keeps_order() {
        let raw = ["Hello", "Good morning", "", "Thanks", "See you", "Bye"];
        let batch = normalize_sentences(&raw, &NormalizationPolicy::default()).unwrap();

        assert_eq!(batch.len(), 5);
        assert_eq!(batch.input_count(), 5);
        assert_eq!(
            batch.sentences(),
            &["Hello", "Good morning", "Thanks", "See you", "Bye"]
        );
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let raw = ["  one ", "\ttwo", "three\n", "   ", "four", " five  "];
        let batch = normalize_sentences(&raw, &NormalizationPolicy::default()).unwrap();

        assert_eq!(batch.sentences(), &["one", "two", "three", "four", "five"]);
    }

    #[test]
    fn accepts_both_count_bounds() {
        let policy = NormalizationPolicy::default();
        assert!(normalize_sentences(&sentences(5), &policy).is_ok());
        assert!(normalize_sentences(&sentences(30), &policy).is_ok());
    }

    #[test]
    fn rejects_counts_outside_bounds_after_filtering() {
        let policy = NormalizationPolicy::default();

        let err = normalize_sentences(&sentences(31), &policy).unwrap_err();
        assert!(matches!(err, GenerationError::Validation(_)));

        let err = normalize_sentences(&sentences(4), &policy).unwrap_err();
        assert!(matches!(err, GenerationError::Validation(_)));

        // Five entries, but one is blank.
        let raw = ["a", "b", "c", "d", "  "];
        let err = normalize_sentences(&raw, &policy).unwrap_err();
        assert!(matches!(err, GenerationError::Validation(_)));
    }

    #[test]
    fn rejects_sentences_over_the_length_limit() {
        let mut raw = sentences(5);
        raw[2] = "x".repeat(201);
        let err = normalize_sentences(&raw, &NormalizationPolicy::default()).unwrap_err();
        match err {
            GenerationError::Validation(message) => assert!(message.contains("Sentence 3")),
            other => panic!("unexpected error: {other:?}"),
        }

        raw[2] = "x".repeat(200);
        assert!(normalize_sentences(&raw, &NormalizationPolicy::default()).is_ok());
    }

    #[test]
    fn length_limit_counts_characters_not_bytes() {
        let mut raw = sentences(5);
        raw[0] = "ż".repeat(200);
        assert!(normalize_sentences(&raw, &NormalizationPolicy::default()).is_ok());
    }

    #[test]
    fn keeps_duplicates_unless_deduplication_is_enabled() {
        let raw = ["Hi", "Hi", "Yes", "No", "Maybe", " Hi "];

        let batch = normalize_sentences(&raw, &NormalizationPolicy::default()).unwrap();
        assert_eq!(batch.len(), 6);

        let policy = NormalizationPolicy {
            deduplicate: true,
            ..NormalizationPolicy::default()
        };
        let err = normalize_sentences(&raw, &policy).unwrap_err();
        assert!(matches!(err, GenerationError::Validation(_)));

        let raw = ["Hi", "Hi", "Yes", "No", "Maybe", "Sure", "Fine"];
        let batch = normalize_sentences(&raw, &policy).unwrap();
        assert_eq!(batch.sentences(), &["Hi", "Yes", "No", "Maybe", "Sure", "Fine"]);
    }
}
