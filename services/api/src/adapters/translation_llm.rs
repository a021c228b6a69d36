//! services/api/src/adapters/translation_llm.rs
//!
//! This module contains the adapter for the translation LLM.
//! It implements the `TranslationService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use flashcard_core::ports::{TranslationError, TranslationService};

const SYSTEM_PROMPT: &str = "You are a translation assistant for language learners. \
Translate the English sentence you receive into natural Polish. \
Respond with ONLY the Polish translation: no quotes, no notes, no explanation.";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `TranslationService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiTranslationAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiTranslationAdapter {
    /// Creates a new `OpenAiTranslationAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

/// Sorts an API failure into "try again" and "don't bother".
fn classify(error: OpenAIError) -> TranslationError {
    match error {
        OpenAIError::Reqwest(e) => TranslationError::Transient(e.to_string()),
        OpenAIError::ApiError(api_error) => match api_error.r#type.as_deref() {
            Some("invalid_request_error") => TranslationError::Permanent(api_error.message),
            _ => TranslationError::Transient(api_error.message),
        },
        other => TranslationError::Permanent(other.to_string()),
    }
}

/// Strips whitespace and the wrapping quotes models sometimes add anyway.
fn clean_translation(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\u{201E}' || c == '\u{201D}')
        .trim()
        .to_string()
}

//=========================================================================================
// `TranslationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl TranslationService for OpenAiTranslationAdapter {
    async fn translate(&self, sentence: &str) -> Result<String, TranslationError> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_PROMPT)
                .build()
                .map_err(|e| TranslationError::Permanent(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(sentence)
                .build()
                .map_err(|e| TranslationError::Permanent(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .temperature(0.2)
            .build()
            .map_err(|e| TranslationError::Permanent(e.to_string()))?;

        // Call the API and manually map the error if it occurs, which respects the orphan rule.
        let response = self.client.chat().create(request).await.map_err(classify)?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                TranslationError::Permanent(
                    "Translation LLM response contained no text content.".to_string(),
                )
            })?;

        let translation = clean_translation(&content);
        if translation.is_empty() {
            return Err(TranslationError::Permanent(
                "Translation LLM returned an empty translation.".to_string(),
            ));
        }
        Ok(translation)
    }
}
