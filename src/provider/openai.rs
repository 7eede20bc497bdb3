//! Primary backend: an `edgequake-llm` chat provider.
//!
//! The provider is an [`OpenAIProvider`] built from the configured key and
//! model, or injected ready-made via [`OpenAiOptions::provider`]. The
//! process environment is never consulted here.

use super::{classify_status, ProviderClient, ProviderKind};
use crate::error::{Pdf2GraphError, ProviderError};
use crate::prompts::{graph_prompt, narrative_user_message, GRAPH_SYSTEM_PROMPT, NARRATIVE_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, LlmError, OpenAIProvider};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

const PROVIDER: &str = "openai";

const NARRATIVE_MAX_TOKENS: usize = 10_000;
const GRAPH_MAX_TOKENS: usize = 6000;
const TEMPERATURE: f32 = 0.7;

/// How to obtain the chat provider.
#[derive(Clone)]
pub struct OpenAiOptions {
    pub model: String,
    /// Key for a provider built here. Ignored when `provider` is set.
    pub api_key: Option<String>,
    /// Ready-made provider; `model` is then informational only.
    pub provider: Option<Arc<dyn LLMProvider>>,
}

impl fmt::Debug for OpenAiOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiOptions")
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .finish()
    }
}

pub struct OpenAiClient {
    provider: Arc<dyn LLMProvider>,
    model: String,
}

impl OpenAiClient {
    /// # Errors
    /// [`Pdf2GraphError::Configuration`] when neither a provider nor a key
    /// was supplied.
    pub fn new(opts: OpenAiOptions) -> Result<Self, Pdf2GraphError> {
        let provider: Arc<dyn LLMProvider> = match (opts.provider, opts.api_key) {
            (Some(p), _) => p,
            (None, Some(key)) => Arc::new(OpenAIProvider::new(key).with_model(&opts.model)),
            (None, None) => {
                return Err(Pdf2GraphError::Configuration(
                    "OpenAI provider selected without OPENAI_API_KEY".into(),
                ))
            }
        };
        Ok(Self {
            provider,
            model: opts.model,
        })
    }

    async fn chat(&self, messages: Vec<ChatMessage>, max_tokens: usize) -> Result<String, ProviderError> {
        let options = CompletionOptions {
            temperature: Some(TEMPERATURE),
            max_tokens: Some(max_tokens),
            ..Default::default()
        };

        let start = Instant::now();
        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| {
                let err = classify_llm_error(&e, &self.model);
                warn!("{} ({}): {} [{}]", PROVIDER, self.model, e, err.reason());
                err
            })?;

        debug!(
            "{} ({}): {} input tokens, {} output tokens, {:?}",
            PROVIDER,
            self.model,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        let content = response.content.trim();
        if content.is_empty() {
            return Err(ProviderError::MalformedResponse {
                provider: PROVIDER.to_string(),
                detail: "empty completion".into(),
            });
        }
        Ok(content.to_string())
    }
}

/// Map an `edgequake-llm` error onto a [`ProviderError`].
///
/// Only the catch-all `ApiError` carries its HTTP status in the message, so
/// that is the one case where the text is scanned.
pub fn classify_llm_error(err: &LlmError, model: &str) -> ProviderError {
    let provider = PROVIDER.to_string();
    match err {
        LlmError::AuthError(_) => ProviderError::InvalidCredentials { provider },
        LlmError::ModelNotFound(_) => ProviderError::InvalidEndpoint {
            provider,
            url: format!("model '{model}'"),
        },
        LlmError::InvalidRequest(detail) => ProviderError::Validation {
            provider,
            detail: detail.clone(),
        },
        LlmError::TokenLimitExceeded { .. } => ProviderError::Validation {
            provider,
            detail: err.to_string(),
        },
        LlmError::Timeout => ProviderError::Timeout { provider, attempts: 1 },
        LlmError::NetworkError(detail) => ProviderError::Transport {
            provider,
            detail: detail.clone(),
        },
        LlmError::RateLimited(message) => ProviderError::Upstream {
            provider,
            status: 429,
            message: message.clone(),
        },
        LlmError::SerializationError(e) => ProviderError::MalformedResponse {
            provider,
            detail: e.to_string(),
        },
        LlmError::ApiError(message) => match find_status(message) {
            Some(status) => classify_status(PROVIDER, status, message, &format!("model '{model}'")),
            None => ProviderError::Transport {
                provider,
                detail: err.to_string(),
            },
        },
        other => ProviderError::Transport {
            provider,
            detail: other.to_string(),
        },
    }
}

/// First three-digit 4xx/5xx number in the text.
fn find_status(text: &str) -> Option<u16> {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|tok| tok.len() == 3)
        .filter_map(|tok| tok.parse::<u16>().ok())
        .find(|n| (400..600).contains(n))
}

#[async_trait]
impl ProviderClient for OpenAiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn generate_narrative(&self, text: &str) -> Result<String, ProviderError> {
        let messages = vec![
            ChatMessage::system(NARRATIVE_SYSTEM_PROMPT),
            ChatMessage::user(narrative_user_message(text)),
        ];
        self.chat(messages, NARRATIVE_MAX_TOKENS).await
    }

    async fn generate_graph(&self, text: &str) -> Result<String, ProviderError> {
        let messages = vec![
            ChatMessage::system(GRAPH_SYSTEM_PROMPT),
            ChatMessage::user(graph_prompt(text, true)),
        ];
        self.chat(messages, GRAPH_MAX_TOKENS).await
    }
}
