//! LLM provider clients.
//!
//! Two interchangeable backends produce the raw text the pipeline needs:
//!
//! | Backend | Transport | Narrative | Graph |
//! |---------|-----------|-----------|-------|
//! | [`OpenAiClient`] | `edgequake-llm` chat provider | chat, temp 0.7, 10 000 tokens | chat with JSON-only system message + diversity rules |
//! | [`DeepSeekClient`] | raw `reqwest` | `/chat/completions`, temp 0.7, 6 000 tokens | `/completions` with a plain prompt |
//!
//! Exactly one backend is chosen per process by [`select_provider`], and
//! [`build_client`] turns that choice into a `Arc<dyn ProviderClient>`:
//!
//! ```text
//!  ProviderSettings ──select_provider──▶ ProviderChoice ──build_client──▶ Arc<dyn ProviderClient>
//!   (flags + keys)     primary first      (no secrets in Debug)            (shared via AppContext)
//! ```

pub mod deepseek;
pub mod openai;

use crate::config::ProviderSettings;
use crate::error::{Pdf2GraphError, ProviderError};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

pub use deepseek::{DeepSeekClient, DeepSeekOptions};
pub use openai::{OpenAiClient, OpenAiOptions};

/// Which backend a client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    DeepSeek,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::DeepSeek => "deepseek",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A backend able to run both generation stages.
///
/// Implementations return the model's raw text. Trimming is their job;
/// JSON extraction is not.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Rewrite `text` as a relationship-rich explanatory narrative.
    async fn generate_narrative(&self, text: &str) -> Result<String, ProviderError>;

    /// Ask for a concept-graph JSON object describing `text`.
    async fn generate_graph(&self, text: &str) -> Result<String, ProviderError>;
}

/// The resolved backend and everything needed to construct it.
#[derive(Clone)]
pub enum ProviderChoice {
    OpenAi(OpenAiOptions),
    DeepSeek(DeepSeekOptions),
}

impl ProviderChoice {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderChoice::OpenAi(_) => ProviderKind::OpenAi,
            ProviderChoice::DeepSeek(_) => ProviderKind::DeepSeek,
        }
    }
}

impl fmt::Debug for ProviderChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderChoice::OpenAi(o) => f.debug_tuple("OpenAi").field(o).finish(),
            ProviderChoice::DeepSeek(o) => f.debug_tuple("DeepSeek").field(o).finish(),
        }
    }
}

/// Pick the backend for this process.
///
/// 1. Primary: `enable_openai` and an API key (or an injected provider).
/// 2. Fallback: `enable_deepseek` with both an API key and a base URL.
/// 3. Otherwise [`Pdf2GraphError::Configuration`].
pub fn select_provider(settings: &ProviderSettings) -> Result<ProviderChoice, Pdf2GraphError> {
    if settings.enable_openai {
        if settings.openai_api_key.is_some() || settings.openai_provider.is_some() {
            info!("Using OpenAI provider (model {})", settings.openai_model);
            return Ok(ProviderChoice::OpenAi(OpenAiOptions {
                model: settings.openai_model.clone(),
                api_key: settings.openai_api_key.clone(),
                provider: settings.openai_provider.clone(),
            }));
        }
        warn!("ENABLE_OPENAI is set but OPENAI_API_KEY is missing; trying DeepSeek");
    }

    if settings.enable_deepseek {
        match (&settings.deepseek_api_key, &settings.deepseek_api_url) {
            (Some(key), Some(url)) => {
                info!("Using DeepSeek provider at {}", url);
                return Ok(ProviderChoice::DeepSeek(DeepSeekOptions {
                    api_key: key.clone(),
                    base_url: url.clone(),
                    model: settings.deepseek_model.clone(),
                    timeout_secs: settings.request_timeout_secs,
                    max_attempts: settings.max_attempts,
                }));
            }
            _ => warn!("ENABLE_DEEPSEEK is set but DEEPSEEK_API_KEY or DEEPSEEK_API_URL is missing"),
        }
    }

    Err(Pdf2GraphError::Configuration(
        "No AI provider is enabled and configured.\n\
Set ENABLE_OPENAI=true with OPENAI_API_KEY, or ENABLE_DEEPSEEK=true with \
DEEPSEEK_API_KEY and DEEPSEEK_API_URL."
            .into(),
    ))
}

/// Construct the client for a resolved choice.
pub fn build_client(choice: ProviderChoice) -> Result<Arc<dyn ProviderClient>, Pdf2GraphError> {
    Ok(match choice {
        ProviderChoice::OpenAi(opts) => Arc::new(OpenAiClient::new(opts)?),
        ProviderChoice::DeepSeek(opts) => Arc::new(DeepSeekClient::new(opts)?),
    })
}

/// Map an HTTP failure status onto a [`ProviderError`].
///
/// For 422 the `detail` field of a JSON body is preferred over the raw body.
pub fn classify_status(provider: &str, status: u16, body: &str, url: &str) -> ProviderError {
    match status {
        401 => ProviderError::InvalidCredentials {
            provider: provider.to_string(),
        },
        404 => ProviderError::InvalidEndpoint {
            provider: provider.to_string(),
            url: url.to_string(),
        },
        422 => {
            let detail = serde_json::from_str::<serde_json::Value>(body)
                .ok()
                .and_then(|v| v.get("detail").cloned())
                .map(|d| match d {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .unwrap_or_else(|| body.trim().to_string());
            ProviderError::Validation {
                provider: provider.to_string(),
                detail,
            }
        }
        _ => ProviderError::Upstream {
            provider: provider.to_string(),
            status,
            message: body.trim().to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;

    #[test]
    fn fallback_chosen_when_primary_disabled() {
        let config = PipelineConfig::builder()
            .enable_openai(false)
            .deepseek("ds-key", "https://api.deepseek.com/v1")
            .build()
            .unwrap();
        let choice = select_provider(&config.providers).unwrap();
        assert_eq!(choice.kind(), ProviderKind::DeepSeek);
        match choice {
            ProviderChoice::DeepSeek(o) => {
                assert_eq!(o.base_url, "https://api.deepseek.com/v1");
                assert_eq!(o.max_attempts, 3);
            }
            other => panic!("expected DeepSeek, got {other:?}"),
        }
    }

    #[test]
    fn primary_wins_when_both_configured() {
        let config = PipelineConfig::builder()
            .openai("sk-test")
            .deepseek("ds-key", "https://api.deepseek.com/v1")
            .build()
            .unwrap();
        assert_eq!(select_provider(&config.providers).unwrap().kind(), ProviderKind::OpenAi);
    }

    #[test]
    fn primary_built_from_configured_key() {
        std::env::remove_var("OPENAI_API_KEY");
        let config = PipelineConfig::builder()
            .openai("sk-from-builder")
            .enable_deepseek(false)
            .build()
            .unwrap();
        match select_provider(&config.providers).unwrap() {
            ProviderChoice::OpenAi(o) => assert_eq!(o.api_key.as_deref(), Some("sk-from-builder")),
            other => panic!("expected OpenAi, got {other:?}"),
        }
        let client = build_client(select_provider(&config.providers).unwrap()).unwrap();
        assert_eq!(client.kind(), ProviderKind::OpenAi);
    }

    #[test]
    fn primary_without_key_falls_through() {
        let config = PipelineConfig::builder()
            .enable_openai(true)
            .deepseek("ds-key", "https://api.deepseek.com/v1")
            .build()
            .unwrap();
        assert_eq!(select_provider(&config.providers).unwrap().kind(), ProviderKind::DeepSeek);
    }

    #[test]
    fn both_disabled_is_configuration_error() {
        let config = PipelineConfig::builder()
            .enable_openai(false)
            .enable_deepseek(false)
            .build()
            .unwrap();
        assert!(matches!(
            select_provider(&config.providers),
            Err(Pdf2GraphError::Configuration(_))
        ));
    }

    #[test]
    fn fallback_needs_url() {
        let mut settings = ProviderSettings::default();
        settings.deepseek_api_key = Some("ds-key".into());
        assert!(select_provider(&settings).is_err());
    }

    #[test]
    fn choice_debug_hides_key() {
        let mut settings = ProviderSettings::default();
        settings.deepseek_api_key = Some("super-secret".into());
        settings.deepseek_api_url = Some("https://api.deepseek.com".into());
        let choice = select_provider(&settings).unwrap();
        assert!(!format!("{choice:?}").contains("super-secret"));
    }

    #[test]
    fn classify_known_statuses() {
        assert_eq!(
            classify_status("deepseek", 401, "", "u"),
            ProviderError::InvalidCredentials {
                provider: "deepseek".into()
            }
        );
        assert!(matches!(
            classify_status("deepseek", 404, "", "https://x/v1/completions"),
            ProviderError::InvalidEndpoint { url, .. } if url == "https://x/v1/completions"
        ));
        assert!(matches!(
            classify_status("deepseek", 503, " overloaded ", "u"),
            ProviderError::Upstream { status: 503, message, .. } if message == "overloaded"
        ));
    }

    #[test]
    fn classify_422_prefers_detail_field() {
        let e = classify_status("deepseek", 422, r#"{"detail":"max_tokens too large"}"#, "u");
        assert_eq!(
            e,
            ProviderError::Validation {
                provider: "deepseek".into(),
                detail: "max_tokens too large".into()
            }
        );

        let raw = classify_status("deepseek", 422, "bad body", "u");
        assert!(matches!(raw, ProviderError::Validation { detail, .. } if detail == "bad body"));
    }
}
