//! Configuration types for the PDF-to-concept-graph pipeline.
//!
//! Everything the pipeline reads at startup lives in [`PipelineConfig`]:
//! which LLM provider may be used and with which credentials, the validator
//! bound, artifact directories, and the Mermaid CLI location. It can be built
//! three ways:
//!
//! * [`PipelineConfig::from_env`] — the deployment path. Reads the
//!   environment-style keys listed on [`PipelineConfig::from_lookup`]
//!   (after [`load_env_file`] has merged a `.env` file).
//! * [`PipelineConfig::builder`] — library callers and tests.
//! * [`PipelineConfig::default`] — no provider enabled except the DeepSeek
//!   flag, which still needs a key and URL before it is usable.

use crate::error::Pdf2GraphError;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Default character bound applied to every text sent to a provider.
pub const DEFAULT_MAX_TEXT_LENGTH: usize = 6000;

/// Default model for the primary (OpenAI) provider.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4";

/// Default model for the fallback (DeepSeek) provider.
pub const DEFAULT_DEEPSEEK_MODEL: &str = "deepseek-chat";

/// Provider enablement and credentials.
#[derive(Clone)]
pub struct ProviderSettings {
    /// `ENABLE_OPENAI`. Default: false.
    pub enable_openai: bool,
    /// `OPENAI_API_KEY`.
    pub openai_api_key: Option<String>,
    /// `OPENAI_MODEL`. Default: [`DEFAULT_OPENAI_MODEL`].
    pub openai_model: String,
    /// Pre-constructed chat provider for the primary client. Takes precedence
    /// over building one from `openai_model`.
    pub openai_provider: Option<Arc<dyn LLMProvider>>,

    /// `ENABLE_DEEPSEEK`. Default: true.
    pub enable_deepseek: bool,
    /// `DEEPSEEK_API_KEY`.
    pub deepseek_api_key: Option<String>,
    /// `DEEPSEEK_API_URL`, e.g. `https://api.deepseek.com/v1`.
    pub deepseek_api_url: Option<String>,
    /// `DEEPSEEK_MODEL`. Default: [`DEFAULT_DEEPSEEK_MODEL`].
    pub deepseek_model: String,

    /// Per-request timeout for the DeepSeek client, in seconds. Default: 90.
    pub request_timeout_secs: u64,
    /// Total attempts for a DeepSeek request that keeps timing out. Default: 3.
    pub max_attempts: u32,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enable_openai: false,
            openai_api_key: None,
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            openai_provider: None,
            enable_deepseek: true,
            deepseek_api_key: None,
            deepseek_api_url: None,
            deepseek_model: DEFAULT_DEEPSEEK_MODEL.to_string(),
            request_timeout_secs: 90,
            max_attempts: 3,
        }
    }
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |k: &Option<String>| k.as_ref().map(|_| "<redacted>");
        f.debug_struct("ProviderSettings")
            .field("enable_openai", &self.enable_openai)
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("openai_model", &self.openai_model)
            .field(
                "openai_provider",
                &self.openai_provider.as_ref().map(|_| "<dyn LLMProvider>"),
            )
            .field("enable_deepseek", &self.enable_deepseek)
            .field("deepseek_api_key", &redact(&self.deepseek_api_key))
            .field("deepseek_api_url", &self.deepseek_api_url)
            .field("deepseek_model", &self.deepseek_model)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

/// Full configuration for the pipeline and its collaborators.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub providers: ProviderSettings,

    /// Hard character bound for provider input. Default: 6000.
    ///
    /// Longer text is truncated, not chunked or summarised.
    pub max_text_length: usize,

    /// Where uploaded PDFs are written (server). Default: `uploads`.
    pub upload_dir: PathBuf,

    /// Where `.mmd` sources and rendered `.svg` files go. Default: `output`.
    pub output_dir: PathBuf,

    /// SQLite database file. Default: `graphs.db`.
    pub database_path: PathBuf,

    /// Explicit Mermaid CLI path. If None, `mmdc` is searched on `PATH`.
    pub mmdc_path: Option<PathBuf>,

    /// Which link field labels the rendered edges. Default: [`EdgeLabel::Type`].
    pub edge_label: EdgeLabel,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// `LOG_LEVEL=DEBUG` was set. Read by the binary's subscriber setup.
    pub debug_logging: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            providers: ProviderSettings::default(),
            max_text_length: DEFAULT_MAX_TEXT_LENGTH,
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("output"),
            database_path: PathBuf::from("graphs.db"),
            mmdc_path: None,
            edge_label: EdgeLabel::default(),
            download_timeout_secs: 120,
            debug_logging: false,
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key/value lookup.
    ///
    /// Keys: `ENABLE_OPENAI`, `OPENAI_API_KEY`, `OPENAI_MODEL`,
    /// `ENABLE_DEEPSEEK`, `DEEPSEEK_API_KEY`, `DEEPSEEK_API_URL`,
    /// `DEEPSEEK_MODEL`, `PDF2GRAPH_MAX_TEXT_LENGTH`, `PDF2GRAPH_UPLOAD_DIR`,
    /// `PDF2GRAPH_OUTPUT_DIR`, `PDF2GRAPH_DATABASE`, `MMDC_PATH`,
    /// `PDF2GRAPH_EDGE_LABEL`, `LOG_LEVEL`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let providers = ProviderSettings {
            enable_openai: get("ENABLE_OPENAI").map_or(false, |v| parse_flag(&v)),
            openai_api_key: get("OPENAI_API_KEY"),
            openai_model: get("OPENAI_MODEL").unwrap_or(defaults.providers.openai_model),
            openai_provider: None,
            enable_deepseek: get("ENABLE_DEEPSEEK").map_or(true, |v| parse_flag(&v)),
            deepseek_api_key: get("DEEPSEEK_API_KEY"),
            deepseek_api_url: get("DEEPSEEK_API_URL"),
            deepseek_model: get("DEEPSEEK_MODEL").unwrap_or(defaults.providers.deepseek_model),
            ..defaults.providers
        };

        let config = Self {
            providers,
            max_text_length: get("PDF2GRAPH_MAX_TEXT_LENGTH")
                .and_then(|v| v.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.max_text_length),
            upload_dir: get("PDF2GRAPH_UPLOAD_DIR").map_or(defaults.upload_dir, PathBuf::from),
            output_dir: get("PDF2GRAPH_OUTPUT_DIR").map_or(defaults.output_dir, PathBuf::from),
            database_path: get("PDF2GRAPH_DATABASE").map_or(defaults.database_path, PathBuf::from),
            mmdc_path: get("MMDC_PATH").map(PathBuf::from),
            edge_label: get("PDF2GRAPH_EDGE_LABEL")
                .and_then(|v| EdgeLabel::parse(&v))
                .unwrap_or_default(),
            download_timeout_secs: defaults.download_timeout_secs,
            debug_logging: get("LOG_LEVEL").is_some_and(|v| v.eq_ignore_ascii_case("debug")),
        };

        debug!(?config, "Loaded configuration");
        config
    }

    /// Create the upload and output directories if they are missing.
    pub fn ensure_directories(&self) -> Result<(), Pdf2GraphError> {
        for dir in [&self.upload_dir, &self.output_dir] {
            std::fs::create_dir_all(dir).map_err(|e| Pdf2GraphError::OutputWriteFailed {
                path: dir.clone(),
                source: e,
            })?;
            debug!("Ensured directory exists: {}", dir.display());
        }
        Ok(())
    }
}

/// Merge a `.env` file into the process environment, if one exists.
///
/// Looks for `path` when given, otherwise searches upward from the current
/// directory. A missing file is not an error; a malformed one is.
pub fn load_env_file(path: Option<&Path>) -> Result<Option<PathBuf>, Pdf2GraphError> {
    let result = match path {
        Some(p) => dotenvy::from_path(p).map(|_| p.to_path_buf()),
        None => dotenvy::dotenv(),
    };
    match result {
        Ok(loaded) => {
            info!("Loaded environment variables from {}", loaded.display());
            Ok(Some(loaded))
        }
        Err(e) if e.not_found() => {
            debug!("No .env file found; using process environment only");
            Ok(None)
        }
        Err(e) => Err(Pdf2GraphError::Configuration(format!(
            "Failed to load .env file: {e}"
        ))),
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Enable the primary provider with the given API key.
    pub fn openai(mut self, api_key: impl Into<String>) -> Self {
        self.config.providers.enable_openai = true;
        self.config.providers.openai_api_key = Some(api_key.into());
        self
    }

    pub fn openai_model(mut self, model: impl Into<String>) -> Self {
        self.config.providers.openai_model = model.into();
        self
    }

    pub fn openai_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.providers.openai_provider = Some(provider);
        self
    }

    /// Enable the fallback provider with the given key and base URL.
    pub fn deepseek(mut self, api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        self.config.providers.enable_deepseek = true;
        self.config.providers.deepseek_api_key = Some(api_key.into());
        self.config.providers.deepseek_api_url = Some(base_url.into());
        self
    }

    pub fn deepseek_model(mut self, model: impl Into<String>) -> Self {
        self.config.providers.deepseek_model = model.into();
        self
    }

    pub fn enable_openai(mut self, v: bool) -> Self {
        self.config.providers.enable_openai = v;
        self
    }

    pub fn enable_deepseek(mut self, v: bool) -> Self {
        self.config.providers.enable_deepseek = v;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.providers.request_timeout_secs = secs.max(1);
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.providers.max_attempts = n.max(1);
        self
    }

    pub fn max_text_length(mut self, n: usize) -> Self {
        self.config.max_text_length = n;
        self
    }

    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.database_path = path.into();
        self
    }

    pub fn mmdc_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.mmdc_path = Some(path.into());
        self
    }

    pub fn edge_label(mut self, label: EdgeLabel) -> Self {
        self.config.edge_label = label;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// Provider availability is *not* checked here; that happens once, when
    /// the [`crate::processor::GraphProcessor`] is constructed.
    pub fn build(self) -> Result<PipelineConfig, Pdf2GraphError> {
        let c = &self.config;
        if c.max_text_length == 0 {
            return Err(Pdf2GraphError::Configuration(
                "max_text_length must be ≥ 1".into(),
            ));
        }
        if let Some(ref url) = c.providers.deepseek_api_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Pdf2GraphError::Configuration(format!(
                    "DEEPSEEK_API_URL must be an http(s) URL, got '{url}'"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which link field becomes the edge label in the rendered diagram.
///
/// | Variant | Label |
/// |---------|-------|
/// | `Type` | the relationship category (`causal`, `hierarchical`, …) — default |
/// | `Description` | the specific relationship text, falling back to `type` when empty |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeLabel {
    #[default]
    Type,
    Description,
}

impl EdgeLabel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "type" => Some(EdgeLabel::Type),
            "description" => Some(EdgeLabel::Description),
            _ => None,
        }
    }
}
