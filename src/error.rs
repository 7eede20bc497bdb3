//! Error types for the pdf2graph library.
//!
//! Two error types reflect two layers of failure:
//!
//! * [`ProviderError`] — an upstream LLM call failed. The variant says *why*
//!   (bad key, wrong endpoint, rejected request, timeout, …) so callers can
//!   tell a configuration problem from a flaky network.
//!
//! * [`Pdf2GraphError`] — everything a public operation can return. Provider
//!   failures are wrapped unchanged in [`Pdf2GraphError::Provider`].
//!
//! The only failures the pipeline absorbs on its own are input truncation
//! (see [`crate::pipeline::validate`]) and skipping unparsable JSON spans
//! (see [`crate::pipeline::extract`]). Everything else surfaces here.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the pdf2graph library.
#[derive(Debug, Error)]
pub enum Pdf2GraphError {
    // ── Startup errors ────────────────────────────────────────────────────
    /// No usable LLM provider could be resolved from configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The provider call failed. See [`ProviderError`] for the reason.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The model output contained no JSON object with `nodes` and `links`.
    #[error("No valid graph JSON found in response ({len} chars of model output)")]
    NoGraphFound { len: usize },

    // ── Render errors ─────────────────────────────────────────────────────
    /// The Mermaid CLI executable could not be located.
    #[error(
        "Mermaid CLI not found (searched: {searched}).\n\
Install it with: npm install -g @mermaid-js/mermaid-cli\n\
Or set MMDC_PATH to an existing mmdc executable."
    )]
    RenderUnavailable { searched: String },

    /// The Mermaid CLI ran but exited with a failure status.
    #[error("Mermaid CLI failed (exit status {status}): {stderr}")]
    RenderFailed { status: String, stderr: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// pdf-extract could not read text out of the document.
    #[error("Text extraction failed for '{path}': {detail}")]
    TextExtractionFailed { path: PathBuf, detail: String },

    /// The document parsed but yielded no text after cleanup.
    #[error("No extractable text in '{path}' (scanned or image-only PDF?)")]
    EmptyDocument { path: PathBuf },

    // ── Storage errors ────────────────────────────────────────────────────
    /// The graph store rejected an operation.
    #[error("Storage error: {0}")]
    Storage(String),

    /// No stored record or artifact matches the given id.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A search query was empty or sanitised down to nothing.
    #[error("Invalid search query: {0}")]
    InvalidQuery(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output artifact.
    #[error("Failed to write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why an upstream LLM call failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// HTTP 401 — the API key was rejected.
    #[error("Invalid API key for provider '{provider}'")]
    InvalidCredentials { provider: String },

    /// HTTP 404 — the base URL or model route does not exist.
    #[error("Invalid API endpoint for provider '{provider}': {url}")]
    InvalidEndpoint { provider: String, url: String },

    /// HTTP 422 — the provider rejected the request body.
    #[error("API validation error from '{provider}': {detail}")]
    Validation { provider: String, detail: String },

    /// Any other non-success status.
    #[error("Provider '{provider}' returned HTTP {status}: {message}")]
    Upstream {
        provider: String,
        status: u16,
        message: String,
    },

    /// Every attempt timed out.
    #[error("Provider '{provider}' timed out after {attempts} attempt(s)")]
    Timeout { provider: String, attempts: u32 },

    /// Connection-level failure (DNS, TLS, reset). Not retried.
    #[error("Transport error talking to '{provider}': {detail}")]
    Transport { provider: String, detail: String },

    /// Success status, but the body lacked the expected content.
    #[error("Malformed response from '{provider}': {detail}")]
    MalformedResponse { provider: String, detail: String },
}

impl ProviderError {
    /// Short machine-friendly label used in logs and HTTP error bodies.
    pub fn reason(&self) -> &'static str {
        match self {
            ProviderError::InvalidCredentials { .. } => "invalid_credentials",
            ProviderError::InvalidEndpoint { .. } => "invalid_endpoint",
            ProviderError::Validation { .. } => "validation",
            ProviderError::Upstream { .. } => "upstream",
            ProviderError::Timeout { .. } => "timeout",
            ProviderError::Transport { .. } => "transport",
            ProviderError::MalformedResponse { .. } => "malformed_response",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_is_transparent() {
        let e: Pdf2GraphError = ProviderError::InvalidCredentials {
            provider: "deepseek".into(),
        }
        .into();
        assert_eq!(e.to_string(), "Invalid API key for provider 'deepseek'");
    }

    #[test]
    fn validation_display_carries_detail() {
        let e = ProviderError::Validation {
            provider: "deepseek".into(),
            detail: "max_tokens too large".into(),
        };
        assert!(e.to_string().contains("max_tokens too large"));
        assert_eq!(e.reason(), "validation");
    }

    #[test]
    fn render_unavailable_display() {
        let e = Pdf2GraphError::RenderUnavailable {
            searched: "/opt/mmdc".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("npm install -g @mermaid-js/mermaid-cli"));
        assert!(msg.contains("/opt/mmdc"));
    }

    #[test]
    fn timeout_display() {
        let e = ProviderError::Timeout {
            provider: "deepseek".into(),
            attempts: 3,
        };
        assert!(e.to_string().contains("3 attempt"));
    }
}
