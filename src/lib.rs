//! # pdf2graph
//!
//! Turn PDF documents into concept graphs with an LLM, and render them as
//! Mermaid flowcharts.
//!
//! ## Why two model calls?
//!
//! Asking a model for a graph straight from raw PDF text yields vague,
//! repetitive links ("related to", "connection"). Having it first rewrite the
//! text as an explanatory narrative whose sentences are explicit
//! concept-relationship-concept statements, then asking for the graph of
//! *that*, gives far more specific edges.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      resolve local file or download from URL, read text (pdf-extract)
//!  ├─ 2. Validate   warn on mangled numbers, bound to 6000 chars
//!  ├─ 3. Narrative  provider call #1 (OpenAI via edgequake-llm, or DeepSeek)
//!  ├─ 4. Graph      provider call #2 → first {nodes, links} JSON object in the reply
//!  ├─ 5. Persist    SQLite record with full-text search (optional)
//!  └─ 6. Render     Mermaid `graph TD` text → SVG via mmdc (optional)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2graph::{convert, AppContext, ConvertOptions, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     pdf2graph::load_env_file(None)?;
//!     // DeepSeek is enabled by default; it needs DEEPSEEK_API_KEY + DEEPSEEK_API_URL.
//!     let ctx = AppContext::from_config(PipelineConfig::from_env())?;
//!     let output = convert("lecture.pdf", &ctx, &ConvertOptions::default()).await?;
//!     println!("{}", output.mermaid);
//!     eprintln!("{} nodes, {} links", output.graph.nodes.len(), output.graph.links.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `pdf2graph` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `server` | on      | Enables [`server`], the axum HTTP API |
//!
//! Disable both when using only the library:
//! ```toml
//! pdf2graph = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod context;
pub mod convert;
pub mod error;
pub mod graph;
pub mod pipeline;
pub mod processor;
pub mod progress;
pub mod prompts;
pub mod provider;
#[cfg(feature = "server")]
pub mod server;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{load_env_file, EdgeLabel, PipelineConfig, PipelineConfigBuilder, ProviderSettings};
pub use context::AppContext;
pub use convert::{convert, convert_text, convert_to_file, render_graph, ConvertOptions, ConvertOutput};
pub use error::{Pdf2GraphError, ProviderError};
pub use graph::{ConceptGraph, GraphRecord, Link, NewGraphRecord, Node};
pub use pipeline::extract::extract_graph;
pub use pipeline::mermaid::{sanitize_id, to_mermaid};
pub use pipeline::render::{MermaidRenderer, RenderedDiagram};
pub use pipeline::validate::TextValidator;
pub use processor::{GraphProcessor, PipelineOutput};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback, Stage};
pub use provider::{build_client, select_provider, ProviderChoice, ProviderClient, ProviderKind};
pub use store::{run_blocking, GraphStore, SqliteGraphStore};
