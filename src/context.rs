//! Shared application state.
//!
//! [`AppContext`] bundles what every entry point (CLI, HTTP handlers, library
//! callers) needs: configuration, the graph processor with its provider
//! client, the store, and the renderer. It is built once at startup and
//! cloned cheaply into each request.

use crate::config::PipelineConfig;
use crate::error::Pdf2GraphError;
use crate::pipeline::render::MermaidRenderer;
use crate::processor::GraphProcessor;
use crate::store::{GraphStore, SqliteGraphStore};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<PipelineConfig>,
    pub processor: Arc<GraphProcessor>,
    pub store: Arc<dyn GraphStore>,
    pub renderer: Arc<MermaidRenderer>,
}

impl AppContext {
    /// Build every component from configuration.
    ///
    /// Creates the upload/output directories, selects the provider (failing
    /// fast if none is usable) and opens the SQLite database.
    pub fn from_config(config: PipelineConfig) -> Result<Self, Pdf2GraphError> {
        config.ensure_directories()?;
        let processor = GraphProcessor::from_config(&config)?;
        let store = SqliteGraphStore::open(&config.database_path)?;
        let renderer = MermaidRenderer::from_config(&config);
        info!(
            "Application context ready (provider: {}, database: {})",
            processor.provider_kind(),
            config.database_path.display()
        );
        Ok(Self::new(config, processor, Arc::new(store), renderer))
    }

    /// Assemble a context from ready-made parts.
    pub fn new(
        config: PipelineConfig,
        processor: GraphProcessor,
        store: Arc<dyn GraphStore>,
        renderer: MermaidRenderer,
    ) -> Self {
        Self {
            config: Arc::new(config),
            processor: Arc::new(processor),
            store,
            renderer: Arc::new(renderer),
        }
    }
}
