//! Orchestration of the two generation stages.
//!
//! ```text
//!  raw text ─validate─▶ narrative ─validate─▶ graph call ─extract─▶ ConceptGraph
//! ```
//!
//! [`GraphProcessor`] owns the validator and one provider client, chosen
//! once at construction. It is cheap to share behind an `Arc`; every call is
//! independent.

use crate::config::PipelineConfig;
use crate::error::Pdf2GraphError;
use crate::graph::ConceptGraph;
use crate::pipeline::extract::extract_graph;
use crate::pipeline::validate::TextValidator;
use crate::provider::{build_client, select_provider, ProviderClient, ProviderKind};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Result of a full two-stage run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub narrative: String,
    pub graph: ConceptGraph,
}

pub struct GraphProcessor {
    client: Arc<dyn ProviderClient>,
    validator: TextValidator,
}

impl GraphProcessor {
    /// Select and build the provider client from configuration.
    ///
    /// # Errors
    /// [`Pdf2GraphError::Configuration`] if no provider is usable.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, Pdf2GraphError> {
        let choice = select_provider(&config.providers)?;
        let client = build_client(choice)?;
        info!("Graph processor ready (provider: {})", client.kind());
        Ok(Self {
            client,
            validator: TextValidator::new(config.max_text_length),
        })
    }

    /// Use an already-constructed client.
    pub fn with_client(client: Arc<dyn ProviderClient>, validator: TextValidator) -> Self {
        Self { client, validator }
    }

    pub fn provider_kind(&self) -> ProviderKind {
        self.client.kind()
    }

    pub fn validator(&self) -> &TextValidator {
        &self.validator
    }

    /// Turn source text into an explanatory narrative.
    pub async fn generate_narrative(&self, text: &str) -> Result<String, Pdf2GraphError> {
        let text = self.validator.validate(text);
        debug!("Generating narrative from {} chars", text.chars().count());

        self.client.generate_narrative(&text).await.map_err(|e| {
            error!("Narrative generation failed ({}): {}", self.client.kind(), e);
            e.into()
        })
    }

    /// Ask for a concept graph and extract it from the model output.
    pub async fn generate_graph(&self, text: &str) -> Result<ConceptGraph, Pdf2GraphError> {
        let text = self.validator.validate(text);
        debug!("Generating graph from {} chars", text.chars().count());

        let raw = self.client.generate_graph(&text).await.map_err(|e| {
            error!("Graph generation failed ({}): {}", self.client.kind(), e);
            Pdf2GraphError::from(e)
        })?;

        let graph = extract_graph(&raw)?;

        let dangling = graph.dangling_links();
        if !dangling.is_empty() {
            warn!(
                "Graph has {} link(s) referencing unknown node ids, e.g. {} -> {}",
                dangling.len(),
                dangling[0].source,
                dangling[0].target
            );
        }

        info!(
            "Graph extracted: {} nodes, {} links",
            graph.nodes.len(),
            graph.links.len()
        );
        Ok(graph)
    }

    /// Narrative stage followed by the graph stage.
    pub async fn run(&self, raw_text: &str) -> Result<PipelineOutput, Pdf2GraphError> {
        let narrative = self.generate_narrative(raw_text).await?;
        let graph = self.generate_graph(&narrative).await?;
        Ok(PipelineOutput { narrative, graph })
    }
}
