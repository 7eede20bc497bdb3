//! End-to-end conversion entry points.
//!
//! ```text
//!  PDF path / URL
//!      │ resolve + extract text          (pipeline::input)
//!      ▼
//!  raw text ──▶ narrative ──▶ ConceptGraph (GraphProcessor)
//!      │
//!      ├─ persist ──▶ GraphRecord        (GraphStore, optional)
//!      │
//!      └─ to_mermaid ──▶ mmdc ──▶ .svg   (MermaidRenderer, optional)
//! ```
//!
//! Persisting happens before rendering. A render failure does not undo the
//! stored record: it is returned in [`ConvertOutput::render_error`] next to
//! the record so the caller can decide what to report.

use crate::context::AppContext;
use crate::error::Pdf2GraphError;
use crate::graph::{ConceptGraph, GraphRecord, NewGraphRecord};
use crate::pipeline::mermaid::to_mermaid;
use crate::pipeline::{input, render::RenderedDiagram};
use crate::progress::{ProgressCallback, Stage};
use crate::store;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Per-call options for [`convert`] and [`convert_text`].
#[derive(Clone)]
pub struct ConvertOptions {
    /// Record title. Default: the PDF file name without extension.
    pub title: Option<String>,
    /// Store the result. Default: true.
    pub persist: bool,
    /// Render the Mermaid diagram to SVG. Default: true.
    pub render: bool,
    /// File stem for the `.mmd` / `.svg` artifacts. Default: a fresh UUID.
    pub stem: Option<String>,
    pub progress: Option<ProgressCallback>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            title: None,
            persist: true,
            render: true,
            stem: None,
            progress: None,
        }
    }
}

/// Everything a conversion produced.
#[derive(Debug)]
pub struct ConvertOutput {
    pub title: String,
    pub narrative: String,
    pub graph: ConceptGraph,
    /// Mermaid flowchart text for `graph`.
    pub mermaid: String,
    /// Present when the result was persisted.
    pub record: Option<GraphRecord>,
    /// Artifact stem used for the diagram files.
    pub stem: String,
    /// Present when rendering was requested and succeeded.
    pub diagram: Option<RenderedDiagram>,
    /// Present when rendering was requested and failed.
    pub render_error: Option<Pdf2GraphError>,
    pub duration_ms: u64,
}

/// Run a stage, reporting start/complete/error to the progress callback.
async fn run_stage<T, F>(
    progress: &Option<ProgressCallback>,
    stage: Stage,
    measure: impl Fn(&T) -> usize,
    fut: F,
) -> Result<T, Pdf2GraphError>
where
    F: std::future::Future<Output = Result<T, Pdf2GraphError>>,
{
    if let Some(cb) = progress {
        cb.on_stage_start(stage);
    }
    let result = fut.await;
    if let Some(cb) = progress {
        match &result {
            Ok(v) => cb.on_stage_complete(stage, measure(v)),
            Err(e) => cb.on_stage_error(stage, &e.to_string()),
        }
    }
    result
}

/// Convert a PDF file or URL into a concept graph.
///
/// # Errors
/// Input, extraction, provider, extraction-of-JSON and storage failures are
/// fatal. Render failures are not; see [`ConvertOutput::render_error`].
pub async fn convert(
    input_str: impl AsRef<str>,
    ctx: &AppContext,
    options: &ConvertOptions,
) -> Result<ConvertOutput, Pdf2GraphError> {
    let input_str = input_str.as_ref();
    info!("Starting conversion: {}", input_str);

    let resolved = input::resolve_input(input_str, ctx.config.download_timeout_secs).await?;
    let extracted = run_stage(
        &options.progress,
        Stage::Extract,
        |t: &input::ExtractedText| t.text.chars().count(),
        input::extract_text(resolved.path()),
    )
    .await?;

    let title = options.title.clone().unwrap_or_else(|| resolved.title());
    convert_text(&extracted.text, &title, ctx, options).await
}

/// Run the pipeline on already-extracted text.
pub async fn convert_text(
    text: &str,
    title: &str,
    ctx: &AppContext,
    options: &ConvertOptions,
) -> Result<ConvertOutput, Pdf2GraphError> {
    let start = Instant::now();
    let progress = &options.progress;

    let narrative = run_stage(
        progress,
        Stage::Narrative,
        |n: &String| n.chars().count(),
        ctx.processor.generate_narrative(text),
    )
    .await?;

    let graph = run_stage(
        progress,
        Stage::Graph,
        |g: &ConceptGraph| g.nodes.len(),
        ctx.processor.generate_graph(&narrative),
    )
    .await?;

    let record = if options.persist {
        let new = NewGraphRecord::new(title, narrative.clone(), graph.clone());
        let stored = run_stage(
            progress,
            Stage::Persist,
            |_| 0,
            store::run_blocking(&ctx.store, move |s| s.insert(new)),
        )
        .await?;
        info!("Persisted graph {} ('{}')", stored.id, stored.title);
        Some(stored)
    } else {
        None
    };

    let mermaid = to_mermaid(&graph, ctx.config.edge_label);
    let stem = options
        .stem
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let (diagram, render_error) = if options.render {
        match run_stage(
            progress,
            Stage::Render,
            |_| 0,
            ctx.renderer.render(&mermaid, &stem),
        )
        .await
        {
            Ok(d) => (Some(d), None),
            Err(e) => {
                warn!("Rendering failed after the graph was produced: {}", e);
                (None, Some(e))
            }
        }
    } else {
        (None, None)
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Conversion complete: {} nodes, {} links in {}ms",
        graph.nodes.len(),
        graph.links.len(),
        duration_ms
    );

    Ok(ConvertOutput {
        title: title.to_string(),
        narrative,
        graph,
        mermaid,
        record,
        stem,
        diagram,
        render_error,
        duration_ms,
    })
}

/// Render an arbitrary graph to SVG content without keeping any files.
pub async fn render_graph(graph: &ConceptGraph, ctx: &AppContext) -> Result<String, Pdf2GraphError> {
    let mermaid = to_mermaid(graph, ctx.config.edge_label);
    ctx.renderer.render_to_string(&mermaid).await.map_err(|e| {
        error!("Ephemeral render failed: {}", e);
        e
    })
}

/// Convert and write `{title, graph_id, summary_text, graph_data}` JSON to `output_path`.
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    ctx: &AppContext,
    options: &ConvertOptions,
) -> Result<ConvertOutput, Pdf2GraphError> {
    let output = convert(input_str, ctx, options).await?;
    let path = output_path.as_ref();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Pdf2GraphError::OutputWriteFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }

    let json = serde_json::to_string_pretty(&serde_json::json!({
        "title": output.title,
        "graph_id": output.record.as_ref().map(|r| r.id),
        "summary_text": output.narrative,
        "graph_data": output.graph,
    }))
    .map_err(|e| Pdf2GraphError::Internal(format!("serialise output: {e}")))?;

    tokio::fs::write(path, json)
        .await
        .map_err(|e| Pdf2GraphError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    info!("Wrote {}", path.display());
    Ok(output)
}
