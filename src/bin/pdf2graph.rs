//! CLI binary for pdf2graph.
//!
//! A thin shim over the library crate: maps flags onto `PipelineConfig` and
//! `ConvertOptions`, drives a spinner from the stage callbacks, and prints
//! the Mermaid text (or JSON) to stdout.

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2graph::pipeline::{extract::extract_graph, input, mermaid::to_mermaid, validate::TextValidator};
use pdf2graph::{
    load_env_file, AppContext, ConvertOptions, EdgeLabel, GraphProcessor, GraphStore, MermaidRenderer,
    PipelineConfig, PipelineProgressCallback, ProgressCallback, SqliteGraphStore, Stage,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One spinner line that names the running stage; finished stages are
/// printed above it.
struct CliProgressCallback {
    bar: ProgressBar,
    started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            started: Mutex::new(None),
        })
    }

    fn elapsed(&self) -> String {
        let secs = self
            .started
            .lock()
            .ok()
            .and_then(|mut s| s.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        dim(&format!("{secs:.1}s"))
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        if let Ok(mut s) = self.started.lock() {
            *s = Some(Instant::now());
        }
        self.bar.set_message(format!("{stage}…"));
    }

    fn on_stage_complete(&self, stage: Stage, output_len: usize) {
        let detail = match stage {
            Stage::Extract | Stage::Narrative => format!("{output_len} chars"),
            Stage::Graph => format!("{output_len} nodes"),
            Stage::Persist | Stage::Render => String::new(),
        };
        self.bar.println(format!(
            "  {} {:<26} {:<12} {}",
            green("✓"),
            stage.label(),
            dim(&detail),
            self.elapsed()
        ));
    }

    fn on_stage_error(&self, stage: Stage, error: &str) {
        let msg = match error.char_indices().nth(100) {
            Some((cut, _)) => format!("{}\u{2026}", &error[..cut]),
            None => error.to_string(),
        };
        self.bar.println(format!(
            "  {} {:<26} {} {}",
            red("✗"),
            stage.label(),
            red(&msg),
            self.elapsed()
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Concept graph for a PDF, Mermaid text on stdout, SVG in ./output
  pdf2graph lecture.pdf

  # Copy the rendered SVG somewhere specific and store the result
  pdf2graph lecture.pdf -o lecture.svg --save

  # Graph JSON only, no Mermaid CLI needed
  pdf2graph --no-render --json https://example.com/paper.pdf > graph.json

  # See the text that would be sent to the model
  pdf2graph --extract-only lecture.pdf

  # Render an existing graph JSON file
  pdf2graph --render-json graph.json -o graph.svg

  # Run the HTTP API
  pdf2graph --serve 0.0.0.0:8000

ENVIRONMENT VARIABLES:
  ENABLE_OPENAI / OPENAI_API_KEY / OPENAI_MODEL       primary provider (default model gpt-4)
  ENABLE_DEEPSEEK / DEEPSEEK_API_KEY / DEEPSEEK_API_URL / DEEPSEEK_MODEL
                                                      fallback provider (enabled by default)
  PDF2GRAPH_MAX_TEXT_LENGTH   characters sent to the model (default 6000)
  PDF2GRAPH_OUTPUT_DIR        .mmd / .svg artifacts (default ./output)
  PDF2GRAPH_UPLOAD_DIR        uploaded PDFs in server mode (default ./uploads)
  PDF2GRAPH_DATABASE          SQLite file (default ./graphs.db)
  MMDC_PATH                   explicit Mermaid CLI path (default: mmdc on PATH)
  LOG_LEVEL=DEBUG             debug logging

  Variables are also read from a .env file in the working directory or above.

SETUP:
  1. Install the Mermaid CLI:  npm install -g @mermaid-js/mermaid-cli
  2. Configure a provider:     export DEEPSEEK_API_KEY=... DEEPSEEK_API_URL=https://api.deepseek.com
  3. Convert:                  pdf2graph document.pdf
"#;

/// Turn PDF documents into LLM-generated concept graphs and Mermaid diagrams.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2graph",
    version,
    about = "Turn PDF documents into concept graphs and Mermaid diagrams",
    long_about = "Extract the text of a PDF (local file or URL), have an LLM rewrite it as a \
relationship-rich narrative, turn that into a concept graph of nodes and typed links, and render \
it as a Mermaid flowchart SVG. Can also serve the same pipeline over HTTP.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    #[arg(required_unless_present_any = ["serve", "render_json"])]
    input: Option<String>,

    /// Copy the rendered SVG to this path.
    #[arg(short, long, env = "PDF2GRAPH_OUTPUT")]
    output: Option<PathBuf>,

    /// Print `{title, graph_id, summary_text, graph_data, mermaid}` as JSON.
    #[arg(long)]
    json: bool,

    /// Skip the Mermaid CLI; still prints the diagram text.
    #[arg(long, env = "PDF2GRAPH_NO_RENDER")]
    no_render: bool,

    /// Title for the stored record. Default: PDF file name.
    #[arg(long)]
    title: Option<String>,

    /// Store the result in the SQLite database.
    #[arg(long, env = "PDF2GRAPH_SAVE")]
    save: bool,

    /// Print the cleaned, bounded text that would be sent to the model.
    #[arg(long)]
    extract_only: bool,

    /// Label edges with the link `type` or its `description`.
    #[arg(long, value_enum, env = "PDF2GRAPH_EDGE_LABEL")]
    edge_label: Option<EdgeLabelArg>,

    /// Render a graph JSON file instead of processing a PDF.
    #[arg(long, value_name = "FILE", conflicts_with_all = ["input", "serve"])]
    render_json: Option<PathBuf>,

    /// Serve the HTTP API on this address, e.g. 127.0.0.1:8000.
    #[arg(long, value_name = "ADDR", conflicts_with = "input")]
    serve: Option<std::net::SocketAddr>,

    /// Load environment variables from this file instead of searching for `.env`.
    #[arg(long, value_name = "FILE")]
    env_file: Option<PathBuf>,

    /// Disable the progress spinner.
    #[arg(long, env = "PDF2GRAPH_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2GRAPH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2GRAPH_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2GRAPH_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum EdgeLabelArg {
    Type,
    Description,
}

impl From<EdgeLabelArg> for EdgeLabel {
    fn from(v: EdgeLabelArg) -> Self {
        match v {
            EdgeLabelArg::Type => EdgeLabel::Type,
            EdgeLabelArg::Description => EdgeLabel::Description,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    load_env_file(cli.env_file.as_deref()).context("Failed to load environment file")?;
    let mut config = PipelineConfig::from_env();
    config.download_timeout_secs = cli.download_timeout;
    if let Some(label) = cli.edge_label {
        config.edge_label = label.into();
    }

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner replaces INFO logs; -v and LOG_LEVEL=DEBUG bring them back.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && cli.serve.is_none();
    let filter = if cli.verbose || config.debug_logging {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    if let Some(addr) = cli.serve {
        return serve(config, addr).await;
    }

    if let Some(ref path) = cli.render_json {
        return render_json_file(&cli, &config, path).await;
    }

    let input_str = cli.input.as_deref().context("No input given")?;

    if cli.extract_only {
        let resolved = input::resolve_input(input_str, config.download_timeout_secs)
            .await
            .context("Failed to open input")?;
        let extracted = input::extract_text(resolved.path())
            .await
            .context("Failed to extract text")?;
        let bounded = TextValidator::new(config.max_text_length).validate(&extracted.text);
        println!("{bounded}");
        return Ok(());
    }

    // ── Build context ────────────────────────────────────────────────────
    config.ensure_directories().context("Failed to create output directories")?;
    let processor = GraphProcessor::from_config(&config).context("No usable LLM provider")?;
    let store: Arc<dyn GraphStore> = if cli.save {
        Arc::new(SqliteGraphStore::open(&config.database_path).context("Failed to open database")?)
    } else {
        Arc::new(SqliteGraphStore::open_in_memory().context("Failed to open scratch database")?)
    };
    let renderer = MermaidRenderer::from_config(&config);
    let ctx = AppContext::new(config, processor, store, renderer);

    let progress = show_progress.then(CliProgressCallback::new);
    let options = ConvertOptions {
        title: cli.title.clone(),
        persist: cli.save,
        render: !cli.no_render,
        stem: None,
        progress: progress.clone().map(|p| p as ProgressCallback),
    };

    // ── Run conversion ───────────────────────────────────────────────────
    let result = pdf2graph::convert(input_str, &ctx, &options).await;
    if let Some(ref p) = progress {
        p.finish();
    }
    let output = result.context("Conversion failed")?;

    if cli.json {
        let json = serde_json::json!({
            "title": output.title,
            "graph_id": output.record.as_ref().map(|r| r.id),
            "summary_text": output.narrative,
            "graph_data": output.graph,
            "mermaid": output.mermaid,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).context("Failed to serialise output")?
        );
    } else {
        let mut handle = io::stdout().lock();
        writeln!(handle, "{}", output.mermaid).context("Failed to write to stdout")?;
    }

    if let Some(err) = output.render_error {
        return Err(err).context("Graph generated but rendering failed (use --no-render to skip)");
    }

    if let Some(ref diagram) = output.diagram {
        let svg_path = match cli.output {
            Some(ref dest) => {
                tokio::fs::copy(&diagram.svg_path, dest)
                    .await
                    .with_context(|| format!("Failed to copy SVG to {}", dest.display()))?;
                dest.clone()
            }
            None => diagram.svg_path.clone(),
        };
        if !cli.quiet {
            eprintln!(
                "{}  {} nodes, {} links  {}ms  →  {}",
                green("✔"),
                output.graph.nodes.len(),
                output.graph.links.len(),
                output.duration_ms,
                bold(&svg_path.display().to_string()),
            );
        }
    } else if cli.output.is_some() {
        bail!("--output needs a rendered diagram; remove --no-render");
    }

    if let (Some(record), false) = (&output.record, cli.quiet) {
        eprintln!("   stored as {}", dim(&record.id.to_string()));
    }

    Ok(())
}

async fn render_json_file(cli: &Cli, config: &PipelineConfig, path: &std::path::Path) -> Result<()> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let graph = extract_graph(&raw).with_context(|| format!("No graph JSON in {}", path.display()))?;
    let mermaid = to_mermaid(&graph, config.edge_label);

    let svg = MermaidRenderer::from_config(config)
        .render_to_string(&mermaid)
        .await
        .context("Rendering failed")?;

    match cli.output {
        Some(ref dest) => {
            tokio::fs::write(dest, svg)
                .await
                .with_context(|| format!("Failed to write {}", dest.display()))?;
            if !cli.quiet {
                eprintln!("{}  →  {}", green("✔"), bold(&dest.display().to_string()));
            }
        }
        None => print!("{svg}"),
    }
    Ok(())
}

#[cfg(feature = "server")]
async fn serve(config: PipelineConfig, addr: std::net::SocketAddr) -> Result<()> {
    let ctx = AppContext::from_config(config).context("Failed to initialise application")?;
    pdf2graph::server::serve(ctx, addr).await.context("Server failed")
}

#[cfg(not(feature = "server"))]
async fn serve(_config: PipelineConfig, _addr: std::net::SocketAddr) -> Result<()> {
    bail!("this build has no HTTP server; rebuild with `--features server`")
}
