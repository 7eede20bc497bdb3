//! HTTP API over [`AppContext`].
//!
//! | Method | Path | Body / query | Response |
//! |--------|------|--------------|----------|
//! | GET  | `/health` | | `{"status":"healthy"}` |
//! | POST | `/graphs` | [`NewGraphRecord`] JSON | stored [`GraphRecord`] |
//! | GET  | `/graphs` | `?limit=10&offset=0` | records, newest first |
//! | GET  | `/graphs/search` | `?q=` | records, best match first |
//! | GET  | `/graphs/:id` | | one record or 404 |
//! | POST | `/upload-pdf` | multipart `file`, `graph_type` (`mermaid`\|`force`) | `{message, graph_id, graph_json, svg_content?}` |
//! | GET  | `/get-svg/:file_id` | | `image/svg+xml` |
//! | POST | `/render-graph` | `{"graph_json": {...}}` | `{"svg_content": "..."}` |
//! | POST | `/graphs/generate-svg` | same as `/render-graph` | same as `/render-graph` |
//!
//! Errors are returned as `{"detail": "..."}` with a status derived from the
//! [`Pdf2GraphError`] variant (see [`ApiError`]).

use crate::context::AppContext;
use crate::convert::{convert, render_graph, ConvertOptions};
use crate::error::Pdf2GraphError;
use crate::graph::{ConceptGraph, GraphRecord, NewGraphRecord};
use crate::store::{run_blocking, DEFAULT_LIST_LIMIT};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Largest accepted upload.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// A [`Pdf2GraphError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }
}

impl From<Pdf2GraphError> for ApiError {
    fn from(e: Pdf2GraphError) -> Self {
        let status = match &e {
            Pdf2GraphError::InvalidQuery(_)
            | Pdf2GraphError::NotAPdf { .. }
            | Pdf2GraphError::TextExtractionFailed { .. }
            | Pdf2GraphError::EmptyDocument { .. } => StatusCode::BAD_REQUEST,
            Pdf2GraphError::NotFound(_) | Pdf2GraphError::FileNotFound { .. } => StatusCode::NOT_FOUND,
            Pdf2GraphError::Provider(_)
            | Pdf2GraphError::NoGraphFound { .. }
            | Pdf2GraphError::DownloadFailed { .. }
            | Pdf2GraphError::DownloadTimeout { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", e);
        } else {
            warn!("Request rejected: {}", e);
        }
        Self {
            status,
            detail: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Build the router. CORS is permissive; the API is meant to sit behind a
/// browser front end on another origin.
pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/graphs", get(list_graphs).post(create_graph))
        .route("/graphs/search", get(search_graphs))
        .route("/graphs/:id", get(read_graph))
        .route("/upload-pdf", post(upload_pdf))
        .route("/get-svg/:file_id", get(get_svg))
        .route("/render-graph", post(render_graph_handler))
        .route("/graphs/generate-svg", post(render_graph_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(ctx: AppContext, addr: SocketAddr) -> Result<(), Pdf2GraphError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Pdf2GraphError::Configuration(format!("Cannot bind {addr}: {e}")))?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, router(ctx))
        .await
        .map_err(|e| Pdf2GraphError::Internal(format!("server error: {e}")))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn create_graph(
    State(ctx): State<AppContext>,
    Json(record): Json<NewGraphRecord>,
) -> ApiResult<Json<GraphRecord>> {
    Ok(Json(run_blocking(&ctx.store, move |s| s.insert(record)).await?))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn list_graphs(
    State(ctx): State<AppContext>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<GraphRecord>>> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let offset = params.offset.unwrap_or(0);
    Ok(Json(run_blocking(&ctx.store, move |s| s.list(limit, offset)).await?))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: String,
}

async fn search_graphs(
    State(ctx): State<AppContext>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<GraphRecord>>> {
    info!("Search query: '{}'", params.q);
    Ok(Json(run_blocking(&ctx.store, move |s| s.search(&params.q)).await?))
}

async fn read_graph(State(ctx): State<AppContext>, Path(id): Path<Uuid>) -> ApiResult<Json<GraphRecord>> {
    Ok(Json(run_blocking(&ctx.store, move |s| s.get(id)).await?))
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    message: &'static str,
    graph_id: Option<Uuid>,
    graph_json: ConceptGraph,
    #[serde(skip_serializing_if = "Option::is_none")]
    svg_content: Option<String>,
}

async fn upload_pdf(State(ctx): State<AppContext>, mut multipart: Multipart) -> ApiResult<Json<UploadResponse>> {
    let mut upload: Option<(String, axum::body::Bytes)> = None;
    let mut graph_type = String::from("mermaid");

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Could not read upload: {e}")))?;
                upload = Some((filename, bytes));
            }
            Some("graph_type") => {
                graph_type = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Could not read graph_type: {e}")))?;
            }
            _ => {}
        }
    }

    let (filename, bytes) = upload.ok_or_else(|| ApiError::bad_request("Missing 'file' field"))?;
    if !filename.to_ascii_lowercase().ends_with(".pdf") {
        return Err(ApiError::bad_request("File must be a PDF"));
    }
    let render = match graph_type.trim() {
        "mermaid" => true,
        "force" => false,
        _ => return Err(ApiError::bad_request("graph_type must be either 'mermaid' or 'force'")),
    };

    let file_id = Uuid::new_v4().to_string();
    let path = ctx.config.upload_dir.join(format!("{file_id}.pdf"));
    let save = async {
        tokio::fs::create_dir_all(&ctx.config.upload_dir).await?;
        tokio::fs::write(&path, &bytes).await
    };
    save.await.map_err(|e| {
        ApiError::from(Pdf2GraphError::OutputWriteFailed {
            path: path.clone(),
            source: e,
        })
    })?;
    info!("Saved upload '{}' as {}", filename, path.display());

    let title = std::path::Path::new(&filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned());
    let options = ConvertOptions {
        title,
        persist: true,
        render,
        stem: Some(file_id),
        progress: None,
    };
    let output = convert(path.to_string_lossy(), &ctx, &options).await?;

    if let Some(e) = output.render_error {
        return Err(e.into());
    }
    let svg_content = match output.diagram {
        Some(d) => Some(tokio::fs::read_to_string(&d.svg_path).await.map_err(|e| {
            ApiError::from(Pdf2GraphError::RenderFailed {
                status: "success".into(),
                stderr: format!("SVG output unreadable: {e}"),
            })
        })?),
        None => None,
    };

    Ok(Json(UploadResponse {
        message: "File processed successfully",
        graph_id: output.record.map(|r| r.id),
        graph_json: output.graph,
        svg_content,
    }))
}

/// Artifact ids are UUIDs; anything else could escape the output directory.
fn is_safe_file_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

async fn get_svg(State(ctx): State<AppContext>, Path(file_id): Path<String>) -> ApiResult<Response> {
    if !is_safe_file_id(&file_id) {
        return Err(ApiError::bad_request("Invalid file id"));
    }
    let path = ctx.config.output_dir.join(format!("{file_id}.svg"));
    match tokio::fs::read(&path).await {
        Ok(svg) => Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Pdf2GraphError::NotFound("SVG file not found".into()).into())
        }
        Err(e) => Err(Pdf2GraphError::Internal(format!("read {}: {e}", path.display())).into()),
    }
}

#[derive(Debug, Deserialize)]
struct RenderGraphRequest {
    graph_json: ConceptGraph,
}

async fn render_graph_handler(
    State(ctx): State<AppContext>,
    Json(req): Json<RenderGraphRequest>,
) -> ApiResult<Json<Value>> {
    let svg = render_graph(&req.graph_json, &ctx).await?;
    Ok(Json(json!({ "svg_content": svg })))
}
