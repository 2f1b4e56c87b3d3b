//! HTTP server and API handlers.
//!
//! Routes, all scoped under a folder segment:
//! - GET|POST /:folder - connectivity greeting (404 for unknown folders).
//! - POST /:folder/sources - list discoverable sources.
//! - POST /:folder/search - list metrics for one source.
//! - POST /:folder/query - evaluate a query batch.
//! - POST /:folder/annotations - run an annotation finder over a time range.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;

use crate::annotations::AnnotationRegistry;
use crate::error::{Error, Result};
use crate::query::{QueryHandler, QueryRequest};
use crate::response::QueryResult;

/// Application state shared across handlers.
pub struct AppState {
    pub handler: QueryHandler,
    pub annotations: AnnotationRegistry,
}

/// Server configuration.
pub struct ServerConfig {
    pub addr: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0".to_string(),
            port: 3003,
        }
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/:folder", get(folder_handler).post(folder_handler))
        .route("/:folder/sources", post(sources_handler))
        .route("/:folder/search", post(search_handler))
        .route("/:folder/query", post(query_handler))
        .route("/:folder/annotations", post(annotations_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server and serve until Ctrl-C.
pub async fn run_server(state: Arc<AppState>, config: ServerConfig) -> anyhow::Result<()> {
    let app = router(state);
    let addr = format!("{}:{}", config.addr, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutting down");
}

/// Reject folder names that could escape the data root.
fn check_folder(name: &str) -> Result<()> {
    if name.is_empty() || name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(Error::BadRequest(format!("invalid folder name {name:?}")));
    }
    Ok(())
}

// --- Handlers ---

/// GET|POST /:folder - connectivity greeting used by datasource health checks.
async fn folder_handler(
    State(state): State<Arc<AppState>>,
    Path(folder): Path<String>,
) -> Result<String> {
    check_folder(&folder)?;
    if !state.handler.folder_exists(&folder) {
        return Err(Error::not_found("folder", folder));
    }
    Ok(format!("Serving delimited sources from folder {folder:?}\n"))
}

/// Body of the sources and search routes. Every field is optional; the UI
/// sends whichever it has.
#[derive(Debug, Default, Deserialize)]
struct ListRequest {
    #[serde(rename = "type", default)]
    display_type: Option<String>,
    #[serde(default)]
    source: Option<String>,
    /// Search text; narrows the raw-column portion of a metric listing.
    #[serde(default)]
    target: Option<String>,
}

/// POST /:folder/sources - discoverable source files in the folder.
async fn sources_handler(
    State(state): State<Arc<AppState>>,
    Path(folder): Path<String>,
    Json(req): Json<ListRequest>,
) -> Result<Json<Vec<String>>> {
    check_folder(&folder)?;
    let display_type = req.display_type.as_deref().unwrap_or("timeseries");
    state.handler.sources(display_type, &folder).map(Json)
}

/// POST /:folder/search - metric names for the selected source.
async fn search_handler(
    State(state): State<Arc<AppState>>,
    Path(folder): Path<String>,
    Json(req): Json<ListRequest>,
) -> Result<Json<Vec<String>>> {
    check_folder(&folder)?;
    let display_type = req.display_type.as_deref().unwrap_or("timeseries");
    // Re-list so sources dropped into the folder since startup are visible.
    state.handler.sources(display_type, &folder)?;

    let source = req.source.as_deref().unwrap_or_default();
    if source.is_empty() || source == "select source" {
        return Ok(Json(Vec::new()));
    }
    let filter = req.target.as_deref().unwrap_or_default();
    state.handler.metrics(display_type, source, filter).map(Json)
}

/// POST /:folder/query - evaluate a query batch.
async fn query_handler(
    State(state): State<Arc<AppState>>,
    Path(folder): Path<String>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<Vec<QueryResult>>> {
    check_folder(&folder)?;
    state.handler.sources("timeseries", &folder)?;
    Ok(Json(state.handler.data(&req)))
}

#[derive(Debug, Deserialize)]
struct AnnotationsRequest {
    range: RangeSpec,
    annotation: Value,
}

#[derive(Debug, Deserialize)]
struct RangeSpec {
    from: String,
    to: String,
}

/// One annotation response entry; echoes the requesting annotation object.
#[derive(Debug, Serialize)]
struct AnnotationEntry {
    annotation: Value,
    time: i64,
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<Vec<String>>,
}

fn parse_range_bound(raw: &str) -> Result<i64> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.timestamp_millis())
        .map_err(|e| Error::BadRequest(format!("range bound {raw:?} is not RFC 3339: {e}")))
}

/// POST /:folder/annotations - run a finder over the dashboard's time range.
async fn annotations_handler(
    State(state): State<Arc<AppState>>,
    Path(folder): Path<String>,
    Json(req): Json<AnnotationsRequest>,
) -> Result<Json<Vec<AnnotationEntry>>> {
    check_folder(&folder)?;
    let from = parse_range_bound(&req.range.from)?;
    let to = parse_range_bound(&req.range.to)?;
    let query = req
        .annotation
        .get("query")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let events = state.annotations.run(query, from, to)?;
    let entries = events
        .into_iter()
        .map(|event| AnnotationEntry {
            annotation: req.annotation.clone(),
            time: event.time,
            title: event.title,
            text: event.text,
            tags: event.tags,
        })
        .collect();
    Ok(Json(entries))
}
