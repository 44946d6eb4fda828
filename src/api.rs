//! HTTP adapter for the VeriCite ledger
//!
//! Exposes submit, mine and chain-read endpoints plus an HTML explorer over a
//! shared [`Node`].

use axum::{
    extract::{rejection::JsonRejection, Path, Request, State},
    http::{self, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info};
use uuid::Uuid;

use crate::blockchain::{Block, SourceEntry};
use crate::error::ChainError;
use crate::ledger::MineOutcome;
use crate::node::Node;

/// Shared handler state
pub struct ApiContext {
    node: Arc<Node>,
    stats: RwLock<ApiStats>,
}

/// API statistics and monitoring
#[derive(Debug)]
struct ApiStats {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    submissions: u64,
    mine_requests: u64,
    start_time: Instant,
}

impl ApiStats {
    fn new() -> Self {
        ApiStats {
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            submissions: 0,
            mine_requests: 0,
            start_time: Instant::now(),
        }
    }

    fn record_request(&mut self, success: bool) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }
    }
}

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    Ledger(ChainError),
    InvalidInput(String),
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Ledger(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        ApiError::Ledger(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidInput(format!("Missing fields: {}", rejection.body_text()))
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub url: String,
    pub hash_summary: String,
    pub author: String,
    pub validator: String,
    pub tags: Vec<String>,
}

impl From<SubmitRequest> for SourceEntry {
    fn from(req: SubmitRequest) -> Self {
        SourceEntry {
            url: req.url,
            hash_summary: req.hash_summary,
            author: req.author,
            validator: req.validator,
            tags: req.tags,
        }
    }
}

#[derive(Serialize)]
pub struct SubmitResponse {
    pub message: String,
    pub id: Uuid,
    pub status: String,
}

#[derive(Serialize)]
pub struct MineResponse {
    pub message: String,
    pub index: Option<u64>,
}

#[derive(Serialize)]
pub struct SubmissionStatusResponse {
    pub id: Uuid,
    pub status: String,
    pub position: usize,
}

#[derive(Serialize)]
pub struct ApiStatsResponse {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub submissions: u64,
    pub mine_requests: u64,
    pub blocks_mined: u64,
    pub chain_length: usize,
    pub queue_length: usize,
    pub difficulty: u32,
    pub uptime_seconds: u64,
}

// ============================================================================
// Handlers
// ============================================================================

async fn submit(
    State(ctx): State<Arc<ApiContext>>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let Json(request) = payload?;
    let id = ctx.node.submit(request.into());
    ctx.stats.write().await.submissions += 1;

    Ok(Json(SubmitResponse {
        message: "Source queued".to_string(),
        id,
        status: "queued".to_string(),
    }))
}

async fn mine(State(ctx): State<Arc<ApiContext>>) -> Result<Json<MineResponse>, ApiError> {
    ctx.stats.write().await.mine_requests += 1;
    let outcome = ctx.node.mine().await?;

    let message = match &outcome {
        MineOutcome::Mined { index, .. } => format!("Block #{} mined", index),
        MineOutcome::NothingToMine => "No sources to mine".to_string(),
        MineOutcome::Rejected { .. } => "Mined block was rejected".to_string(),
        MineOutcome::Interrupted { reason, .. } => format!("Mining interrupted: {}", reason),
    };

    Ok(Json(MineResponse {
        message,
        index: outcome.mined_index(),
    }))
}

async fn get_chain(State(ctx): State<Arc<ApiContext>>) -> Json<Vec<Block>> {
    Json(ctx.node.snapshot())
}

async fn get_submission(
    State(ctx): State<Arc<ApiContext>>,
    Path(id): Path<String>,
) -> Result<Json<SubmissionStatusResponse>, ApiError> {
    let id = Uuid::parse_str(&id)
        .map_err(|e| ApiError::InvalidInput(format!("Invalid submission id: {}", e)))?;

    let position = ctx
        .node
        .pending_position(&id)
        .ok_or_else(|| ApiError::NotFound(format!("Submission {} is not pending", id)))?;

    Ok(Json(SubmissionStatusResponse {
        id,
        status: "queued".to_string(),
        position,
    }))
}

async fn explorer(State(ctx): State<Arc<ApiContext>>) -> Html<String> {
    Html(render_explorer(&ctx.node.snapshot()))
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn get_api_stats(State(ctx): State<Arc<ApiContext>>) -> Json<ApiStatsResponse> {
    let stats = ctx.stats.read().await;
    Json(ApiStatsResponse {
        total_requests: stats.total_requests,
        successful_requests: stats.successful_requests,
        failed_requests: stats.failed_requests,
        submissions: stats.submissions,
        mine_requests: stats.mine_requests,
        blocks_mined: ctx.node.blocks_mined(),
        chain_length: ctx.node.chain_len(),
        queue_length: ctx.node.queue_len(),
        difficulty: ctx.node.difficulty(),
        uptime_seconds: stats.start_time.elapsed().as_secs(),
    })
}

// ============================================================================
// Explorer
// ============================================================================

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Renders every block as an HTML page.
pub fn render_explorer(blocks: &[Block]) -> String {
    let mut html = String::from(
        "<html><head><title>VeriCite</title><style>\
         body { font-family: sans-serif; padding: 20px; background: #f9f9f9; }\
         .block { background: white; padding: 15px; margin: 10px 0; border-radius: 8px; box-shadow: 0 0 5px rgba(0,0,0,0.1); }\
         </style></head><body>\
         <h1>VeriCite &ndash; Source Verification Chain</h1>",
    );

    for block in blocks {
        let tags = block
            .tags
            .iter()
            .map(|t| escape_html(t))
            .collect::<Vec<_>>()
            .join(", ");
        html.push_str(&format!(
            "<div class=\"block\">\
             <h3>Block #{}</h3>\
             <p><b>URL:</b> {}</p>\
             <p><b>Hash Summary:</b> {}</p>\
             <p><b>Author:</b> {}</p>\
             <p><b>Validator:</b> {}</p>\
             <p><b>Tags:</b> {}</p>\
             <p><b>Hash:</b> {}</p>\
             <p><b>Previous Hash:</b> {}</p>\
             </div>",
            block.index,
            escape_html(&block.url),
            escape_html(&block.hash_summary),
            escape_html(&block.author),
            escape_html(&block.validator),
            tags,
            escape_html(&block.hash),
            escape_html(&block.previous_hash),
        ));
    }

    html.push_str("</body></html>");
    html
}

// ============================================================================
// Middleware
// ============================================================================

/// Request statistics middleware
async fn stats_middleware(State(ctx): State<Arc<ApiContext>>, req: Request, next: Next) -> Response {
    let response = next.run(req).await;

    let success = response.status().is_success();
    ctx.stats.write().await.record_request(success);

    response
}

/// Logs method, path, status and duration of every request.
async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "api.request"
    );

    response
}

// ============================================================================
// API Server
// ============================================================================

/// Build the router with all endpoints.
pub fn build_api_router(node: Arc<Node>) -> Router {
    let ctx = Arc::new(ApiContext {
        node,
        stats: RwLock::new(ApiStats::new()),
    });

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![
            http::Method::GET,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers(vec![http::header::CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        .route("/", get(explorer))
        .route("/submit", post(submit))
        .route("/mine", get(mine).post(mine))
        .route("/chain", get(get_chain))
        .route("/api/submissions/:id", get(get_submission))
        .route("/api/health", get(health_check))
        .route("/api/stats", get(get_api_stats))
        // logging before stats so we always record timing
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn_with_state(ctx.clone(), stats_middleware))
        .with_state(ctx)
        .layer(cors)
}

/// Serves the API until Ctrl-C, then cancels in-flight mining and drains
/// open connections.
pub async fn run_api_server(
    node: Arc<Node>,
    host: &str,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("VeriCite API listening on http://{}", addr);

    let app = build_api_router(node.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(node))
        .await?;

    info!("API server stopped");
    Ok(())
}

async fn shutdown_signal(node: Arc<Node>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    node.shutdown();
}
