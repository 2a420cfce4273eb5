//! JSON HTTP API.
//!
//! Exposes retrieval and borrower assessment over HTTP. The retriever is
//! built lazily on the first request that needs it, so the server starts
//! even before `cra ingest` has run; such requests answer `503` until the
//! artifacts exist.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/search` | Ranked passages for `{ "query", "top_k"? }` |
//! | `POST` | `/assess` | Risk score, explanation, and citations for a borrower |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_ready` (503, ingestion has not
//! run), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::assess::{Assessment, Assessor};
use crate::config::Config;
use crate::error::RetrievalError;
use crate::explain::Explainer;
use crate::models::RetrievalResult;
use crate::retriever::SharedRetriever;
use crate::risk::RiskInput;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    retriever: Arc<SharedRetriever>,
    assessor: Arc<Assessor>,
}

/// Starts the HTTP server on `[server].bind` and runs until the process
/// is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let config = Arc::new(config.clone());
    let retriever = Arc::new(SharedRetriever::new(config.clone()));
    run_server_with(config, retriever).await
}

/// Like [`run_server`], but reuses an existing retriever handle.
pub async fn run_server_with(
    config: Arc<Config>,
    retriever: Arc<SharedRetriever>,
) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let explainer = Explainer::from_config(&config.explain)?;
    if !explainer.has_llm() {
        info!("explanations use the built-in template");
    }

    let state = AppState {
        assessor: Arc::new(Assessor::new(
            config.clone(),
            retriever.clone(),
            explainer,
        )),
        config,
        retriever,
    };

    let app = router(state);

    info!(bind = %bind_addr, "server listening");
    println!("Server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/search", post(handle_search))
        .route("/assess", post(handle_assess))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_ready"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_ready(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        code: "not_ready".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<RetrievalError> for AppError {
    fn from(err: RetrievalError) -> Self {
        match &err {
            RetrievalError::NotFound { .. } => not_ready(err.to_string()),
            RetrievalError::InvalidQuery(_) => bad_request(err.to_string()),
            _ => {
                error!(error = %err, "request failed");
                internal(err.to_string())
            }
        }
    }
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<RetrievalResult>,
}

/// Handler for `POST /search`.
///
/// `top_k` defaults to `[retrieval].top_k`. An empty query or `top_k = 0`
/// is a `400`.
async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let top_k = req.top_k.unwrap_or(state.config.retrieval.top_k);

    let retriever = state.retriever.get().await?;
    let results = retriever.search(&req.query, top_k).await?;
    Ok(Json(SearchResponse { results }))
}

// ============ POST /assess ============

/// Handler for `POST /assess`.
///
/// Out-of-range inputs are clamped by the scorer rather than rejected.
async fn handle_assess(
    State(state): State<AppState>,
    Json(input): Json<RiskInput>,
) -> Result<Json<Assessment>, AppError> {
    let assessment = state.assessor.assess(&input).await?;
    Ok(Json(assessment))
}
