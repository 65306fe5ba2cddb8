use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::models::{OiSnapshot, Symbol};
use crate::nse::ChainSource;
use crate::pipeline::Pipeline;
use crate::store::SnapshotStore;
use crate::summary::{self, SummaryGroup};

const DEFAULT_SNAPSHOT_LIMIT: usize = 20;
const MAX_SNAPSHOT_LIMIT: usize = 500;

// -----------------------------------------------
// API REQUEST/RESPONSE MODELS
// -----------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SnapshotsQuery {
    pub symbol: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshQuery {
    pub symbol: String,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub processing_time_ms: Option<u64>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T, start_time: Instant) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            processing_time_ms: Some(start_time.elapsed().as_millis() as u64),
        }
    }

    fn fail(error: impl ToString, start_time: Instant) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            processing_time_ms: Some(start_time.elapsed().as_millis() as u64),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SnapshotsResponse {
    pub symbol: String,
    pub snapshots: Vec<OiSnapshot>,
}

/// Outcome of a manual refresh. When the cycle fails, `snapshot` is the
/// last stored one and `fresh` is false.
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub fresh: bool,
    pub snapshot: Option<OiSnapshot>,
    pub error_kind: Option<&'static str>,
    pub retryable: Option<bool>,
}

// -----------------------------------------------
// APPLICATION STATE
// -----------------------------------------------

pub struct AppState<C, S> {
    pipeline: Arc<Pipeline<C, S>>,
}

impl<C, S> Clone for AppState<C, S> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
        }
    }
}

impl<C, S> AppState<C, S> {
    pub fn new(pipeline: Arc<Pipeline<C, S>>) -> Self {
        Self { pipeline }
    }
}

// -----------------------------------------------
// API HANDLERS
// -----------------------------------------------

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// GET /api/symbols - All tracked symbols
async fn get_symbols<C, S>(State(app_state): State<AppState<C, S>>) -> Result<Json<ApiResponse<Vec<Symbol>>>, StatusCode>
where
    C: ChainSource + 'static,
    S: SnapshotStore + 'static,
{
    let start_time = Instant::now();

    match app_state.pipeline.store().list_symbols().await {
        Ok(symbols) => Ok(Json(ApiResponse::ok(symbols, start_time))),
        Err(e) => Ok(Json(ApiResponse::fail(e, start_time))),
    }
}

/// GET /api/snapshots?symbol=NIFTY&limit=20 - Recent snapshots, newest first
async fn get_snapshots<C, S>(
    Query(query): Query<SnapshotsQuery>,
    State(app_state): State<AppState<C, S>>,
) -> Result<Json<ApiResponse<SnapshotsResponse>>, StatusCode>
where
    C: ChainSource + 'static,
    S: SnapshotStore + 'static,
{
    let start_time = Instant::now();
    let name = query.symbol.trim().to_uppercase();
    let limit = query.limit.unwrap_or(DEFAULT_SNAPSHOT_LIMIT).clamp(1, MAX_SNAPSHOT_LIMIT);
    let store = app_state.pipeline.store();

    let symbol = match store.get_symbol(&name).await {
        Ok(Some(symbol)) => symbol,
        Ok(None) => return Err(StatusCode::NOT_FOUND),
        Err(e) => return Ok(Json(ApiResponse::fail(e, start_time))),
    };

    match store.recent_snapshots(&symbol, limit).await {
        Ok(snapshots) => Ok(Json(ApiResponse::ok(
            SnapshotsResponse {
                symbol: symbol.name,
                snapshots,
            },
            start_time,
        ))),
        Err(e) => Ok(Json(ApiResponse::fail(e, start_time))),
    }
}

/// GET /api/summary - Latest state of every symbol grouped by sentiment
async fn get_summary<C, S>(
    State(app_state): State<AppState<C, S>>,
) -> Result<Json<ApiResponse<Vec<SummaryGroup>>>, StatusCode>
where
    C: ChainSource + 'static,
    S: SnapshotStore + 'static,
{
    let start_time = Instant::now();

    match summary::build_summary(app_state.pipeline.store()).await {
        Ok(groups) => Ok(Json(ApiResponse::ok(groups, start_time))),
        Err(e) => Ok(Json(ApiResponse::fail(e, start_time))),
    }
}

/// POST /api/refresh?symbol=NIFTY - Run one cycle now
async fn refresh_symbol<C, S>(
    Query(query): Query<RefreshQuery>,
    State(app_state): State<AppState<C, S>>,
) -> Result<Json<ApiResponse<RefreshResponse>>, StatusCode>
where
    C: ChainSource + 'static,
    S: SnapshotStore + 'static,
{
    let start_time = Instant::now();

    let error = match app_state.pipeline.run_cycle(&query.symbol).await {
        Ok(snapshot) => {
            return Ok(Json(ApiResponse::ok(
                RefreshResponse {
                    fresh: true,
                    snapshot: Some(snapshot),
                    error_kind: None,
                    retryable: None,
                },
                start_time,
            )));
        }
        Err(e) => e,
    };

    warn!(symbol = %query.symbol, kind = error.kind(), error = %error, "Manual refresh failed");

    let last_known = match last_known_snapshot(app_state.pipeline.store(), &query.symbol).await {
        Ok(snapshot) => snapshot,
        Err(e) => return Ok(Json(ApiResponse::fail(e, start_time))),
    };

    Ok(Json(ApiResponse {
        success: false,
        data: Some(RefreshResponse {
            fresh: false,
            snapshot: last_known,
            error_kind: Some(error.kind()),
            retryable: Some(error.is_retryable()),
        }),
        error: Some(error.to_string()),
        processing_time_ms: Some(start_time.elapsed().as_millis() as u64),
    }))
}

// -----------------------------------------------
// HELPER FUNCTIONS
// -----------------------------------------------

async fn last_known_snapshot<S: SnapshotStore>(
    store: &S,
    symbol: &str,
) -> Result<Option<OiSnapshot>, crate::error::StoreError> {
    let name = symbol.trim().to_uppercase();
    match store.get_symbol(&name).await? {
        Some(symbol) => store.latest_snapshot(&symbol).await,
        None => Ok(None),
    }
}

// -----------------------------------------------
// SERVER SETUP
// -----------------------------------------------

pub fn router<C, S>(pipeline: Arc<Pipeline<C, S>>) -> Router
where
    C: ChainSource + 'static,
    S: SnapshotStore + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/api/symbols", get(get_symbols::<C, S>))
        .route("/api/snapshots", get(get_snapshots::<C, S>))
        .route("/api/summary", get(get_summary::<C, S>))
        .route("/api/refresh", post(refresh_symbol::<C, S>))
        .layer(CorsLayer::permissive())
        .with_state(AppState::new(pipeline))
}

pub async fn start_server<C, S>(pipeline: Arc<Pipeline<C, S>>, port: u16) -> Result<()>
where
    C: ChainSource + 'static,
    S: SnapshotStore + 'static,
{
    let app = router(pipeline);

    let addr = format!("127.0.0.1:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(%addr, "OI API server listening");
    println!("🚀 OI API Server running on http://{}", addr);
    println!("📋 Available endpoints:");
    println!("   GET  /health");
    println!("   GET  /api/symbols");
    println!("   GET  /api/snapshots?symbol=NIFTY&limit=20");
    println!("   GET  /api/summary");
    println!("   POST /api/refresh?symbol=NIFTY");
    println!();

    axum::serve(listener, app).await.context("API server stopped")?;
    Ok(())
}
